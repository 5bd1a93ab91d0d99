//! User agent and referer categorization

use woothee::parser::Parser;

/// Bucket for anything that could not be categorized
pub const UNKNOWN: &str = "Unknown";

/// Browser family of a raw user agent header
pub fn browser_category(user_agent: Option<&str>) -> String {
    let Some(user_agent) = user_agent else {
        return UNKNOWN.to_string();
    };

    match Parser::new().parse(user_agent) {
        Some(result) if result.name != "UNKNOWN" => result.name.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Referring site of a raw referer header
///
/// Normalized to the bare host; a leading `www.` is noise.
pub fn referer_category(referer: Option<&str>) -> String {
    referer
        .and_then(|referer| url::Url::parse(referer).ok())
        .and_then(|url| {
            url.host_str()
                .map(|host| host.trim_start_matches("www.").to_string())
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_category() {
        let chrome = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                      (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        assert_eq!(browser_category(Some(chrome)), "Chrome");

        let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        assert_eq!(browser_category(Some(firefox)), "Firefox");

        assert_eq!(browser_category(None), UNKNOWN);
        assert_eq!(browser_category(Some("definitely not a browser")), UNKNOWN);
    }

    #[test]
    fn test_referer_category() {
        assert_eq!(
            referer_category(Some("https://www.example.com/some/page")),
            "example.com"
        );
        assert_eq!(referer_category(Some("https://t.co/abc")), "t.co");
        assert_eq!(referer_category(None), UNKNOWN);
        assert_eq!(referer_category(Some("not a url")), UNKNOWN);
    }
}
