//! The root!
//!
//! The most important part of Trimly, the actual redirect logic

use std::str::Utf8Error;
use std::sync::Arc;

use axum::Extension;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header::LOCATION;
use axum::http::header::REFERER;
use axum::http::header::SET_COOKIE;
use axum_extra::TypedHeader;
use axum_extra::headers::Cookie;
use axum_extra::headers::UserAgent;
use percent_encoding::percent_decode_str;
use uuid::Uuid;

use crate::client_ip::ClientAddress;
use crate::geo::GeoLocator;
use crate::storage::Storage;
use crate::visits;
use crate::visits::VisitRequest;

/// Cookie carrying the visitor tracking token
pub const TRACKING_COOKIE: &str = "trimly_visitor";

/// Tracking cookie lifetime: two years
const TRACKING_COOKIE_MAX_AGE: u32 = 63_072_000;

/// The root!
///
/// All wildcard requests end up in this function.
///
/// Resolves the path as an alias, records the visit and answers with a
/// redirect plus the tracking cookie. Unknown, deleted and expired
/// aliases all collapse into the same 404.
pub async fn root<S: Storage>(
    client_address: Option<ClientAddress>,
    cookies: Option<TypedHeader<Cookie>>,
    user_agent: Option<TypedHeader<UserAgent>>,
    Extension(storage): Extension<S>,
    Extension(locator): Extension<Arc<dyn GeoLocator>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<(StatusCode, HeaderMap), (StatusCode, String)> {
    let alias = uri.path().trim_matches('/');
    let alias = url_decode_alias(alias).map_err(internal_error)?;

    tracing::debug!("Looking for alias: /{alias}");

    let tracking_id = cookies
        .as_ref()
        .and_then(|cookies| cookies.get(TRACKING_COOKIE))
        .and_then(|value| Uuid::parse_str(value).ok());

    let referer = headers.get(REFERER).and_then(|value| value.to_str().ok());

    let outcome = visits::record_visit(
        &storage,
        locator.as_ref(),
        &VisitRequest {
            alias: &alias,
            tracking_id,
            source_ip: client_address.map(ClientAddress::ip),
            user_agent: user_agent.as_ref().map(|header| header.as_str()),
            referer,
        },
    )
    .await
    .map_err(internal_error)?;

    let mut response_headers = HeaderMap::new();

    if let Some(outcome) = outcome {
        let destination = append_query(&outcome.destination, uri.query());

        tracing::debug!(r#"Alias "{alias}" redirecting to: {destination}"#);

        response_headers.insert(
            LOCATION,
            HeaderValue::from_str(&destination).map_err(internal_error)?,
        );

        let cookie = format!(
            "{TRACKING_COOKIE}={}; Path=/; Max-Age={TRACKING_COOKIE_MAX_AGE}",
            outcome.tracking_id
        );
        response_headers.insert(
            SET_COOKIE,
            HeaderValue::from_str(&cookie).map_err(internal_error)?,
        );

        Ok((StatusCode::TEMPORARY_REDIRECT, response_headers))
    } else {
        tracing::debug!(r#"Alias "{alias}" not found"#);

        Ok((StatusCode::NOT_FOUND, response_headers))
    }
}

/// Re-append the original query string to the destination
///
/// Forwarded with `&` when the destination already carries a query of its
/// own, with `?` otherwise.
fn append_query(destination: &str, query: Option<&str>) -> String {
    match query {
        None | Some("") => destination.to_string(),
        Some(query) => {
            if destination.contains('?') {
                format!("{destination}&{query}")
            } else {
                format!("{destination}?{query}")
            }
        }
    }
}

/// Utility function for mapping any error into a `500 Internal Server Error`
/// response.
fn internal_error<E>(err: E) -> (StatusCode, String)
where
    E: std::error::Error,
{
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// URL decode alias
///
/// Uses percentage encoding for the decoding, might error in case of invalid UTF-8
fn url_decode_alias(alias: &str) -> Result<String, Utf8Error> {
    let decoded = percent_decode_str(alias);

    decoded.decode_utf8().map(|decoded| decoded.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_query() {
        assert_eq!(
            append_query("https://example.com/", None),
            "https://example.com/"
        );
        assert_eq!(
            append_query("https://example.com/", Some("a=1")),
            "https://example.com/?a=1"
        );
        assert_eq!(
            append_query("https://example.com/?b=2", Some("a=1")),
            "https://example.com/?b=2&a=1"
        );
    }
}
