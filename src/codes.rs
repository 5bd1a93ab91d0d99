//! Short code generation
//!
//! Codes are positional base-36 renderings of a uniformly random integer,
//! bounded so the rendered string is always 4 to 8 characters. Collisions
//! with existing aliases are detected at insertion time by the storage
//! unique-constraint signal; the lifecycle layer retries with a fresh code.

use rand::Rng;

/// Generation alphabet: digits and lower-case letters
const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Shortest generated code
pub const MIN_CODE_LENGTH: u32 = 4;

/// Longest generated code
pub const MAX_CODE_LENGTH: u32 = 8;

/// Insertion retries before generation is considered broken
///
/// Running out means the live alias population is far too dense for the
/// configured code space; a deployment problem, not a user one.
pub const MAX_GENERATE_ATTEMPTS: usize = 32;

/// Produce a random short code candidate
///
/// Uniqueness is not guaranteed; insert it and retry on the duplicate
/// signal.
pub fn random_code() -> String {
    let base = u64::from(ALPHABET.len() as u32);

    // values in [36^3, 36^8) render to exactly 4..=8 characters
    let lower = base.pow(MIN_CODE_LENGTH - 1);
    let upper = base.pow(MAX_CODE_LENGTH);

    encode(rand::rng().random_range(lower..upper))
}

/// Render an integer in positional base-36
///
/// Decoding is never needed; codes are opaque once minted.
fn encode(mut value: u64) -> String {
    let base = u64::from(ALPHABET.len() as u32);

    let mut buffer = Vec::new();
    while value > 0 {
        buffer.push(ALPHABET[(value % base) as usize]);
        value /= base;
    }
    buffer.reverse();

    String::from_utf8(buffer).expect("alphabet is ASCII")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_values() {
        assert_eq!(encode(1), "1");
        assert_eq!(encode(35), "z");
        assert_eq!(encode(36), "10");
        assert_eq!(encode(36 * 36 - 1), "zz");
    }

    #[test]
    fn test_random_code_length_bounds() {
        for _ in 0..1000 {
            let code = random_code();
            assert!(
                (MIN_CODE_LENGTH as usize..=MAX_CODE_LENGTH as usize).contains(&code.len()),
                "unexpected length for {code}"
            );
        }
    }

    #[test]
    fn test_random_code_charset() {
        for _ in 0..100 {
            let code = random_code();
            assert!(
                code.chars()
                    .all(|ch| ch.is_ascii_digit() || ch.is_ascii_lowercase())
            );
        }
    }
}
