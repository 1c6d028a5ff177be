//! Single-use tokens mailed to users.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

use super::AuthError;

const RESET_TOKEN_LENGTH: usize = 40;
const RESET_TOKEN_HOURS: i64 = 24;

/// Registration confirmation token.
pub fn confirmation_token() -> String { Uuid::new_v4().simple().to_string() }

pub fn reset_token() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(RESET_TOKEN_LENGTH).map(char::from).collect()
}

pub fn reset_token_expiry(now: DateTime<Utc>) -> DateTime<Utc> { now + Duration::hours(RESET_TOKEN_HOURS) }

/// `uidb64` path segment for a user id.
pub fn encode_uid(user_id: i64) -> String { URL_SAFE_NO_PAD.encode(user_id.to_string()) }

pub fn decode_uid(uid: &str) -> Result<i64, AuthError> {
    let bytes = URL_SAFE_NO_PAD.decode(uid.trim_end_matches('=')).map_err(|_| AuthError::InvalidUid)?;
    std::str::from_utf8(&bytes).ok().and_then(|s| s.parse().ok()).ok_or(AuthError::InvalidUid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_round_trip() {
        assert_eq!(encode_uid(17), "MTc");
        assert_eq!(decode_uid("MTc").unwrap(), 17);
        assert_eq!(decode_uid("MTc=").unwrap(), 17);
        assert!(matches!(decode_uid("!!"), Err(AuthError::InvalidUid)));
        assert!(matches!(decode_uid(&URL_SAFE_NO_PAD.encode("abc")), Err(AuthError::InvalidUid)));
    }

    #[test]
    fn tokens_have_expected_shape() {
        let token = confirmation_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let reset = reset_token();
        assert_eq!(reset.len(), RESET_TOKEN_LENGTH);
        assert!(reset.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(reset, reset_token());
    }
}
