use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::errors::ServerError;

/// The header carrying the authenticated user identity. Authentication itself happens upstream of this service; the
/// gateway treats the value as an opaque scope.
pub const USER_ID_HEADER: &str = "x-user-id";

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// The hex-encoded HMAC-SHA256 signature of `data` under `secret`, as carried in webhook signature headers.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Extracts the user id from the request headers, or fails with a validation error.
pub fn require_user_id(req: &HttpRequest) -> Result<String, ServerError> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::InvalidInput(format!("The {USER_ID_HEADER} header is required")))
}

/// Validates that the supplied idempotency key is a UUID v4.
pub fn validate_idempotency_key(key: &str) -> Result<String, ServerError> {
    let parsed =
        Uuid::parse_str(key).map_err(|e| ServerError::InvalidIdempotencyKey(format!("{key} is not a UUID: {e}")))?;
    if parsed.get_version_num() != 4 {
        return Err(ServerError::InvalidIdempotencyKey(format!(
            "{key} is a version {} UUID, expected version 4",
            parsed.get_version_num()
        )));
    }
    Ok(parsed.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_calculate_hmac() {
        // RFC 4231 test case 2
        let hmac = calculate_hmac("Jefe", b"what do ya want for nothing?");
        assert_eq!(hmac, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn idempotency_keys_must_be_uuid_v4() {
        assert!(validate_idempotency_key("6e1a64a1-7cbe-4d22-9c57-e77904eeb2a1").is_ok());
        assert!(validate_idempotency_key("not-a-uuid").is_err());
        // v1 UUID is rejected
        assert!(validate_idempotency_key("8a6e0804-2bd0-11ee-be56-0242ac120002").is_err());
    }
}
