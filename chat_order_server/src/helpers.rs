use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the base64-encoded HMAC-SHA256 signature for a raw request body. This is what the chat platform puts in
/// the signature header, so it is also what test fixtures use to sign their own payloads.
pub fn calculate_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    base64::encode(mac.finalize().into_bytes())
}

/// Check a base64-encoded signature header value against the raw request body. The comparison happens inside
/// `verify_slice`, which is constant-time. Any decoding failure counts as a mismatch.
pub fn signature_matches(secret: &str, body: &[u8], provided: &str) -> bool {
    // An unconfigured secret must never validate anything
    if secret.is_empty() || provided.trim().is_empty() {
        return false;
    }
    let sig_bytes = match base64::decode(provided.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let sig = calculate_signature("channel-secret", b"{\"events\":[]}");
        assert!(signature_matches("channel-secret", b"{\"events\":[]}", &sig));
    }

    #[test]
    fn tampered_body_fails() {
        let sig = calculate_signature("channel-secret", b"{\"events\":[]}");
        assert!(!signature_matches("channel-secret", b"{\"events\":[1]}", &sig));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = calculate_signature("channel-secret", b"payload");
        assert!(!signature_matches("other-secret", b"payload", &sig));
    }

    #[test]
    fn garbage_signature_fails() {
        assert!(!signature_matches("channel-secret", b"payload", "not base64 !!"));
        assert!(!signature_matches("channel-secret", b"payload", ""));
    }

    #[test]
    fn empty_secret_never_validates() {
        let sig = calculate_signature("", b"payload");
        assert!(!signature_matches("", b"payload", &sig));
    }

    #[test]
    fn known_vector() {
        // Signature computed independently with `echo -n 'hello' | openssl dgst -sha256 -hmac 'key' -binary | base64`
        let sig = calculate_signature("key", b"hello");
        assert_eq!(sig, "kwezuRXvtRcf8U2MtV+8x5jGwO8UVtZt7RpqpyOli3s=");
    }
}
