use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Base64url without padding, as required by the Gmail `messages.send`
/// transport for the `raw` field.
pub fn b64u_encode(content: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(content)
}

pub fn b64u_decode(b64u: &str) -> anyhow::Result<Vec<u8>> {
    let decoded = URL_SAFE_NO_PAD.decode(b64u)?;
    Ok(decoded)
}

pub fn b64u_decode_to_string(b64u: &str) -> anyhow::Result<String> {
    let decoded = b64u_decode(b64u)?;
    let s = String::from_utf8(decoded)?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let input = "To: a@b.com\r\nSubject: Hi\r\n\r\nBody";
        let encoded = b64u_encode(input);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
        assert_eq!(b64u_decode_to_string(&encoded).unwrap(), input);
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        // '+' belongs to the standard alphabet, not base64url
        assert!(b64u_decode("a+b").is_err());
    }
}
