//! Message content extraction: part-tree traversal, body selection,
//! attachment discovery, and email date parsing.

pub mod attachment;
pub mod body;
pub mod date;
pub mod walk;

use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{alphabet, Engine};

/// base64url as used by the mail API. Padding is accepted but not required.
const TRANSPORT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode part or attachment data from its transport encoding.
pub fn decode_transport(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    TRANSPORT.decode(data.trim())
}

/// Encode bytes the way the API transports them (unpadded base64url).
pub fn encode_transport(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_padded_and_unpadded() {
        assert_eq!(decode_transport("aGk=").unwrap(), b"hi");
        assert_eq!(decode_transport("aGk").unwrap(), b"hi");
    }

    #[test]
    fn test_decode_url_safe_alphabet() {
        // 0xfb 0xff encodes to "-_8" in the URL-safe alphabet
        assert_eq!(decode_transport("-_8").unwrap(), vec![0xfb, 0xff]);
        assert!(decode_transport("+/8").is_err());
    }

    #[test]
    fn test_encode_then_decode() {
        let data = b"<html>\xfb\xff</html>";
        assert_eq!(decode_transport(&encode_transport(data)).unwrap(), data);
    }
}
