use base64::Engine;
use base64::alphabet::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::{CIPHER_ALG, FRAME_DELIMITER};

/// URL-safe base64 without padding on encode; padding optional on decode.
pub const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors raised while encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("frame has no cipher payload")]
    MissingPayload,

    #[error("unsupported cipher algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Cipher half of a chunk frame: nonce plus ciphertext-with-tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub alg: String,
    #[serde(with = "base64_url_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "base64_url_bytes")]
    pub ct: Vec<u8>,
}

impl ChunkPayload {
    /// Wraps a sealed chunk for the wire.
    pub fn new(nonce: &[u8], ciphertext: Vec<u8>) -> Self {
        Self {
            alg: CIPHER_ALG.into(),
            iv: nonce.to_vec(),
            ct: ciphertext,
        }
    }

    /// Rejects payloads sealed with anything but the supported cipher.
    pub fn check_alg(&self) -> Result<(), EnvelopeError> {
        if self.alg == CIPHER_ALG {
            Ok(())
        } else {
            Err(EnvelopeError::UnsupportedAlgorithm(self.alg.clone()))
        }
    }
}

/// Joins a metadata record and an optional payload into one text frame.
///
/// Frames without a payload are the bare metadata JSON.
pub fn encode_frame<M: Serialize>(
    meta: &M,
    payload: Option<&ChunkPayload>,
) -> Result<String, EnvelopeError> {
    let head = serde_json::to_string(meta)?;
    match payload {
        Some(p) => {
            let tail = serde_json::to_string(p)?;
            Ok(format!("{head}{FRAME_DELIMITER}{tail}"))
        }
        None => Ok(head),
    }
}

/// Splits a frame at the first delimiter.
pub fn split_frame(text: &str) -> (&str, Option<&str>) {
    match text.split_once(FRAME_DELIMITER) {
        Some((head, tail)) => (head, Some(tail)),
        None => (text, None),
    }
}

/// Parses both halves of a frame.
pub fn decode_frame<M: DeserializeOwned>(
    text: &str,
) -> Result<(M, Option<ChunkPayload>), EnvelopeError> {
    let (head, tail) = split_frame(text);
    let meta = serde_json::from_str(head)?;
    let payload = match tail {
        Some(t) => Some(serde_json::from_str(t)?),
        None => None,
    };
    Ok((meta, payload))
}

mod base64_url_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::BASE64_URL;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        BASE64_URL.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64_URL.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Encodes bytes as unpadded URL-safe base64.
pub fn encode_base64_url(data: &[u8]) -> String {
    BASE64_URL.encode(data)
}

/// Decodes URL-safe base64, padded or not.
pub fn decode_base64_url(text: &str) -> Result<Vec<u8>, EnvelopeError> {
    Ok(BASE64_URL.decode(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::UploadAck;

    #[test]
    fn payload_uses_url_safe_alphabet_without_padding() {
        let payload = ChunkPayload::new(&[0xfb, 0xff], vec![0xfe]);
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"alg":"AES-GCM","iv":"-_8","ct":"_g"}"#);
    }

    #[test]
    fn payload_accepts_padded_input() {
        let json = r#"{"alg":"AES-GCM","iv":"-_8=","ct":"_g=="}"#;
        let payload: ChunkPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.iv, vec![0xfb, 0xff]);
        assert_eq!(payload.ct, vec![0xfe]);
    }

    #[test]
    fn frame_joins_with_delimiter() {
        let meta = serde_json::json!({"part": 0});
        let payload = ChunkPayload::new(&[1; 12], vec![2; 4]);
        let frame = encode_frame(&meta, Some(&payload)).unwrap();
        assert_eq!(frame.matches(FRAME_DELIMITER).count(), 1);
        assert!(frame.starts_with(r#"{"part":0}XXMOJOXX{"alg""#));

        let (parsed, tail): (serde_json::Value, _) = decode_frame(&frame).unwrap();
        assert_eq!(parsed["part"], 0);
        assert_eq!(tail.unwrap(), payload);
    }

    #[test]
    fn frame_without_payload_is_bare_json() {
        let frame = encode_frame(&serde_json::json!({"ended": true}), None).unwrap();
        assert_eq!(frame, r#"{"ended":true}"#);
        let (_, tail) = split_frame(&frame);
        assert!(tail.is_none());
    }

    #[test]
    fn decode_rejects_garbage_metadata() {
        let err = decode_frame::<UploadAck>("not json XXMOJOXX {}").unwrap_err();
        assert!(matches!(err, EnvelopeError::Json(_)));
    }

    #[test]
    fn check_alg_rejects_other_ciphers() {
        let mut payload = ChunkPayload::new(&[0; 12], Vec::new());
        assert!(payload.check_alg().is_ok());
        payload.alg = "AES-CBC".into();
        let err = payload.check_alg().unwrap_err();
        assert_eq!(err.to_string(), "unsupported cipher algorithm: AES-CBC");
    }

    #[test]
    fn base64_helpers_roundtrip_key_material() {
        let raw = [0xffu8; 32];
        let text = encode_base64_url(&raw);
        assert!(!text.contains('='));
        assert!(!text.contains('/'));
        assert_eq!(decode_base64_url(&text).unwrap(), raw.to_vec());
    }
}
