//! Encoding tags and the transforms that recover a guestinfo value.

use std::fmt;
use std::io::Read;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use flate2::read::MultiGzDecoder;
use tracing::debug;

use crate::error::{DecodeStage, MetadataError};

/// Padded standard alphabet that ignores non-zero trailing bits, like the
/// platform tooling's decoder.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Transform applied by the platform to a guestinfo value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Plain value; only a trailing newline is removed.
    Identity,
    /// Standard alphabet, padded base64.
    Base64,
    /// Gzip stream wrapped in base64.
    GzipBase64,
}

impl Encoding {
    /// Parse an encoding tag as returned by the guest-info channel.
    ///
    /// Exactly one trailing newline is stripped before matching. The
    /// channel reports an unset tag as a single space, so both `" "` and
    /// `""` select [`Encoding::Identity`].
    pub fn from_tag(tag: &str) -> Result<Self, MetadataError> {
        match tag.strip_suffix('\n').unwrap_or(tag) {
            "" | " " => Ok(Encoding::Identity),
            "base64" => Ok(Encoding::Base64),
            "gzip+base64" => Ok(Encoding::GzipBase64),
            other => Err(MetadataError::UnknownEncoding(other.to_string())),
        }
    }

    /// Canonical wire tag for this encoding.
    pub fn tag(&self) -> &'static str {
        match self {
            Encoding::Identity => " ",
            Encoding::Base64 => "base64",
            Encoding::GzipBase64 => "gzip+base64",
        }
    }

    /// Decode `raw`, the value fetched for `key`.
    ///
    /// The whole payload is materialized before returning. If `max_size`
    /// is set, a decoded payload above the limit is rejected with
    /// [`MetadataError::TooLarge`]; gzip output is never inflated past
    /// `max_size + 1` bytes.
    pub fn decode(
        &self,
        key: &str,
        raw: &[u8],
        max_size: Option<usize>,
    ) -> Result<Vec<u8>, MetadataError> {
        let decoded = match self {
            Encoding::Identity => raw.strip_suffix(b"\n").unwrap_or(raw).to_vec(),
            Encoding::Base64 => decode_base64(key, raw)?,
            Encoding::GzipBase64 => decode_gzip(key, &decode_base64(key, raw)?, max_size)?,
        };

        check_size(decoded.len(), max_size)?;
        Ok(decoded)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Identity => write!(f, "identity"),
            other => write!(f, "{}", other.tag()),
        }
    }
}

fn check_size(len: usize, max_size: Option<usize>) -> Result<(), MetadataError> {
    match max_size {
        Some(max) if len > max => Err(MetadataError::TooLarge(len, max)),
        _ => Ok(()),
    }
}

fn decode_error(key: &str, stage: DecodeStage, reason: impl fmt::Display) -> MetadataError {
    let reason = reason.to_string();
    debug!(key, %stage, %reason, "decoding guestinfo value failed");
    MetadataError::Decode {
        key: key.to_string(),
        stage,
        reason,
    }
}

/// Base64 values may be line-wrapped; line breaks are not part of the payload.
fn decode_base64(key: &str, raw: &[u8]) -> Result<Vec<u8>, MetadataError> {
    let cleaned: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !matches!(b, b'\r' | b'\n'))
        .collect();

    BASE64
        .decode(&cleaned)
        .map_err(|e| decode_error(key, DecodeStage::Base64, e))
}

fn decode_gzip(
    key: &str,
    compressed: &[u8],
    max_size: Option<usize>,
) -> Result<Vec<u8>, MetadataError> {
    if compressed.is_empty() {
        return Ok(Vec::new());
    }

    // The header is parsed eagerly; a missing header means the stream
    // could not be opened and the read below reports why.
    let decoder = MultiGzDecoder::new(compressed);
    let stage = if decoder.header().is_some() {
        DecodeStage::GzipRead
    } else {
        DecodeStage::GzipOpen
    };

    let limit = max_size.map_or(u64::MAX, |max| (max as u64).saturating_add(1));
    let mut out = Vec::with_capacity(compressed.len().saturating_mul(2));
    decoder
        .take(limit)
        .read_to_end(&mut out)
        .map_err(|e| decode_error(key, stage, e))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use base64::engine::general_purpose::STANDARD;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    const KEY: &str = "guestinfo.userdata";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!(Encoding::from_tag(" ").unwrap(), Encoding::Identity);
        assert_eq!(Encoding::from_tag(" \n").unwrap(), Encoding::Identity);
        assert_eq!(Encoding::from_tag("").unwrap(), Encoding::Identity);
        assert_eq!(Encoding::from_tag("base64\n").unwrap(), Encoding::Base64);
        assert_eq!(
            Encoding::from_tag("gzip+base64").unwrap(),
            Encoding::GzipBase64
        );
    }

    #[test]
    fn test_tag_strips_a_single_newline() {
        let result = Encoding::from_tag("base64\n\n");
        assert!(matches!(result, Err(MetadataError::UnknownEncoding(tag)) if tag == "base64\n"));
    }

    #[test]
    fn test_unknown_tag() {
        let result = Encoding::from_tag("rot13");
        assert!(matches!(result, Err(MetadataError::UnknownEncoding(tag)) if tag == "rot13"));
    }

    #[test]
    fn test_tag_roundtrip() {
        for encoding in [Encoding::Identity, Encoding::Base64, Encoding::GzipBase64] {
            assert_eq!(Encoding::from_tag(encoding.tag()).unwrap(), encoding);
        }
    }

    #[test]
    fn test_identity_strips_trailing_newline() {
        let out = Encoding::Identity.decode(KEY, b"hello\n", None).unwrap();
        assert_eq!(out, b"hello");

        let out = Encoding::Identity.decode(KEY, b"hello\n\n", None).unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[test]
    fn test_base64_decode() {
        let encoded = STANDARD.encode(b"binary\x00data\xff");
        let out = Encoding::Base64
            .decode(KEY, encoded.as_bytes(), None)
            .unwrap();
        assert_eq!(out, b"binary\x00data\xff");
    }

    #[test]
    fn test_base64_tolerates_line_breaks() {
        let encoded = STANDARD.encode(b"#cloud-config\nhostname: node-1\n");
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{head}\r\n{tail}\n");

        let out = Encoding::Base64
            .decode(KEY, wrapped.as_bytes(), None)
            .unwrap();
        assert_eq!(out, b"#cloud-config\nhostname: node-1\n");
    }

    #[test]
    fn test_base64_allows_trailing_bits() {
        // "/w==" is canonical for 0xff; "/x==" sets a trailing bit.
        let out = Encoding::Base64.decode(KEY, b"/x==", None).unwrap();
        assert_eq!(out, [0xffu8]);
    }

    #[test]
    fn test_base64_requires_padding() {
        let result = Encoding::Base64.decode(KEY, b"/w", None);
        assert!(matches!(
            result,
            Err(MetadataError::Decode { stage: DecodeStage::Base64, .. })
        ));
    }

    #[test]
    fn test_base64_invalid() {
        let result = Encoding::Base64.decode(KEY, b"not-valid-base64!!!", None);
        assert!(matches!(
            result,
            Err(MetadataError::Decode { ref key, stage: DecodeStage::Base64, .. }) if key == KEY
        ));
    }

    #[test]
    fn test_gzip_base64_decode() {
        let payload = b"{\"hostname\": \"vm-1\"}".repeat(20);
        let encoded = STANDARD.encode(gzip(&payload));

        let out = Encoding::GzipBase64
            .decode(KEY, encoded.as_bytes(), None)
            .unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_gzip_bad_header_is_open_stage() {
        let encoded = STANDARD.encode(b"this is not gzip at all");
        let result = Encoding::GzipBase64.decode(KEY, encoded.as_bytes(), None);
        assert!(matches!(
            result,
            Err(MetadataError::Decode { stage: DecodeStage::GzipOpen, .. })
        ));
    }

    #[test]
    fn test_gzip_bad_checksum_is_read_stage() {
        let mut compressed = gzip(&b"abcdefghij".repeat(100));
        let crc = compressed.len() - 8;
        compressed[crc] ^= 0xff;
        let encoded = STANDARD.encode(&compressed);

        let result = Encoding::GzipBase64.decode(KEY, encoded.as_bytes(), None);
        assert!(matches!(
            result,
            Err(MetadataError::Decode { stage: DecodeStage::GzipRead, .. })
        ));
    }

    #[test]
    fn test_gzip_bad_base64_is_base64_stage() {
        let result = Encoding::GzipBase64.decode(KEY, b"%%%", None);
        assert!(matches!(
            result,
            Err(MetadataError::Decode { stage: DecodeStage::Base64, .. })
        ));
    }

    #[test]
    fn test_empty_value_is_empty_payload() {
        for encoding in [Encoding::Identity, Encoding::Base64, Encoding::GzipBase64] {
            assert!(encoding.decode(KEY, b"", None).unwrap().is_empty());
        }
    }

    #[test]
    fn test_max_size_limits_decoded_payload() {
        let payload = vec![0u8; 4096];

        let encoded = STANDARD.encode(gzip(&payload));
        let result = Encoding::GzipBase64.decode(KEY, encoded.as_bytes(), Some(1024));
        assert!(matches!(result, Err(MetadataError::TooLarge(1025, 1024))));

        let encoded = STANDARD.encode(&payload);
        let result = Encoding::Base64.decode(KEY, encoded.as_bytes(), Some(1024));
        assert!(matches!(result, Err(MetadataError::TooLarge(4096, 1024))));

        let out = Encoding::Base64
            .decode(KEY, encoded.as_bytes(), Some(4096))
            .unwrap();
        assert_eq!(out.len(), 4096);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let encoded = STANDARD.encode(gzip(b"same input"));
        let first = Encoding::GzipBase64.decode(KEY, encoded.as_bytes(), None).unwrap();
        let second = Encoding::GzipBase64.decode(KEY, encoded.as_bytes(), None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_display() {
        assert_eq!(Encoding::Identity.to_string(), "identity");
        assert_eq!(Encoding::Base64.to_string(), "base64");
        assert_eq!(Encoding::GzipBase64.to_string(), "gzip+base64");
    }
}
