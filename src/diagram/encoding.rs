//! PlantUML URL encoding
//!
//! Diagram sources embedded in URLs are raw-deflated and written with the
//! PlantUML base64 alphabet (`0-9A-Za-z-_`). A `~h` prefix marks the plain
//! hex form instead.

use std::io::{Read, Write};

use base64::alphabet::Alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use super::error::NormalizationError;

const PLANTUML_ALPHABET: Alphabet =
    match Alphabet::new("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("invalid PlantUML alphabet"),
    };

const PLANTUML_BASE64: GeneralPurpose = GeneralPurpose::new(
    &PLANTUML_ALPHABET,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const HEX_PREFIX: &str = "~h";

/// Decode an encoded diagram back into its source bytes
///
/// Inflation stops one byte past `max_source_bytes`, so an oversized diagram
/// comes back truncated but still too long for the normalizer to accept.
pub fn decode(encoded: &str, max_source_bytes: usize) -> Result<Vec<u8>, NormalizationError> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(NormalizationError::InvalidEncodedSource(
            "empty encoded diagram".to_string(),
        ));
    }

    if let Some(hex_part) = encoded.strip_prefix(HEX_PREFIX) {
        return hex::decode(hex_part)
            .map_err(|e| NormalizationError::InvalidEncodedSource(e.to_string()));
    }

    let compressed = PLANTUML_BASE64
        .decode(encoded)
        .map_err(|e| NormalizationError::InvalidEncodedSource(e.to_string()))?;

    let mut inflated = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(max_source_bytes as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| NormalizationError::InvalidEncodedSource(e.to_string()))?;

    Ok(inflated)
}

/// Encode diagram text into the URL-safe PlantUML form
pub fn encode(text: &str) -> Result<String, std::io::Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(PLANTUML_BASE64.encode(compressed))
}
