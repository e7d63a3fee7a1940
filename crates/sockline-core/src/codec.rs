//! Codec - raw bytes と文字列表現（utf8 / base64 / hex）の相互変換
//!
//! Every `encode` is total: bytes that are not valid UTF-8 are re-encoded as
//! Base64 and the returned [`Encoded`] reports the encoding actually used.
//! Every `decode` is partial and returns a [`CodecError`] instead of truncating.

use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

/// Text encoding used on the caller side of a send/read.
///
/// Deserialization is lenient: unknown names fall back to `Utf8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Encoding {
    #[default]
    Utf8,
    Base64,
    Hex,
}

impl Encoding {
    /// Wire name reported back to callers.
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Base64 => "base64",
            Encoding::Hex => "hex",
        }
    }

    /// Parse a caller-supplied name. Case-insensitive; anything unrecognized is `Utf8`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "base64" => Encoding::Base64,
            "hex" => Encoding::Hex,
            _ => Encoding::Utf8,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Encoding {
    fn from(name: String) -> Self {
        Encoding::from_name(&name)
    }
}

/// Decode failure for Base64 / hex input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64 input: {0}")]
    InvalidBase64(String),

    #[error("hex input has odd length ({0} digits)")]
    OddHexLength(usize),

    #[error("invalid hex digit {digit:?} at position {position}")]
    InvalidHexDigit { digit: char, position: usize },
}

/// Text produced by [`encode`], tagged with the encoding that was really applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub text: String,
    pub encoding: Encoding,
}

impl Encoded {
    /// True when the requested encoding could not be honoured (utf8 -> base64).
    pub fn fell_back(&self, requested: Encoding) -> bool {
        self.encoding != requested
    }
}

/// Turn caller text into the bytes to put on the wire.
pub fn decode(text: &str, encoding: Encoding) -> Result<Vec<u8>, CodecError> {
    match encoding {
        Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
        Encoding::Base64 => general_purpose::STANDARD
            .decode(text)
            .map_err(|e| CodecError::InvalidBase64(e.to_string())),
        Encoding::Hex => decode_hex(text),
    }
}

/// Turn bytes read from the wire into caller text.
pub fn encode(bytes: &[u8], encoding: Encoding) -> Encoded {
    match encoding {
        Encoding::Utf8 => match std::str::from_utf8(bytes) {
            Ok(text) => Encoded {
                text: text.to_owned(),
                encoding: Encoding::Utf8,
            },
            Err(_) => encode(bytes, Encoding::Base64),
        },
        Encoding::Base64 => Encoded {
            text: general_purpose::STANDARD.encode(bytes),
            encoding: Encoding::Base64,
        },
        Encoding::Hex => Encoded {
            text: encode_hex(bytes),
            encoding: Encoding::Hex,
        },
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}

fn decode_hex(text: &str) -> Result<Vec<u8>, CodecError> {
    // 空白・改行を除去してから 0x プレフィックスを外す
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ' ' | '\n' | '\r' | '\t'))
        .collect();
    let digits = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(&cleaned);

    let nibbles = digits
        .chars()
        .enumerate()
        .map(|(position, digit)| {
            digit
                .to_digit(16)
                .map(|n| n as u8)
                .ok_or(CodecError::InvalidHexDigit { digit, position })
        })
        .collect::<Result<Vec<u8>, CodecError>>()?;

    if nibbles.len() % 2 != 0 {
        return Err(CodecError::OddHexLength(nibbles.len()));
    }

    Ok(nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}
