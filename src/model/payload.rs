//! Decoded attachment content.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use encoding_rs::Encoding;

use crate::error::{AttachmentError, Result};

/// How a [`Payload`] string represents the underlying bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// Standard base64 of the raw bytes.
    Base64,
    /// Text decoded with the given character encoding.
    Text(&'static Encoding),
}

impl PayloadEncoding {
    /// Parse `"base64"` or any WHATWG encoding label (`"utf-8"`, `"latin1"`, …).
    pub fn from_label(label: &str) -> Option<Self> {
        if label.eq_ignore_ascii_case("base64") {
            return Some(Self::Base64);
        }
        Encoding::for_label(label.trim().as_bytes()).map(Self::Text)
    }

    /// Label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Base64 => "base64",
            Self::Text(enc) => enc.name(),
        }
    }
}

impl fmt::Debug for PayloadEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Content of a ready attachment as a string in a known encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload {
    data: String,
    encoding: PayloadEncoding,
}

impl Payload {
    /// Base64-encode raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BASE64.encode(bytes),
            encoding: PayloadEncoding::Base64,
        }
    }

    /// Encode raw bytes in the requested representation.
    ///
    /// Text decoding is lossy: malformed sequences become U+FFFD.
    pub fn encode(bytes: &[u8], encoding: PayloadEncoding) -> Self {
        match encoding {
            PayloadEncoding::Base64 => Self::from_bytes(bytes),
            PayloadEncoding::Text(enc) => {
                let (text, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    tracing::debug!(encoding = enc.name(), "Replaced malformed sequences");
                }
                Self {
                    data: text.into_owned(),
                    encoding,
                }
            }
        }
    }

    /// The encoded string.
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// The representation of [`Self::as_str`].
    pub fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }

    /// Recover the raw bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self.encoding {
            PayloadEncoding::Base64 => BASE64
                .decode(self.data.as_bytes())
                .map_err(|e| AttachmentError::Decode(e.to_string())),
            PayloadEncoding::Text(enc) => {
                let (bytes, _, _) = enc.encode(&self.data);
                Ok(bytes.into_owned())
            }
        }
    }

    /// Length of the encoded string in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` for empty content.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("encoding", &self.encoding)
            .field("len", &self.data.len())
            .finish()
    }
}
