use image::ImageError;
use thiserror::Error;

use std::fmt;
use std::io::Error as IOError;

pub type Result<T> = std::result::Result<T, LprError>;

#[derive(Debug)]
pub struct LprError(LprErrorKind);

#[derive(Debug, Error)]
pub enum LprErrorKind {
    /// the plate image could not be opened or decoded
    #[error("failed to load image: {0}")]
    ImageLoad(#[source] ImageError),
    /// a zero-area region reached the canonicalizer
    #[error("empty glyph: {width}x{height} source")]
    EmptyGlyph { width: u32, height: u32 },
    #[error("classifier transport failed: {0}")]
    ClassifierTransport(String),
    #[error("malformed classifier response: {0}")]
    ClassifierProtocol(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] IOError),
    #[cfg(feature = "tensorflow")]
    #[error("model error: {0}")]
    Model(#[from] tensorflow::Status),
}

impl LprError {
    pub fn kind(&self) -> &LprErrorKind {
        &self.0
    }

    pub fn empty_glyph(width: u32, height: u32) -> Self {
        Self(LprErrorKind::EmptyGlyph { width, height })
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self(LprErrorKind::ClassifierTransport(msg.into()))
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self(LprErrorKind::ClassifierProtocol(msg.into()))
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self(LprErrorKind::InvalidConfig(msg.into()))
    }

    /// Errors confined to one character; the failure policy decides whether
    /// they abort the plate. A local model failing on one glyph counts too.
    pub fn is_per_character(&self) -> bool {
        match self.kind() {
            LprErrorKind::ClassifierTransport(_) | LprErrorKind::ClassifierProtocol(_) => true,
            #[cfg(feature = "tensorflow")]
            LprErrorKind::Model(_) => true,
            _ => false,
        }
    }
}

impl<T> From<T> for LprError
where T: Into<LprErrorKind>
{
    fn from(e: T) -> Self {
        Self(e.into())
    }
}

impl fmt::Display for LprError {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.kind(), f)
    }
}

impl std::error::Error for LprError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(self.kind())
    }
}

impl From<ImageError> for LprErrorKind {
    fn from(e: ImageError) -> Self {
        Self::ImageLoad(e)
    }
}

impl From<reqwest::Error> for LprErrorKind {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::ClassifierProtocol(e.to_string())
        } else {
            Self::ClassifierTransport(e.to_string())
        }
    }
}

impl From<serialport::Error> for LprErrorKind {
    fn from(e: serialport::Error) -> Self {
        Self::ClassifierTransport(e.to_string())
    }
}

impl From<serde_json::Error> for LprErrorKind {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}
