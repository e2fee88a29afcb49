//! Core types for the CAN signal codec library
//!
//! This module defines the error taxonomy and the decoded-value types that the
//! codec emits. The codec is stateless and only transforms frames - loading a
//! database is the single operation allowed to fail wholesale, decoding is
//! partial-tolerant, and encoding is all-or-nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Result type for database loading operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors that can occur while loading a database file
///
/// Loading is all-or-nothing: on any of these, no `Database` is produced and
/// any previously loaded database is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("database file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("failed to read database file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {detail}")]
    ParseError { line: usize, detail: String },

    #[error("unsupported dialect version {found} (supported: {supported}) - \
             convert the file to a supported version or use DBC format instead")]
    UnsupportedDialectVersion {
        found: String,
        supported: &'static str,
    },

    #[error("unsupported database file type: {0}")]
    UnsupportedFileType(String),
}

/// Errors that can occur while encoding signal values into a frame
///
/// Encoding is all-or-nothing: on any of these, no byte buffer is returned
/// and nothing must be transmitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("no message with frame id 0x{0:X} in the database")]
    UnknownMessage(u32),

    #[error("signal not found in target message: {0}")]
    UnknownSignal(String),

    #[error("signal '{0}' has scale 0, physical value cannot be inverted")]
    ZeroScale(String),
}

/// Per-signal warnings collected during a decode
///
/// A warning never fails the decode of the rest of the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeWarning {
    /// The signal's bit range extends beyond the frame's payload; the signal
    /// was skipped.
    SignalBitRangeExceeded { signal: String },
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeWarning::SignalBitRangeExceeded { signal } => {
                write!(f, "signal '{}' exceeds the frame payload, skipped", signal)
            }
        }
    }
}

/// A decoded signal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSignal {
    /// Raw integer extracted from the payload bits (after sign extension)
    pub raw: i64,
    /// Physical value: `raw * scale + offset`
    pub physical: f64,
    /// Engineering unit (e.g., "km/h", "rpm", "V")
    pub unit: Option<String>,
    /// Enumeration label for the raw value, if the signal defines choices
    pub label: Option<String>,
}

/// A fully decoded message: all well-formed signals of one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedMessage {
    /// Message name from the database
    pub name: String,
    /// CAN frame id the message was matched on
    pub frame_id: u32,
    /// Decoded signals keyed by signal name
    pub signals: HashMap<String, DecodedSignal>,
    /// Per-signal warnings (skipped signals); empty on a clean decode
    pub warnings: Vec<DecodeWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_display() {
        let err = EncodeError::UnknownMessage(0x1A0);
        assert_eq!(format!("{}", err), "no message with frame id 0x1A0 in the database");

        let err = EncodeError::UnknownSignal("EngineSpeed".to_string());
        assert!(format!("{}", err).contains("EngineSpeed"));
    }

    #[test]
    fn test_load_error_distinguishable() {
        let parse = LoadError::ParseError {
            line: 3,
            detail: "bad token".to_string(),
        };
        let version = LoadError::UnsupportedDialectVersion {
            found: "5.0".to_string(),
            supported: "6.0",
        };
        // The two failure modes must render differently for the UI layer.
        assert!(format!("{}", parse).contains("line 3"));
        assert!(format!("{}", version).contains("5.0"));
        assert!(format!("{}", version).contains("6.0"));
    }

    #[test]
    fn test_decode_warning_display() {
        let w = DecodeWarning::SignalBitRangeExceeded {
            signal: "Overflow".to_string(),
        };
        assert!(format!("{}", w).contains("Overflow"));
    }
}
