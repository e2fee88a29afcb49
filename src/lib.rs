//! CAN Signal Codec Library
//!
//! A stateless, reusable library for translating raw CAN frames into named,
//! scaled, physical-unit signal values and back, driven by a message database
//! loaded from DBC or SYM (version 6.0) files.
//!
//! # Architecture
//!
//! This library is intentionally minimal and focused on the codec:
//! - Parses schema files into an immutable [`Database`] of messages/signals
//! - Decodes frames to `{signal name -> raw, physical, unit}` maps
//! - Encodes physical values back into bit-exact frame payloads
//! - Provides an atomically swappable snapshot holder for reloads
//!
//! The library does NOT:
//! - Talk to a CAN bus adapter (transport is a separate collaborator)
//! - Record, plot, or evaluate trigger conditions on decoded values
//! - Own any user-facing controls
//!
//! All of that lives in the surrounding application layers.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_signal_codec::{Codec, Database};
//! use std::collections::HashMap;
//! use std::path::Path;
//!
//! let db = Database::load(Path::new("powertrain.dbc")).unwrap();
//!
//! // Decode a received frame
//! if let Some(decoded) = Codec::decode(&db, 0x123, &[0x34, 0x12, 0, 0, 0, 0, 0, 0]) {
//!     for (name, signal) in &decoded.signals {
//!         println!("{} = {} (raw {})", name, signal.physical, signal.raw);
//!     }
//! }
//!
//! // Encode values for transmission
//! let mut values = HashMap::new();
//! values.insert("EngineSpeed".to_string(), 3000.0);
//! let bytes = Codec::encode(&db, 0x123, &values).unwrap();
//! assert_eq!(bytes.len(), 8);
//! ```

// Public modules
pub mod codec;
pub mod database;
pub mod shared;
pub mod types;

// Re-export main types for convenience
pub use codec::Codec;
pub use database::{
    ByteOrder, Database, DatabaseStats, Message, MessageSummary, Signal, ValueType,
};
pub use shared::SharedDatabase;
pub use types::{
    DecodeWarning, DecodedMessage, DecodedSignal, EncodeError, LoadError, Result,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
