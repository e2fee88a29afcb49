//! Database model and schema parsers
//!
//! An in-memory schema of messages and signals, built once when a database
//! file is loaded and immutable thereafter. Supported dialects are a DBC
//! subset and SYM version 6.0.

pub mod dbc;
pub mod sym;

use crate::types::{LoadError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// Signed integer (two's complement)
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// A CAN signal definition: one scalar field within a message
///
/// `start_bit` is always stored in the codec's linear bit numbering: for
/// little-endian signals bit 0 is the LSB of byte 0; for big-endian signals
/// bit 0 is the MSB of byte 0 and numbering continues MSB-first. The parsers
/// normalize DBC/SYM Motorola start bits into this convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal name, unique within its message
    pub name: String,
    /// First bit of the signal in the frame payload (codec convention)
    pub start_bit: u16,
    /// Length in bits, 1..=64
    pub length: u16,
    /// Byte order for multi-byte spans
    pub byte_order: ByteOrder,
    /// Signed/unsigned raw interpretation
    pub value_type: ValueType,
    /// Scale factor: `physical = raw * scale + offset`
    pub scale: f64,
    /// Offset added after scaling
    pub offset: f64,
    /// Advisory minimum physical value (UI range limits)
    pub minimum: Option<f64>,
    /// Advisory maximum physical value (UI range limits)
    pub maximum: Option<f64>,
    /// Engineering unit, display only
    pub unit: Option<String>,
    /// Enumeration labels by raw value, display only
    pub choices: Option<BTreeMap<i64, String>>,
    /// Free-text comment from the schema file
    pub comment: Option<String>,
}

/// A CAN message definition: one frame template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// CAN frame id (extended-frame flag bit stripped)
    pub frame_id: u32,
    /// Message name, unique within the database
    pub name: String,
    /// Payload length in bytes, 0..=8 (classic CAN)
    pub length: u8,
    /// Cycle time in milliseconds, if the schema declares one
    pub cycle_time_ms: Option<u32>,
    /// Signals in declaration order (order matters for overlapping writes
    /// during encode: last write wins per bit)
    pub signals: Vec<Signal>,
    /// Free-text comment from the schema file
    pub comment: Option<String>,
}

impl Message {
    /// Find a signal by name
    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// Summary of a message for UI listing and selection dropdowns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub name: String,
    pub frame_id: u32,
    pub length: u8,
    pub signal_names: Vec<String>,
    pub cycle_time_ms: Option<u32>,
    pub comment: Option<String>,
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}

/// The loaded schema: messages keyed by frame id and by name
///
/// Constructed wholesale on load and immutable afterwards; a reload builds a
/// fresh `Database` and swaps it in (see [`crate::shared::SharedDatabase`]).
#[derive(Debug, Clone)]
pub struct Database {
    /// All messages, sorted ascending by frame id for deterministic listing
    messages: Vec<Message>,
    /// Frame id -> index into `messages`
    by_id: HashMap<u32, usize>,
    /// Message name -> index into `messages`
    by_name: HashMap<String, usize>,
}

impl Database {
    /// Build a database from parsed message definitions
    ///
    /// Messages are sorted by frame id. A duplicate frame id or message name
    /// keeps the first definition and logs a warning.
    pub fn from_messages(mut messages: Vec<Message>) -> Self {
        messages.sort_by_key(|m| m.frame_id);

        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        let mut keep = Vec::with_capacity(messages.len());

        for message in messages {
            if by_id.contains_key(&message.frame_id) {
                log::warn!(
                    "duplicate frame id 0x{:X} ('{}'), keeping the first definition",
                    message.frame_id,
                    message.name
                );
                continue;
            }
            if by_name.contains_key(&message.name) {
                log::warn!(
                    "duplicate message name '{}', keeping the first definition",
                    message.name
                );
                continue;
            }
            by_id.insert(message.frame_id, keep.len());
            by_name.insert(message.name.clone(), keep.len());
            keep.push(message);
        }

        Self {
            messages: keep,
            by_id,
            by_name,
        }
    }

    /// Load a database file, dispatching on the file extension
    ///
    /// `.dbc` files go through the DBC subset parser, `.sym` files through
    /// the SYM 6.0 parser. Any other extension fails with
    /// [`LoadError::UnsupportedFileType`].
    ///
    /// # Example
    /// ```no_run
    /// use can_signal_codec::Database;
    /// use std::path::Path;
    ///
    /// let db = Database::load(Path::new("powertrain.dbc")).unwrap();
    /// println!("{} messages", db.stats().num_messages);
    /// ```
    pub fn load(path: &Path) -> Result<Database> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        // Read as bytes first, then fall back to Latin-1 for non-UTF-8
        // exports (Vector tools frequently emit Windows-1252).
        let bytes = std::fs::read(path)?;
        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("database file is not UTF-8, trying Latin-1 encoding");
                err.into_bytes().iter().map(|&b| b as char).collect()
            }
        };

        let db = match extension.as_str() {
            "dbc" => Self::from_dbc(&content)?,
            "sym" => Self::from_sym(&content)?,
            other => return Err(LoadError::UnsupportedFileType(other.to_string())),
        };

        log::info!(
            "loaded {:?}: {} messages, {} signals",
            path,
            db.stats().num_messages,
            db.stats().num_signals
        );
        Ok(db)
    }

    /// Parse a DBC document from in-memory text
    pub fn from_dbc(text: &str) -> Result<Database> {
        Ok(Self::from_messages(dbc::parse_dbc(text)?))
    }

    /// Parse a SYM 6.0 document from in-memory text
    pub fn from_sym(text: &str) -> Result<Database> {
        Ok(Self::from_messages(sym::parse_sym(text)?))
    }

    /// Get a message definition by CAN frame id
    pub fn get_message_by_id(&self, frame_id: u32) -> Option<&Message> {
        self.by_id.get(&frame_id).map(|&idx| &self.messages[idx])
    }

    /// Get a message definition by name
    pub fn get_message_by_name(&self, name: &str) -> Option<&Message> {
        self.by_name.get(name).map(|&idx| &self.messages[idx])
    }

    /// All messages, sorted ascending by frame id
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Message summaries for UI listing, in frame id order
    pub fn message_summaries(&self) -> Vec<MessageSummary> {
        self.messages
            .iter()
            .map(|m| MessageSummary {
                name: m.name.clone(),
                frame_id: m.frame_id,
                length: m.length,
                signal_names: m.signals.iter().map(|s| s.name.clone()).collect(),
                cycle_time_ms: m.cycle_time_ms,
                comment: m.comment.clone(),
            })
            .collect()
    }

    /// Signal descriptors of one message, for signal-selection UIs
    pub fn signals_of(&self, frame_id: u32) -> Option<&[Signal]> {
        self.get_message_by_id(frame_id).map(|m| m.signals.as_slice())
    }

    /// Iterate over every signal in the database with its owning message
    pub fn all_signals(&self) -> impl Iterator<Item = (&Message, &Signal)> {
        self.messages
            .iter()
            .flat_map(|m| m.signals.iter().map(move |s| (m, s)))
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.iter().map(|m| m.signals.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(name: &str) -> Signal {
        Signal {
            name: name.to_string(),
            start_bit: 0,
            length: 16,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            scale: 1.0,
            offset: 0.0,
            minimum: Some(0.0),
            maximum: Some(8000.0),
            unit: Some("rpm".to_string()),
            choices: None,
            comment: None,
        }
    }

    fn test_message(frame_id: u32, name: &str) -> Message {
        Message {
            frame_id,
            name: name.to_string(),
            length: 8,
            cycle_time_ms: None,
            signals: vec![test_signal("EngineSpeed")],
            comment: None,
        }
    }

    #[test]
    fn test_empty_database() {
        let db = Database::from_messages(vec![]);
        let stats = db.stats();
        assert_eq!(stats.num_messages, 0);
        assert_eq!(stats.num_signals, 0);
        assert!(db.get_message_by_id(0x123).is_none());
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let db = Database::from_messages(vec![test_message(0x123, "EngineData")]);

        let msg = db.get_message_by_id(0x123).unwrap();
        assert_eq!(msg.name, "EngineData");
        assert_eq!(msg.signals[0].name, "EngineSpeed");

        let msg = db.get_message_by_name("EngineData").unwrap();
        assert_eq!(msg.frame_id, 0x123);

        assert!(db.get_message_by_id(0x999).is_none());
        assert!(db.get_message_by_name("Nope").is_none());
    }

    #[test]
    fn test_messages_sorted_by_frame_id() {
        let db = Database::from_messages(vec![
            test_message(0x300, "C"),
            test_message(0x100, "A"),
            test_message(0x200, "B"),
        ]);

        let ids: Vec<u32> = db.messages().iter().map(|m| m.frame_id).collect();
        assert_eq!(ids, vec![0x100, 0x200, 0x300]);

        let summaries = db.message_summaries();
        assert_eq!(summaries[0].name, "A");
        assert_eq!(summaries[2].name, "C");
    }

    #[test]
    fn test_duplicate_frame_id_keeps_first() {
        let db = Database::from_messages(vec![
            test_message(0x100, "First"),
            test_message(0x100, "Second"),
        ]);
        assert_eq!(db.stats().num_messages, 1);
        assert_eq!(db.get_message_by_id(0x100).unwrap().name, "First");
    }

    #[test]
    fn test_all_signals_iterates_every_message() {
        let db = Database::from_messages(vec![
            test_message(0x100, "A"),
            test_message(0x200, "B"),
        ]);
        let pairs: Vec<(&str, &str)> = db
            .all_signals()
            .map(|(m, s)| (m.name.as_str(), s.name.as_str()))
            .collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("A", "EngineSpeed"));
    }

    #[test]
    fn test_signals_of() {
        let db = Database::from_messages(vec![test_message(0x123, "EngineData")]);
        let signals = db.signals_of(0x123).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].unit.as_deref(), Some("rpm"));
        assert!(db.signals_of(0x999).is_none());
    }
}
