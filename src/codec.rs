//! Bit-exact codec engine
//!
//! Converts raw frame bytes to named physical values and back, driven by the
//! database model. Both paths are pure functions of (database, input): no
//! state is held between calls, no I/O is performed, and nothing here blocks,
//! so decode/encode are safe on the per-frame hot path from any thread.
//!
//! Bit conventions:
//! - Little-endian (Intel): bit k of the signal lives at bit `k % 8` (LSB
//!   relative) of byte `k / 8`, counted from `start_bit`; bits accumulate
//!   LSB-first into the raw integer.
//! - Big-endian (Motorola): bit 0 is the MSB of byte 0 and numbering
//!   continues MSB-first through the buffer; bits accumulate MSB-first.
//!
//! Packing is the exact mirror of extraction, so for any raw value that fits
//! the field, encode-then-decode reproduces it bit for bit.

use crate::database::{ByteOrder, Database, Message, Signal, ValueType};
use crate::types::{DecodeWarning, DecodedMessage, DecodedSignal, EncodeError};
use std::collections::HashMap;

/// The codec engine - stateless decode/encode against a database snapshot
pub struct Codec;

impl Codec {
    /// Decode a raw frame into named signal values
    ///
    /// Returns `None` if `frame_id` is not in the database; the caller
    /// surfaces such frames as undecoded rather than as errors. Signals whose
    /// bit range exceeds the received payload are skipped and reported in
    /// `warnings` - a malformed signal never blocks the rest of the frame.
    ///
    /// # Example
    /// ```no_run
    /// use can_signal_codec::{Codec, Database};
    /// use std::path::Path;
    ///
    /// let db = Database::load(Path::new("powertrain.dbc")).unwrap();
    /// if let Some(decoded) = Codec::decode(&db, 0x123, &[0x34, 0x12, 0, 0, 0, 0, 0, 0]) {
    ///     for (name, signal) in &decoded.signals {
    ///         println!("{} = {} {:?}", name, signal.physical, signal.unit);
    ///     }
    /// }
    /// ```
    pub fn decode(database: &Database, frame_id: u32, data: &[u8]) -> Option<DecodedMessage> {
        let message = database.get_message_by_id(frame_id)?;

        let mut signals = HashMap::with_capacity(message.signals.len());
        let mut warnings = Vec::new();

        for signal in &message.signals {
            if !fits_in_payload(signal, data.len()) {
                log::warn!(
                    "signal '{}' needs bits {}..{} but frame 0x{:X} has {} bytes, skipping",
                    signal.name,
                    signal.start_bit,
                    signal.start_bit as usize + signal.length as usize,
                    frame_id,
                    data.len()
                );
                warnings.push(DecodeWarning::SignalBitRangeExceeded {
                    signal: signal.name.clone(),
                });
                continue;
            }
            signals.insert(signal.name.clone(), Self::decode_signal(data, signal));
        }

        Some(DecodedMessage {
            name: message.name.clone(),
            frame_id: message.frame_id,
            signals,
            warnings,
        })
    }

    /// Encode physical signal values into a frame payload
    ///
    /// All-or-nothing: any unknown signal name, zero scale, or unknown frame
    /// id fails the whole call and no buffer is returned (encode output goes
    /// on a live bus; partial frames are unacceptable). Signals absent from
    /// `values` are left at zero. A raw value that does not fit the signal's
    /// bit width is clamped to the representable range.
    pub fn encode(
        database: &Database,
        frame_id: u32,
        values: &HashMap<String, f64>,
    ) -> Result<Vec<u8>, EncodeError> {
        let message = Self::target_message(database, frame_id, values.keys())?;
        let mut buffer = vec![0u8; message.length as usize];

        // Declaration order; overlapping signals resolve as last write wins.
        for signal in &message.signals {
            let Some(&physical) = values.get(&signal.name) else {
                continue;
            };
            if signal.scale == 0.0 {
                return Err(EncodeError::ZeroScale(signal.name.clone()));
            }
            if !fits_in_payload(signal, buffer.len()) {
                log::warn!(
                    "signal '{}' does not fit the {}-byte payload of 0x{:X}, skipping",
                    signal.name,
                    message.length,
                    frame_id
                );
                continue;
            }
            // f64 -> i128 casts saturate, so infinities land on the field
            // bounds after clamping and NaN encodes as 0.
            let raw = ((physical - signal.offset) / signal.scale).round() as i128;
            let bits = clamp_to_field(raw, signal.length, signal.value_type);
            Self::insert_raw(&mut buffer, signal, bits);
        }

        Ok(buffer)
    }

    /// Encode raw integer values, bypassing the scale/offset transform
    ///
    /// Same failure semantics as [`Codec::encode`], minus the zero-scale
    /// check (no inversion happens). Used by senders that already hold raw
    /// values and by round-trip verification.
    pub fn encode_raw(
        database: &Database,
        frame_id: u32,
        values: &HashMap<String, i64>,
    ) -> Result<Vec<u8>, EncodeError> {
        let message = Self::target_message(database, frame_id, values.keys())?;
        let mut buffer = vec![0u8; message.length as usize];

        for signal in &message.signals {
            let Some(&raw) = values.get(&signal.name) else {
                continue;
            };
            if !fits_in_payload(signal, buffer.len()) {
                log::warn!(
                    "signal '{}' does not fit the {}-byte payload of 0x{:X}, skipping",
                    signal.name,
                    message.length,
                    frame_id
                );
                continue;
            }
            let bits = clamp_to_field(raw as i128, signal.length, signal.value_type);
            Self::insert_raw(&mut buffer, signal, bits);
        }

        Ok(buffer)
    }

    /// Resolve the target message and reject unknown signal names up front
    fn target_message<'a, 'k>(
        database: &'a Database,
        frame_id: u32,
        names: impl Iterator<Item = &'k String>,
    ) -> Result<&'a Message, EncodeError> {
        let message = database
            .get_message_by_id(frame_id)
            .ok_or(EncodeError::UnknownMessage(frame_id))?;
        for name in names {
            if message.signal(name).is_none() {
                return Err(EncodeError::UnknownSignal(name.clone()));
            }
        }
        Ok(message)
    }

    /// Decode a single signal from frame data (range already validated)
    fn decode_signal(data: &[u8], signal: &Signal) -> DecodedSignal {
        let bits = match signal.byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(data, signal),
            ByteOrder::BigEndian => Self::extract_big_endian(data, signal),
        };

        let (raw, physical) = match signal.value_type {
            ValueType::Unsigned => (bits as i64, bits as f64 * signal.scale + signal.offset),
            ValueType::Signed => {
                let raw = sign_extend(bits, signal.length);
                (raw, raw as f64 * signal.scale + signal.offset)
            }
        };

        let label = signal
            .choices
            .as_ref()
            .and_then(|choices| choices.get(&raw))
            .cloned();

        DecodedSignal {
            raw,
            physical,
            unit: signal.unit.clone(),
            label,
        }
    }

    /// Extract with little-endian (Intel) ordering: `start_bit` addresses the
    /// LSB of the field, bits accumulate LSB-first.
    fn extract_little_endian(data: &[u8], signal: &Signal) -> u64 {
        let start = signal.start_bit as usize;
        let length = signal.length as usize;
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start + i;
            let bit = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
            result |= (bit as u64) << i;
        }

        result
    }

    /// Extract with big-endian (Motorola) ordering: `start_bit` addresses the
    /// MSB of the field in linear MSB-first numbering (bit 0 = MSB of byte 0).
    fn extract_big_endian(data: &[u8], signal: &Signal) -> u64 {
        let start = signal.start_bit as usize;
        let length = signal.length as usize;
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start + i;
            let bit = (data[bit_pos / 8] >> (7 - bit_pos % 8)) & 0x01;
            result |= (bit as u64) << (length - 1 - i);
        }

        result
    }

    /// Write a field's bit pattern into the buffer, mirroring extraction
    fn insert_raw(buffer: &mut [u8], signal: &Signal, bits: u64) {
        let start = signal.start_bit as usize;
        let length = signal.length as usize;

        for i in 0..length {
            let bit_pos = start + i;
            let (byte_idx, bit_in_byte, bit) = match signal.byte_order {
                ByteOrder::LittleEndian => {
                    (bit_pos / 8, bit_pos % 8, (bits >> i) & 0x01)
                }
                ByteOrder::BigEndian => {
                    (bit_pos / 8, 7 - bit_pos % 8, (bits >> (length - 1 - i)) & 0x01)
                }
            };
            if bit != 0 {
                buffer[byte_idx] |= 1 << bit_in_byte;
            } else {
                buffer[byte_idx] &= !(1 << bit_in_byte);
            }
        }
    }
}

/// Whether the signal's bit range lies within a payload of `len` bytes
fn fits_in_payload(signal: &Signal, len: usize) -> bool {
    (signal.start_bit as usize + signal.length as usize) <= len * 8
}

/// Sign-extend an N-bit field to i64 using two's-complement rules
fn sign_extend(bits: u64, length: u16) -> i64 {
    if length >= 64 {
        return bits as i64;
    }
    let sign_bit = 1u64 << (length - 1);
    if bits & sign_bit != 0 {
        (bits | (!0u64 << length)) as i64
    } else {
        bits as i64
    }
}

/// Clamp a raw value to the representable range of an N-bit field and return
/// its bit pattern
///
/// Deliberate policy: out-of-range encode inputs saturate at the field's
/// bounds, they never wrap.
fn clamp_to_field(raw: i128, length: u16, value_type: ValueType) -> u64 {
    let (min, max): (i128, i128) = match value_type {
        ValueType::Unsigned => {
            let max = if length >= 64 {
                u64::MAX as i128
            } else {
                (1i128 << length) - 1
            };
            (0, max)
        }
        ValueType::Signed => {
            let half = 1i128 << (length - 1);
            (-half, half - 1)
        }
    };

    let clamped = raw.clamp(min, max);

    let mask = if length >= 64 {
        u64::MAX
    } else {
        (1u64 << length) - 1
    };
    (clamped as u64) & mask
}
