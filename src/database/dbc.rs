//! DBC subset parser
//!
//! An owned, line-oriented parser for the DBC subset this codec needs:
//! messages (`BO_`), signals (`SG_`), value tables (`VAL_`), comments
//! (`CM_ BO_`/`CM_ SG_`) and the `GenMsgCycleTime` attribute (`BA_`). Every
//! other keyword is skipped. Multiplexer markers on signals are accepted and
//! ignored; multiplex routing is not a codec concern.
//!
//! Motorola start bits are normalized at parse time: DBC stores them in
//! sawtooth numbering (bit 7 = MSB of byte 0), the codec numbers big-endian
//! bits linearly MSB-first (bit 0 = MSB of byte 0). The conversion is
//! `linear = 8 * (dbc / 8) + (7 - dbc % 8)`.

use crate::database::{ByteOrder, Message, Signal, ValueType};
use crate::types::{LoadError, Result};
use std::collections::BTreeMap;

/// Parse a DBC document into message definitions
pub fn parse_dbc(text: &str) -> Result<Vec<Message>> {
    let mut parser = DbcParser::default();
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line_no = i + 1;
        let line = lines[i].trim();
        i += 1;

        if line.is_empty() {
            continue;
        }

        let keyword = line.split_whitespace().next().unwrap_or("");
        match keyword {
            "BO_" => parser.parse_message(line, line_no)?,
            "SG_" => parser.parse_signal(line, line_no)?,
            "VAL_" | "CM_" | "BA_" => {
                // These statements are ';'-terminated and may span lines
                // (comments legally contain newlines).
                let mut stmt = line.to_string();
                while !stmt.trim_end().ends_with(';') && i < lines.len() {
                    stmt.push('\n');
                    stmt.push_str(lines[i]);
                    i += 1;
                }
                match keyword {
                    "VAL_" => parser.parse_value_table(&stmt, line_no)?,
                    "CM_" => parser.parse_comment(&stmt, line_no)?,
                    _ => parser.parse_attribute(&stmt, line_no)?,
                }
            }
            other => {
                log::debug!("skipping DBC keyword '{}' at line {}", other, line_no);
            }
        }
    }

    log::info!("parsed {} messages from DBC text", parser.messages.len());
    Ok(parser.messages)
}

#[derive(Default)]
struct DbcParser {
    messages: Vec<Message>,
    /// Index of the message the current `SG_` lines belong to
    current: Option<usize>,
}

impl DbcParser {
    /// `BO_ <id> <name>: <length> <sender>`
    fn parse_message(&mut self, line: &str, line_no: usize) -> Result<()> {
        let rest = &line["BO_".len()..];
        let (head, tail) = rest
            .split_once(':')
            .ok_or_else(|| parse_err(line_no, "BO_ line missing ':'"))?;

        let mut head_tokens = head.split_whitespace();
        let raw_id: u32 = head_tokens
            .next()
            .ok_or_else(|| parse_err(line_no, "BO_ line missing message id"))?
            .parse()
            .map_err(|_| parse_err(line_no, "invalid message id in BO_ line"))?;
        let name = head_tokens
            .next()
            .ok_or_else(|| parse_err(line_no, "BO_ line missing message name"))?
            .to_string();

        let length: u8 = tail
            .split_whitespace()
            .next()
            .ok_or_else(|| parse_err(line_no, "BO_ line missing message length"))?
            .parse()
            .map_err(|_| parse_err(line_no, "invalid message length in BO_ line"))?;
        if length > 8 {
            return Err(parse_err(
                line_no,
                format!("message '{}' declares {} bytes, classic CAN allows at most 8", name, length),
            ));
        }

        self.current = Some(self.messages.len());
        self.messages.push(Message {
            // Bit 31 is the extended-frame flag in DBC ids.
            frame_id: raw_id & !0x8000_0000,
            name,
            length,
            cycle_time_ms: None,
            signals: Vec::new(),
            comment: None,
        });
        Ok(())
    }

    /// `SG_ <name> [M|m<N>] : <start>|<len>@<order><sign> (<scale>,<offset>) [<min>|<max>] "<unit>" <receivers>`
    fn parse_signal(&mut self, line: &str, line_no: usize) -> Result<()> {
        let msg_idx = self
            .current
            .ok_or_else(|| parse_err(line_no, "SG_ line outside of a BO_ block"))?;

        let (head, tail) = line
            .split_once(':')
            .ok_or_else(|| parse_err(line_no, "SG_ line missing ':'"))?;

        let mut head_tokens = head.split_whitespace().skip(1);
        let name = head_tokens
            .next()
            .ok_or_else(|| parse_err(line_no, "SG_ line missing signal name"))?
            .to_string();
        if let Some(mux) = head_tokens.next() {
            log::debug!("ignoring multiplex marker '{}' on signal '{}'", mux, name);
        }

        // Layout token: <start>|<len>@<order><sign>
        let (layout, rest) = split_token(tail.trim_start());
        let (bits, order_sign) = layout
            .split_once('@')
            .ok_or_else(|| parse_err(line_no, "signal layout missing '@'"))?;
        let (start_s, len_s) = bits
            .split_once('|')
            .ok_or_else(|| parse_err(line_no, "signal layout missing '|'"))?;

        let dbc_start: u16 = start_s
            .parse()
            .map_err(|_| parse_err(line_no, "invalid signal start bit"))?;
        let length: u16 = len_s
            .parse()
            .map_err(|_| parse_err(line_no, "invalid signal length"))?;
        if length == 0 || length > 64 {
            return Err(parse_err(
                line_no,
                format!("signal '{}' has length {}, expected 1..=64", name, length),
            ));
        }

        let mut order_chars = order_sign.chars();
        let byte_order = match order_chars.next() {
            Some('1') => ByteOrder::LittleEndian,
            Some('0') => ByteOrder::BigEndian,
            _ => return Err(parse_err(line_no, "invalid byte order in signal layout")),
        };
        let value_type = match order_chars.next() {
            Some('+') => ValueType::Unsigned,
            Some('-') => ValueType::Signed,
            _ => return Err(parse_err(line_no, "invalid sign in signal layout")),
        };

        let start_bit = match byte_order {
            ByteOrder::LittleEndian => dbc_start,
            ByteOrder::BigEndian => sawtooth_to_linear(dbc_start),
        };

        // (scale,offset)
        let rest = rest.trim_start();
        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.split_once(')'))
            .ok_or_else(|| parse_err(line_no, "signal missing (scale,offset)"))?;
        let (scale_s, offset_s) = inner
            .0
            .split_once(',')
            .ok_or_else(|| parse_err(line_no, "malformed (scale,offset)"))?;
        let scale: f64 = scale_s
            .trim()
            .parse()
            .map_err(|_| parse_err(line_no, "invalid signal scale"))?;
        let offset: f64 = offset_s
            .trim()
            .parse()
            .map_err(|_| parse_err(line_no, "invalid signal offset"))?;
        let mut rest = inner.1.trim_start();

        // Optional [min|max]; [0|0] means unspecified
        let mut minimum = None;
        let mut maximum = None;
        if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.split_once(']')) {
            let (min_s, max_s) = inner
                .0
                .split_once('|')
                .ok_or_else(|| parse_err(line_no, "malformed [min|max]"))?;
            let min: f64 = min_s
                .trim()
                .parse()
                .map_err(|_| parse_err(line_no, "invalid signal minimum"))?;
            let max: f64 = max_s
                .trim()
                .parse()
                .map_err(|_| parse_err(line_no, "invalid signal maximum"))?;
            if min != 0.0 || max != 0.0 {
                minimum = Some(min);
                maximum = Some(max);
            }
            rest = inner.1.trim_start();
        }

        // Optional "unit"
        let unit = match take_quoted(rest) {
            Some((text, _)) if !text.is_empty() => Some(text),
            _ => None,
        };

        self.messages[msg_idx].signals.push(Signal {
            name,
            start_bit,
            length,
            byte_order,
            value_type,
            scale,
            offset,
            minimum,
            maximum,
            unit,
            choices: None,
            comment: None,
        });
        Ok(())
    }

    /// `VAL_ <id> <signal> <raw> "<label>" ... ;`
    fn parse_value_table(&mut self, stmt: &str, line_no: usize) -> Result<()> {
        let mut rest = stmt["VAL_".len()..].trim_start();

        let (id_tok, r) = split_token(rest);
        // VAL_ with a leading quote at this position is an environment
        // variable value table, which this subset does not track.
        let raw_id: u32 = match id_tok.parse() {
            Ok(id) => id,
            Err(_) => {
                log::debug!("skipping non-message VAL_ at line {}", line_no);
                return Ok(());
            }
        };
        rest = r;

        let (signal_name, r) = split_token(rest.trim_start());
        let signal_name = signal_name.to_string();
        rest = r;

        let mut choices = BTreeMap::new();
        loop {
            rest = rest.trim_start();
            if rest.is_empty() || rest.starts_with(';') {
                break;
            }
            let (raw_tok, r) = split_token(rest);
            let raw: i64 = raw_tok
                .parse()
                .map_err(|_| parse_err(line_no, "invalid raw value in VAL_"))?;
            let (label, r) = take_quoted(r.trim_start())
                .ok_or_else(|| parse_err(line_no, "missing label string in VAL_"))?;
            choices.insert(raw, label);
            rest = r;
        }

        let frame_id = raw_id & !0x8000_0000;
        match self.find_signal_mut(frame_id, &signal_name) {
            Some(signal) => signal.choices = Some(choices),
            None => log::warn!(
                "VAL_ at line {} references unknown signal {}/0x{:X}",
                line_no,
                signal_name,
                frame_id
            ),
        }
        Ok(())
    }

    /// `CM_ BO_ <id> "text";` and `CM_ SG_ <id> <signal> "text";`
    fn parse_comment(&mut self, stmt: &str, line_no: usize) -> Result<()> {
        let rest = stmt["CM_".len()..].trim_start();
        let (kind, rest) = split_token(rest);

        match kind {
            "BO_" => {
                let (id_tok, rest) = split_token(rest.trim_start());
                let raw_id: u32 = id_tok
                    .parse()
                    .map_err(|_| parse_err(line_no, "invalid message id in CM_ BO_"))?;
                let (text, _) = take_quoted(rest.trim_start())
                    .ok_or_else(|| parse_err(line_no, "missing comment string in CM_ BO_"))?;
                let frame_id = raw_id & !0x8000_0000;
                match self.find_message_mut(frame_id) {
                    Some(message) => message.comment = Some(text),
                    None => log::warn!("CM_ BO_ at line {} references unknown id 0x{:X}", line_no, frame_id),
                }
            }
            "SG_" => {
                let (id_tok, rest) = split_token(rest.trim_start());
                let raw_id: u32 = id_tok
                    .parse()
                    .map_err(|_| parse_err(line_no, "invalid message id in CM_ SG_"))?;
                let (signal_name, rest) = split_token(rest.trim_start());
                let signal_name = signal_name.to_string();
                let (text, _) = take_quoted(rest.trim_start())
                    .ok_or_else(|| parse_err(line_no, "missing comment string in CM_ SG_"))?;
                let frame_id = raw_id & !0x8000_0000;
                match self.find_signal_mut(frame_id, &signal_name) {
                    Some(signal) => signal.comment = Some(text),
                    None => log::warn!(
                        "CM_ SG_ at line {} references unknown signal {}/0x{:X}",
                        line_no,
                        signal_name,
                        frame_id
                    ),
                }
            }
            other => {
                log::debug!("skipping CM_ {} at line {}", other, line_no);
            }
        }
        Ok(())
    }

    /// `BA_ "GenMsgCycleTime" BO_ <id> <value>;`
    fn parse_attribute(&mut self, stmt: &str, line_no: usize) -> Result<()> {
        let rest = stmt["BA_".len()..].trim_start();
        let (attr_name, rest) = match take_quoted(rest) {
            Some(parsed) => parsed,
            None => {
                log::debug!("skipping malformed BA_ at line {}", line_no);
                return Ok(());
            }
        };
        if attr_name != "GenMsgCycleTime" {
            log::debug!("skipping attribute '{}' at line {}", attr_name, line_no);
            return Ok(());
        }

        let (kind, rest) = split_token(rest.trim_start());
        if kind != "BO_" {
            return Ok(());
        }
        let (id_tok, rest) = split_token(rest.trim_start());
        let raw_id: u32 = id_tok
            .parse()
            .map_err(|_| parse_err(line_no, "invalid message id in BA_ GenMsgCycleTime"))?;
        let value_tok = rest.trim_start().trim_end().trim_end_matches(';').trim_end();
        let cycle_time: u32 = value_tok
            .parse()
            .map_err(|_| parse_err(line_no, "invalid GenMsgCycleTime value"))?;

        let frame_id = raw_id & !0x8000_0000;
        if let Some(message) = self.find_message_mut(frame_id) {
            message.cycle_time_ms = Some(cycle_time);
        }
        Ok(())
    }

    fn find_message_mut(&mut self, frame_id: u32) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.frame_id == frame_id)
    }

    fn find_signal_mut(&mut self, frame_id: u32, signal_name: &str) -> Option<&mut Signal> {
        self.find_message_mut(frame_id)?
            .signals
            .iter_mut()
            .find(|s| s.name == signal_name)
    }
}

/// Convert a DBC Motorola start bit (sawtooth numbering, bit 7 = MSB of
/// byte 0) to the codec's linear MSB-first numbering (bit 0 = MSB of byte 0).
pub(crate) fn sawtooth_to_linear(start_bit: u16) -> u16 {
    8 * (start_bit / 8) + (7 - start_bit % 8)
}

/// Split off the first whitespace-delimited token
fn split_token(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, ""),
    }
}

/// Parse a leading `"..."` string, returning the content and the remainder
///
/// Backslash escapes are unescaped, so `\"` inside the string does not
/// terminate it.
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let rest = s.strip_prefix('"')?;
    let mut text = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                text.push(escaped);
            }
            '"' => return Some((text, &rest[i + 1..])),
            _ => text.push(c),
        }
    }
    None
}

fn parse_err(line: usize, detail: impl Into<String>) -> LoadError {
    LoadError::ParseError {
        line,
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use std::io::Write;

    const SIMPLE_DBC: &str = r#"
VERSION ""

BS_:

BU_: ECU1 ECU2

BO_ 291 EngineData: 8 ECU1
 SG_ EngineSpeed : 0|16@1+ (1,0) [0|8000] "rpm" ECU2
 SG_ EngineTemp : 16|8@1+ (1,-40) [-40|215] "C" ECU2

BO_ 512 BatteryStatus: 8 ECU1
 SG_ BatteryVoltage : 0|16@1+ (0.01,0) [0|16] "V" ECU2

VAL_ 291 EngineTemp 0 "Cold" 1 "Warm" ;
CM_ BO_ 291 "Engine state broadcast";
CM_ SG_ 291 EngineSpeed "Crankshaft speed";
BA_ "GenMsgCycleTime" BO_ 291 100;
"#;

    #[test]
    fn test_parse_simple_dbc() {
        let messages = parse_dbc(SIMPLE_DBC).unwrap();
        assert_eq!(messages.len(), 2);

        let msg = &messages[0];
        assert_eq!(msg.frame_id, 291);
        assert_eq!(msg.name, "EngineData");
        assert_eq!(msg.length, 8);
        assert_eq!(msg.signals.len(), 2);
        assert_eq!(msg.cycle_time_ms, Some(100));
        assert_eq!(msg.comment.as_deref(), Some("Engine state broadcast"));

        let sig = &msg.signals[0];
        assert_eq!(sig.name, "EngineSpeed");
        assert_eq!(sig.start_bit, 0);
        assert_eq!(sig.length, 16);
        assert_eq!(sig.byte_order, ByteOrder::LittleEndian);
        assert_eq!(sig.value_type, ValueType::Unsigned);
        assert_eq!(sig.scale, 1.0);
        assert_eq!(sig.offset, 0.0);
        assert_eq!(sig.minimum, Some(0.0));
        assert_eq!(sig.maximum, Some(8000.0));
        assert_eq!(sig.unit.as_deref(), Some("rpm"));
        assert_eq!(sig.comment.as_deref(), Some("Crankshaft speed"));

        let temp = &msg.signals[1];
        assert_eq!(temp.offset, -40.0);
        let choices = temp.choices.as_ref().unwrap();
        assert_eq!(choices.get(&0).map(String::as_str), Some("Cold"));
        assert_eq!(choices.get(&1).map(String::as_str), Some("Warm"));
    }

    #[test]
    fn test_big_endian_start_bit_normalized() {
        // DBC sawtooth start bit 7 is the MSB of byte 0, which the codec
        // numbers as linear bit 0.
        let dbc = r#"
BO_ 100 Msg: 8 ECU1
 SG_ Temp : 7|16@0- (0.01,250) [229.52|270.47] "degK" ECU1
"#;
        let messages = parse_dbc(dbc).unwrap();
        let sig = &messages[0].signals[0];
        assert_eq!(sig.start_bit, 0);
        assert_eq!(sig.byte_order, ByteOrder::BigEndian);
        assert_eq!(sig.value_type, ValueType::Signed);
    }

    #[test]
    fn test_sawtooth_conversion() {
        assert_eq!(sawtooth_to_linear(7), 0); // MSB of byte 0
        assert_eq!(sawtooth_to_linear(0), 7); // LSB of byte 0
        assert_eq!(sawtooth_to_linear(15), 8); // MSB of byte 1
        assert_eq!(sawtooth_to_linear(8), 15); // LSB of byte 1
    }

    #[test]
    fn test_multiplex_markers_ignored() {
        let dbc = r#"
BO_ 512 MultiplexedMsg: 8 ECU1
 SG_ Mode M : 0|8@1+ (1,0) [0|3] "" ECU1
 SG_ SignalA m0 : 8|16@1+ (1,0) [0|100] "%" ECU1
"#;
        let messages = parse_dbc(dbc).unwrap();
        assert_eq!(messages[0].signals.len(), 2);
        assert_eq!(messages[0].signals[0].name, "Mode");
        assert_eq!(messages[0].signals[1].name, "SignalA");
    }

    #[test]
    fn test_extended_frame_flag_stripped() {
        let dbc = r#"
BO_ 2566914690 TelemetryMsg: 8 ECU1
 SG_ Counter : 0|8@1+ (1,0) [0|255] "" ECU1
"#;
        let messages = parse_dbc(dbc).unwrap();
        // 2566914690 = 0x99000282; bit 31 is the extended-frame flag.
        assert_eq!(messages[0].frame_id, 0x19000282);
    }

    #[test]
    fn test_zero_min_max_means_unspecified() {
        let dbc = r#"
BO_ 100 Msg: 8 ECU1
 SG_ Counter : 0|8@1+ (1,0) [0|0] "" ECU1
"#;
        let messages = parse_dbc(dbc).unwrap();
        let sig = &messages[0].signals[0];
        assert_eq!(sig.minimum, None);
        assert_eq!(sig.maximum, None);
        assert_eq!(sig.unit, None);
    }

    #[test]
    fn test_malformed_signal_is_parse_error() {
        let dbc = r#"
BO_ 100 Msg: 8 ECU1
 SG_ Broken : 0|16@1 [0|10] "" ECU1
"#;
        let err = parse_dbc(dbc).unwrap_err();
        match err {
            LoadError::ParseError { line, .. } => assert_eq!(line, 3),
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_signal_outside_message_is_parse_error() {
        let dbc = r#" SG_ Orphan : 0|8@1+ (1,0) [0|255] "" ECU1"#;
        assert!(matches!(
            parse_dbc(dbc),
            Err(LoadError::ParseError { .. })
        ));
    }

    #[test]
    fn test_oversized_message_rejected() {
        let dbc = "BO_ 100 TooBig: 12 ECU1";
        assert!(matches!(
            parse_dbc(dbc),
            Err(LoadError::ParseError { .. })
        ));
    }

    #[test]
    fn test_load_dbc_from_path() {
        let mut temp_file = tempfile::Builder::new()
            .suffix(".dbc")
            .tempfile()
            .unwrap();
        temp_file.write_all(SIMPLE_DBC.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let db = Database::load(temp_file.path()).unwrap();
        assert_eq!(db.stats().num_messages, 2);
        assert!(db.get_message_by_name("BatteryStatus").is_some());
    }

    #[test]
    fn test_comment_with_escaped_quote() {
        let dbc = "BO_ 100 Msg: 8 ECU1\n SG_ S : 0|8@1+ (1,0) [0|255] \"\" ECU1\nCM_ BO_ 100 \"the \\\"fast\\\" channel\";";
        let messages = parse_dbc(dbc).unwrap();
        assert_eq!(
            messages[0].comment.as_deref(),
            Some("the \"fast\" channel")
        );
    }

    #[test]
    fn test_multiline_comment() {
        let dbc = "BO_ 100 Msg: 8 ECU1\n SG_ S : 0|8@1+ (1,0) [0|255] \"\" ECU1\nCM_ BO_ 100 \"first line\nsecond line\";";
        let messages = parse_dbc(dbc).unwrap();
        assert_eq!(
            messages[0].comment.as_deref(),
            Some("first line\nsecond line")
        );
    }
}
