//! SYM 6.0 parser
//!
//! Parser for the PCAN Symbol Editor SYM format, version 6.0 only. Older
//! variants (notably the legacy 5.x files) are recognized by their
//! `FormatVersion` header and rejected with a dedicated, user-actionable
//! error instead of a generic parse failure.
//!
//! Supported subset: `{ENUMS}` blocks, message sections
//! (`{SEND}`/`{RECEIVE}`/`{SENDRECEIVE}`), `[Message]` blocks with `ID=`,
//! `Len=`, `CycleTime=`, and `Var=` signal lines with the `/u: /f: /o:
//! /min: /max: /e:` attributes and the `-m` Motorola flag.

use crate::database::dbc::sawtooth_to_linear;
use crate::database::{ByteOrder, Message, Signal, ValueType};
use crate::types::{LoadError, Result};
use std::collections::{BTreeMap, HashMap};

/// The single SYM dialect version this parser accepts
pub const SUPPORTED_VERSION: &str = "6.0";

/// Parse a SYM 6.0 document into message definitions
pub fn parse_sym(text: &str) -> Result<Vec<Message>> {
    let mut messages: Vec<Message> = Vec::new();
    let mut enums: HashMap<String, BTreeMap<i64, String>> = HashMap::new();
    // (message index, signal index, enum name) resolved after all {ENUMS}
    // blocks are read; SYM does not require enums to precede their use.
    let mut enum_refs: Vec<(usize, usize, String, usize)> = Vec::new();

    let mut version_seen = false;
    let mut in_enums = false;

    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line_no = i + 1;
        let line = lines[i].trim();
        i += 1;

        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if let Some(value) = line.strip_prefix("FormatVersion=") {
            let found = value.split("//").next().unwrap_or("").trim().to_string();
            if found != SUPPORTED_VERSION {
                return Err(LoadError::UnsupportedDialectVersion {
                    found,
                    supported: SUPPORTED_VERSION,
                });
            }
            version_seen = true;
            continue;
        }

        if !version_seen {
            return Err(parse_err(
                line_no,
                "SYM file does not start with a FormatVersion header",
            ));
        }

        if line.starts_with('{') {
            in_enums = line.eq_ignore_ascii_case("{ENUMS}");
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            in_enums = false;
            messages.push(Message {
                frame_id: u32::MAX, // patched by the ID= line below
                name: name.to_string(),
                length: 8,
                cycle_time_ms: None,
                signals: Vec::new(),
                comment: None,
            });
            continue;
        }

        if in_enums {
            if let Some(rest) = line.strip_prefix("enum ") {
                // Enum bodies may span lines until the closing ')'.
                let mut stmt = rest.to_string();
                while !stmt.contains(')') && i < lines.len() {
                    stmt.push(' ');
                    stmt.push_str(lines[i].trim());
                    i += 1;
                }
                let (name, choices) = parse_enum(&stmt, line_no)?;
                enums.insert(name, choices);
            } else {
                log::debug!("skipping line {} inside {{ENUMS}}", line_no);
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            log::debug!("skipping unrecognized SYM line {}", line_no);
            continue;
        };
        let key = key.trim();

        // Only message-body keys require an open [Message] block; globals
        // like Title= are skipped below.
        let message_key = matches!(key, "ID" | "Len" | "DLC" | "CycleTime" | "Var");
        if !message_key {
            log::debug!("skipping SYM key '{}' at line {}", key, line_no);
            continue;
        }
        let msg_idx = messages.len().checked_sub(1).ok_or_else(|| {
            parse_err(line_no, format!("'{}' outside of a [Message] block", key))
        })?;

        match key {
            "ID" => {
                let raw = value.split("//").next().unwrap_or("").trim();
                messages[msg_idx].frame_id = parse_can_id(raw)
                    .ok_or_else(|| parse_err(line_no, "invalid message ID"))?;
            }
            "Len" | "DLC" => {
                let raw = value.split("//").next().unwrap_or("").trim();
                let length: u8 = raw
                    .parse()
                    .map_err(|_| parse_err(line_no, "invalid message length"))?;
                if length > 8 {
                    return Err(parse_err(
                        line_no,
                        format!("message declares {} bytes, classic CAN allows at most 8", length),
                    ));
                }
                messages[msg_idx].length = length;
            }
            "CycleTime" => {
                let raw = value.split("//").next().unwrap_or("").trim();
                let cycle: u32 = raw
                    .trim_end_matches("ms")
                    .trim()
                    .parse()
                    .map_err(|_| parse_err(line_no, "invalid CycleTime value"))?;
                messages[msg_idx].cycle_time_ms = Some(cycle);
            }
            "Var" => {
                let (signal, enum_name) = parse_var(value, line_no)?;
                let sig_idx = messages[msg_idx].signals.len();
                if let Some(enum_name) = enum_name {
                    enum_refs.push((msg_idx, sig_idx, enum_name, line_no));
                }
                messages[msg_idx].signals.push(signal);
            }
            _ => {}
        }
    }

    if !version_seen {
        return Err(parse_err(1, "SYM file has no FormatVersion header"));
    }
    if let Some(message) = messages.iter().find(|m| m.frame_id == u32::MAX) {
        return Err(parse_err(
            1,
            format!("message '{}' has no ID= line", message.name),
        ));
    }

    for (msg_idx, sig_idx, enum_name, line_no) in enum_refs {
        match enums.get(&enum_name) {
            Some(choices) => {
                messages[msg_idx].signals[sig_idx].choices = Some(choices.clone());
            }
            None => log::warn!(
                "signal references undefined enum '{}' at line {}",
                enum_name,
                line_no
            ),
        }
    }

    log::info!("parsed {} messages from SYM text", messages.len());
    Ok(messages)
}

/// Parse the body of `enum Name(0="a", 1="b", ...)`
fn parse_enum(stmt: &str, line_no: usize) -> Result<(String, BTreeMap<i64, String>)> {
    let (name, rest) = stmt
        .split_once('(')
        .ok_or_else(|| parse_err(line_no, "enum missing '('"))?;
    let body = rest
        .rsplit_once(')')
        .ok_or_else(|| parse_err(line_no, "enum missing ')'"))?
        .0;

    let mut choices = BTreeMap::new();
    let mut rest = body.trim();
    while !rest.is_empty() {
        let (raw_tok, r) = match rest.split_once('=') {
            Some(parts) => parts,
            None => break,
        };
        let raw: i64 = raw_tok
            .trim()
            .parse()
            .map_err(|_| parse_err(line_no, "invalid raw value in enum"))?;
        let r = r.trim_start();
        let stripped = r
            .strip_prefix('"')
            .ok_or_else(|| parse_err(line_no, "enum label missing opening quote"))?;
        let end = stripped
            .find('"')
            .ok_or_else(|| parse_err(line_no, "enum label missing closing quote"))?;
        choices.insert(raw, stripped[..end].to_string());
        rest = stripped[end + 1..].trim_start().trim_start_matches(',').trim_start();
    }

    Ok((name.trim().to_string(), choices))
}

/// Parse a `Var=` value: `<name> <type> <start>,<len> [attributes] [// comment]`
fn parse_var(value: &str, line_no: usize) -> Result<(Signal, Option<String>)> {
    let (body, comment) = match value.split_once("//") {
        Some((body, comment)) => (body, Some(comment.trim().to_string())),
        None => (value, None),
    };

    let mut tokens = body.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| parse_err(line_no, "Var missing signal name"))?
        .to_string();
    let type_tok = tokens
        .next()
        .ok_or_else(|| parse_err(line_no, "Var missing signal type"))?;
    let value_type = match type_tok {
        "unsigned" | "bit" => ValueType::Unsigned,
        "signed" => ValueType::Signed,
        other => {
            return Err(parse_err(
                line_no,
                format!("unsupported signal type '{}' (expected unsigned, signed or bit)", other),
            ))
        }
    };

    let layout_tok = tokens
        .next()
        .ok_or_else(|| parse_err(line_no, "Var missing start,length"))?;
    let (start_s, len_s) = layout_tok
        .split_once(',')
        .ok_or_else(|| parse_err(line_no, "Var layout missing ','"))?;
    let sym_start: u16 = start_s
        .parse()
        .map_err(|_| parse_err(line_no, "invalid Var start bit"))?;
    let length: u16 = len_s
        .parse()
        .map_err(|_| parse_err(line_no, "invalid Var length"))?;
    if length == 0 || length > 64 {
        return Err(parse_err(
            line_no,
            format!("signal '{}' has length {}, expected 1..=64", name, length),
        ));
    }

    let mut byte_order = ByteOrder::LittleEndian;
    let mut scale = 1.0;
    let mut offset = 0.0;
    let mut minimum = None;
    let mut maximum = None;
    let mut unit = None;
    let mut enum_name = None;

    for token in tokens {
        if token == "-m" {
            byte_order = ByteOrder::BigEndian;
        } else if let Some(v) = token.strip_prefix("/u:") {
            unit = Some(v.to_string());
        } else if let Some(v) = token.strip_prefix("/f:") {
            scale = v
                .parse()
                .map_err(|_| parse_err(line_no, "invalid /f: factor"))?;
        } else if let Some(v) = token.strip_prefix("/o:") {
            offset = v
                .parse()
                .map_err(|_| parse_err(line_no, "invalid /o: offset"))?;
        } else if let Some(v) = token.strip_prefix("/min:") {
            minimum = Some(
                v.parse()
                    .map_err(|_| parse_err(line_no, "invalid /min: value"))?,
            );
        } else if let Some(v) = token.strip_prefix("/max:") {
            maximum = Some(
                v.parse()
                    .map_err(|_| parse_err(line_no, "invalid /max: value"))?,
            );
        } else if let Some(v) = token.strip_prefix("/e:") {
            enum_name = Some(v.to_string());
        } else {
            log::debug!("ignoring Var attribute '{}' at line {}", token, line_no);
        }
    }

    let start_bit = match byte_order {
        ByteOrder::LittleEndian => sym_start,
        ByteOrder::BigEndian => sawtooth_to_linear(sym_start),
    };

    Ok((
        Signal {
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
            comment,
        },
        enum_name,
    ))
}

/// Parse a SYM CAN id: hex with an `h` suffix (`1F4h`) or plain decimal
fn parse_can_id(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_suffix('h').or_else(|| s.strip_suffix('H')) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn parse_err(line: usize, detail: impl Into<String>) -> LoadError {
    LoadError::ParseError {
        line,
        detail: detail.into(),
    }
}
