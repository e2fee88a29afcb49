//! Standalone frame decode tool
//!
//! Loads a DBC or SYM database, lists its messages, and optionally decodes
//! one frame given as a CAN id and hex payload.
//!
//! Usage:
//!   decode_dbc <database.dbc|database.sym> [<frame_id_hex> <payload_hex>]
//!
//! Example:
//!   decode_dbc powertrain.dbc 123 E02E8C0000000000

use can_signal_codec::{Codec, Database};
use std::env;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 && args.len() != 4 {
        eprintln!("Usage: {} <database.dbc|database.sym> [<frame_id_hex> <payload_hex>]", args[0]);
        return ExitCode::FAILURE;
    }

    let db = match Database::load(Path::new(&args[1])) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("=== MESSAGES ===");
    for summary in db.message_summaries() {
        println!(
            "0x{:03X} {} ({} bytes, {} signals)",
            summary.frame_id,
            summary.name,
            summary.length,
            summary.signal_names.len()
        );
        for name in &summary.signal_names {
            println!("    {}", name);
        }
    }

    if args.len() == 4 {
        let frame_id = match u32::from_str_radix(&args[2], 16) {
            Ok(id) => id,
            Err(_) => {
                eprintln!("Invalid frame id: {}", args[2]);
                return ExitCode::FAILURE;
            }
        };
        let payload = match parse_hex(&args[3]) {
            Some(bytes) => bytes,
            None => {
                eprintln!("Invalid hex payload: {}", args[3]);
                return ExitCode::FAILURE;
            }
        };

        println!("\n=== DECODE 0x{:X} ===", frame_id);
        match Codec::decode(&db, frame_id, &payload) {
            Some(decoded) => {
                println!("{}", decoded.name);
                let mut names: Vec<&String> = decoded.signals.keys().collect();
                names.sort();
                for name in names {
                    let signal = &decoded.signals[name];
                    let unit = signal.unit.as_deref().unwrap_or("");
                    match &signal.label {
                        Some(label) => {
                            println!("  {} = {} {} ({})", name, signal.physical, unit, label)
                        }
                        None => println!("  {} = {} {} (raw {})", name, signal.physical, unit, signal.raw),
                    }
                }
                for warning in &decoded.warnings {
                    println!("  warning: {}", warning);
                }
            }
            None => println!("frame id not in database (undecoded frame)"),
        }
    }

    ExitCode::SUCCESS
}

fn parse_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
