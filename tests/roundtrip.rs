//! End-to-end codec properties against schemas loaded from DBC/SYM text
//!
//! The unit tests in `src/codec.rs` exercise the bit arithmetic directly;
//! these tests go through the full load -> decode -> encode path the way an
//! application would.

use can_signal_codec::{Codec, Database, EncodeError, LoadError, SharedDatabase};
use std::collections::HashMap;

const POWERTRAIN_DBC: &str = r#"
VERSION ""

BS_:

BU_: ECU1 ECU2

BO_ 291 EngineData: 8 ECU1
 SG_ EngineSpeed : 0|16@1+ (0.25,0) [0|8000] "rpm" ECU2
 SG_ CoolantTemp : 16|8@1+ (1,-40) [-40|215] "C" ECU2
 SG_ BoostPressure : 31|10@0+ (0.1,0) [0|102.3] "kPa" ECU2
 SG_ OilTempDelta : 40|8@1- (0.5,0) [-64|63.5] "C" ECU2

BO_ 512 GearStatus: 2 ECU1
 SG_ Gear : 0|4@1+ (1,0) [0|8] "" ECU2

VAL_ 512 Gear 0 "Neutral" 1 "First" 15 "Reverse" ;
"#;

fn powertrain() -> Database {
    Database::from_dbc(POWERTRAIN_DBC).unwrap()
}

#[test]
fn physical_roundtrip_within_quantization_error() {
    let db = powertrain();
    let message = db.get_message_by_id(291).unwrap();

    for signal in &message.signals {
        let (min, max) = (signal.minimum.unwrap_or(0.0), signal.maximum.unwrap_or(100.0));
        for step in 0..=20 {
            let target = min + (max - min) * (step as f64) / 20.0;

            let mut values = HashMap::new();
            values.insert(signal.name.clone(), target);
            let bytes = Codec::encode(&db, 291, &values).unwrap();

            let decoded = Codec::decode(&db, 291, &bytes).unwrap();
            let got = decoded.signals[&signal.name].physical;
            assert!(
                (got - target).abs() <= signal.scale / 2.0 + 1e-9,
                "{}: encoded {} decoded back as {} (scale {})",
                signal.name,
                target,
                got,
                signal.scale
            );
        }
    }
}

#[test]
fn raw_roundtrip_through_loaded_schema() {
    let db = powertrain();
    let message = db.get_message_by_id(291).unwrap();

    for signal in &message.signals {
        let hi: i64 = if signal.value_type == can_signal_codec::ValueType::Signed {
            (1 << (signal.length - 1)) - 1
        } else {
            (1 << signal.length) - 1
        };
        for raw in [0, 1, hi / 3, hi] {
            let mut values = HashMap::new();
            values.insert(signal.name.clone(), raw);
            let bytes = Codec::encode_raw(&db, 291, &values).unwrap();
            let decoded = Codec::decode(&db, 291, &bytes).unwrap();
            assert_eq!(
                decoded.signals[&signal.name].raw, raw,
                "signal {} raw {}",
                signal.name, raw
            );
        }
    }
}

#[test]
fn decode_reports_units_and_labels() {
    let db = powertrain();

    // Gear = 15 -> "Reverse" per the value table.
    let decoded = Codec::decode(&db, 512, &[0x0F, 0x00]).unwrap();
    let gear = &decoded.signals["Gear"];
    assert_eq!(gear.raw, 15);
    assert_eq!(gear.label.as_deref(), Some("Reverse"));

    let decoded = Codec::decode(&db, 291, &[0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    assert_eq!(decoded.signals["EngineSpeed"].unit.as_deref(), Some("rpm"));
    // CoolantTemp raw 0 -> physical -40.
    assert_eq!(decoded.signals["CoolantTemp"].physical, -40.0);
}

#[test]
fn unknown_frame_is_undecoded_not_an_error() {
    let db = powertrain();
    assert!(Codec::decode(&db, 0x7FF, &[0; 8]).is_none());
}

#[test]
fn encode_unknown_signal_yields_no_buffer() {
    let db = powertrain();
    let mut values = HashMap::new();
    values.insert("EngineSpeed".to_string(), 1000.0);
    values.insert("NoSuchSignal".to_string(), 1.0);

    let result = Codec::encode(&db, 291, &values);
    assert_eq!(
        result,
        Err(EncodeError::UnknownSignal("NoSuchSignal".to_string()))
    );
}

#[test]
fn encode_respects_declared_message_length() {
    let db = powertrain();
    let mut values = HashMap::new();
    values.insert("Gear".to_string(), 3.0);

    let bytes = Codec::encode(&db, 512, &values).unwrap();
    assert_eq!(bytes.len(), 2); // GearStatus declares Len=2
    assert_eq!(bytes[0], 0x03);
}

#[test]
fn partial_decode_skips_only_the_malformed_signal() {
    // BadSignal extends past the 2-byte frame; Gear still decodes.
    let dbc = r#"
BO_ 512 GearStatus: 2 ECU1
 SG_ Gear : 0|4@1+ (1,0) [0|8] "" ECU2
 SG_ BadSignal : 8|24@1+ (1,0) [0|0] "" ECU2
"#;
    let db = Database::from_dbc(dbc).unwrap();
    let decoded = Codec::decode(&db, 512, &[0x05, 0xAA]).unwrap();

    assert_eq!(decoded.signals["Gear"].raw, 5);
    assert!(!decoded.signals.contains_key("BadSignal"));
    assert_eq!(decoded.warnings.len(), 1);
}

#[test]
fn sym_and_dbc_layouts_decode_identically() {
    let sym = r#"FormatVersion=6.0 // Do not edit this line!
Title="Powertrain"

{SENDRECEIVE}

[EngineData]
ID=123h
Len=8
Var=EngineSpeed unsigned 0,16 /u:rpm /f:0.25 /o:0 /min:0 /max:8000
Var=CoolantTemp unsigned 16,8 /u:C /f:1 /o:-40
"#;
    let from_sym = Database::from_sym(sym).unwrap();
    let from_dbc = powertrain();

    let frame = [0xE0, 0x2E, 0x8C, 0, 0, 0, 0, 0];
    let a = Codec::decode(&from_sym, 0x123, &frame).unwrap();
    let b = Codec::decode(&from_dbc, 0x123, &frame).unwrap();

    for name in ["EngineSpeed", "CoolantTemp"] {
        assert_eq!(a.signals[name].raw, b.signals[name].raw, "{}", name);
        assert_eq!(a.signals[name].physical, b.signals[name].physical, "{}", name);
    }
}

#[test]
fn unsupported_sym_version_is_distinct_from_parse_error() {
    let legacy = "FormatVersion=5.0\n[Msg]\nID=100h\nLen=8\n";
    match Database::from_sym(legacy) {
        Err(LoadError::UnsupportedDialectVersion { found, supported }) => {
            assert_eq!(found, "5.0");
            assert_eq!(supported, "6.0");
        }
        other => panic!("expected UnsupportedDialectVersion, got {:?}", other.err()),
    }

    let garbage = "FormatVersion=6.0\n[Msg]\nID=nonsense\n";
    assert!(matches!(
        Database::from_sym(garbage),
        Err(LoadError::ParseError { .. })
    ));
}

#[test]
fn snapshot_isolated_from_reload() {
    let shared = SharedDatabase::new();
    shared.install(powertrain());

    let before = shared.snapshot().unwrap();

    // Reload with a schema where EngineSpeed has a different scale.
    let changed = POWERTRAIN_DBC.replace("(0.25,0)", "(0.5,0)");
    shared.install(Database::from_dbc(&changed).unwrap());

    let frame = [0x10, 0x00, 0, 0, 0, 0, 0, 0];
    let old = Codec::decode(&before, 291, &frame).unwrap();
    let new = Codec::decode(&shared.snapshot().unwrap(), 291, &frame).unwrap();

    assert_eq!(old.signals["EngineSpeed"].physical, 4.0);
    assert_eq!(new.signals["EngineSpeed"].physical, 8.0);
}
