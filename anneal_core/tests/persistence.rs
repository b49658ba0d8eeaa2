//! Process-file round trips and rejection of malformed files.

use anneal_core::process::AnnealerProcess;
use anneal_core::step::{FastRamp, PidRegulated, Step, StopHeating};
use anneal_core::AnnealError;
use rstest::rstest;
use tempfile::tempdir;

fn recipe() -> Vec<Step> {
    vec![
        Step::FastRamp(FastRamp {
            target_temperature: 250.0,
            regulation_threshold: 0.9,
            kp: 0.05,
            ki: 0.5,
            kd: 0.01,
            duration: 120.0,
            ramp_interval: 0.1,
            pid_interval: 0.1,
        }),
        Step::PidRegulated(PidRegulated {
            target_temperature: 250.0,
            kp: 0.05,
            ki: 0.5,
            kd: 0.0,
            duration: 600.0,
            interval: 0.1,
        }),
        Step::StopHeating(StopHeating {
            low_temperature: 40.0,
            interval: 0.5,
        }),
    ]
}

#[test]
fn save_then_load_round_trips_all_step_kinds() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("anneal.process");

    let mut p = AnnealerProcess::new("ti-6al-4v stress relief");
    for step in recipe() {
        p.add_step(None, step).expect("add step");
    }
    p.save(&path).expect("save");
    assert_eq!(p.path(), Some(path.as_path()));

    let loaded = AnnealerProcess::load(&path).expect("load");
    assert_eq!(loaded.description(), "ti-6al-4v stress relief");
    assert_eq!(loaded.steps(), p.steps());
    assert_eq!(loaded.path(), Some(path.as_path()));
}

#[test]
fn discriminants_match_the_process_file_format() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("anneal.process");

    let mut p = AnnealerProcess::new("format check");
    for step in recipe() {
        p.add_step(None, step).expect("add step");
    }
    p.save(&path).expect("save");

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
    let kinds: Vec<&str> = json["steps"]
        .as_array()
        .expect("steps array")
        .iter()
        .map(|s| s["type"].as_str().expect("type field"))
        .collect();
    assert_eq!(kinds, ["FastRamp", "PIDRegulatedStep", "StopHeatingStep"]);
}

#[test]
fn unknown_step_type_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("anneal.process");
    let json = r#"{
        "description": "from a newer build",
        "steps": [
            {"type": "LaserPulseStep", "pulse_energy": 3.0}
        ]
    }"#;
    std::fs::write(&path, json).expect("write");

    let err = AnnealerProcess::load(&path).err().expect("load should fail");
    match err {
        AnnealError::UnknownStepType(kind) => assert_eq!(kind, "LaserPulseStep"),
        other => panic!("expected UnknownStepType, got {other:?}"),
    }
}

#[test]
fn omitted_intervals_use_the_default() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("anneal.process");
    let json = r#"{
        "description": "old file without intervals",
        "steps": [
            {"type": "PIDRegulatedStep", "target_temperature": 180.0,
             "kp": 0.05, "ki": 0.5, "kd": 0.0, "duration": 60.0},
            {"type": "StopHeatingStep", "low_temperature": 40.0}
        ]
    }"#;
    std::fs::write(&path, json).expect("write");

    let p = AnnealerProcess::load(&path).expect("load");
    match &p.steps()[0] {
        Step::PidRegulated(s) => assert_eq!(s.interval, 0.1),
        other => panic!("unexpected step {other:?}"),
    }
    match &p.steps()[1] {
        Step::StopHeating(s) => assert_eq!(s.interval, 0.1),
        other => panic!("unexpected step {other:?}"),
    }
}

#[rstest]
#[case::unknown_field(
    r#"{"description": "x", "steps": [
        {"type": "StopHeatingStep", "low_temperature": 40.0, "ramp_rate": 2.0}
    ]}"#
)]
#[case::missing_field(r#"{"description": "x", "steps": [{"type": "FastRamp"}]}"#)]
#[case::untyped_step(r#"{"description": "x", "steps": [{"low_temperature": 40.0}]}"#)]
#[case::not_json(r#"description: x"#)]
fn malformed_files_are_rejected(#[case] json: &str) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("anneal.process");
    std::fs::write(&path, json).expect("write");
    assert!(AnnealerProcess::load(&path).is_err());
}

#[test]
fn invalid_tunables_are_rejected_on_load() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("anneal.process");
    let json = r#"{
        "description": "zero interval",
        "steps": [
            {"type": "StopHeatingStep", "low_temperature": 40.0, "interval": 0.0}
        ]
    }"#;
    std::fs::write(&path, json).expect("write");
    assert!(matches!(
        AnnealerProcess::load(&path),
        Err(AnnealError::Config(_))
    ));
}
