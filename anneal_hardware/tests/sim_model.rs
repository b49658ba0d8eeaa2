use std::sync::Arc;
use std::time::Duration;

use anneal_hardware::{SimulatedDaq, ThermalModel};
use anneal_traits::Daq;
use anneal_traits::clock::TestClock;
use rstest::rstest;

fn daq_with(model: ThermalModel) -> (SimulatedDaq, TestClock) {
    let clock = TestClock::new();
    let daq = SimulatedDaq::new(
        model,
        anneal_config::Conversion::Polynomial {
            coeffs: vec![0.0, 25000.0],
        },
        Arc::new(clock.clone()),
    );
    (daq, clock)
}

#[rstest]
fn fails_fast_before_initialize() {
    let (mut daq, _clock) = daq_with(ThermalModel::default());
    let err = daq.read_temperature().expect_err("must refuse reads");
    assert!(format!("{err}").contains("initialize"));
    let err = daq.write_current_target(0.5).expect_err("must refuse writes");
    assert!(format!("{err}").contains("initialize"));
}

#[rstest]
fn idle_plant_stays_at_ambient() {
    let (mut daq, clock) = daq_with(ThermalModel {
        ambient: 20.0,
        span: 300.0,
        tau: 0.2,
    });
    daq.initialize().expect("init");
    clock.advance(Duration::from_secs(10));
    let t = daq.read_temperature().expect("read");
    assert!((t - 20.0).abs() < 1e-6, "temperature {t}");
}

#[rstest]
fn full_power_approaches_equilibrium() {
    let (mut daq, clock) = daq_with(ThermalModel {
        ambient: 20.0,
        span: 300.0,
        tau: 0.2,
    });
    daq.initialize().expect("init");
    daq.write_current_target(1.0).expect("write");

    // After one time constant the plant covers ~63% of the gap.
    clock.advance(Duration::from_millis(200));
    let t1 = daq.read_temperature().expect("read");
    assert!((t1 - 209.6).abs() < 2.0, "after one tau: {t1}");

    // Many time constants later it sits at ambient + span.
    clock.advance(Duration::from_secs(10));
    let t2 = daq.read_temperature().expect("read");
    assert!((t2 - 320.0).abs() < 0.5, "equilibrium: {t2}");
}

#[rstest]
fn monitors_echo_the_commanded_targets() {
    let (mut daq, _clock) = daq_with(ThermalModel::default());
    daq.initialize().expect("init");
    daq.write_current_target(0.25).expect("write current");
    daq.write_voltage_target(0.75).expect("write voltage");
    assert_eq!(daq.read_heater_current().expect("current"), 0.25);
    assert_eq!(daq.read_heater_voltage().expect("voltage"), 0.75);
}
