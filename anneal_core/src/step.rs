//! Phases of an annealing recipe.
//!
//! A closed set of variants, each carrying only its own tunables so a step
//! never refers back to the supervisor or buffers and stays replayable in
//! isolation. Persistence discriminants match the historical process-file
//! format: `FastRamp`, `PIDRegulatedStep`, `StopHeatingStep`.

use std::time::Duration;

use anneal_traits::Daq;
use serde::{Deserialize, Serialize};

use crate::actuator::ActuatorHandle;
use crate::error::{AnnealError, Result};
use crate::pid::Pid;

fn default_interval() -> f64 {
    0.1
}

/// How a step's `run` returned control to the caller. Cancellation is a
/// normal exit path, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Cancelled,
}

/// Fast ramp on maximum output power, handing over to PID regulation once
/// the temperature crosses a fraction of the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FastRamp {
    /// Target temperature in Celsius.
    pub target_temperature: f64,
    /// Fraction of the target at which the open-loop ramp ends and PID
    /// regulation takes over, e.g. 0.9.
    pub regulation_threshold: f64,
    /// P parameter of the PID in Celsius^-1.
    pub kp: f64,
    /// I parameter of the PID in Celsius^-1 s^-1.
    pub ki: f64,
    /// D parameter of the PID in s Celsius^-1.
    pub kd: f64,
    /// Duration of the regulation phase in s.
    pub duration: f64,
    /// Temperature polling interval during the ramp in s.
    #[serde(default = "default_interval")]
    pub ramp_interval: f64,
    /// PID update interval during regulation in s.
    #[serde(default = "default_interval")]
    pub pid_interval: f64,
}

/// Constant temperature step handled by a PID regulator, assuming the
/// process already sits near the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PidRegulated {
    /// Target temperature in Celsius.
    pub target_temperature: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Total duration of the step in s, including any initial settling.
    pub duration: f64,
    /// Time interval at which to update the PID answer in s.
    #[serde(default = "default_interval")]
    pub interval: f64,
}

/// Complete stop of the heating system, polling until cool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopHeating {
    /// Temperature in Celsius below which the cool-down is considered done.
    pub low_temperature: f64,
    /// Temperature polling interval in s.
    #[serde(default = "default_interval")]
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    FastRamp(FastRamp),
    PidRegulated(PidRegulated),
    StopHeating(StopHeating),
}

impl Step {
    /// Persistence discriminant for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::FastRamp(_) => "FastRamp",
            Step::PidRegulated(_) => "PIDRegulatedStep",
            Step::StopHeating(_) => "StopHeatingStep",
        }
    }

    /// Sanity-check the tunables; called when loading a process file.
    pub fn validate(&self) -> Result<(), AnnealError> {
        fn finite(name: &str, v: f64) -> Result<(), AnnealError> {
            if v.is_finite() {
                Ok(())
            } else {
                Err(AnnealError::Config(format!("{name} must be finite")))
            }
        }
        fn positive(name: &str, v: f64) -> Result<(), AnnealError> {
            finite(name, v)?;
            if v > 0.0 {
                Ok(())
            } else {
                Err(AnnealError::Config(format!("{name} must be > 0")))
            }
        }

        match self {
            Step::FastRamp(s) => {
                finite("target_temperature", s.target_temperature)?;
                finite("kp", s.kp)?;
                finite("ki", s.ki)?;
                finite("kd", s.kd)?;
                if !(s.regulation_threshold > 0.0 && s.regulation_threshold <= 1.0) {
                    return Err(AnnealError::Config(
                        "regulation_threshold must be in (0, 1]".into(),
                    ));
                }
                finite("duration", s.duration)?;
                if s.duration < 0.0 {
                    return Err(AnnealError::Config("duration must be >= 0".into()));
                }
                positive("ramp_interval", s.ramp_interval)?;
                positive("pid_interval", s.pid_interval)?;
            }
            Step::PidRegulated(s) => {
                finite("target_temperature", s.target_temperature)?;
                finite("kp", s.kp)?;
                finite("ki", s.ki)?;
                finite("kd", s.kd)?;
                finite("duration", s.duration)?;
                if s.duration < 0.0 {
                    return Err(AnnealError::Config("duration must be >= 0".into()));
                }
                positive("interval", s.interval)?;
            }
            Step::StopHeating(s) => {
                finite("low_temperature", s.low_temperature)?;
                positive("interval", s.interval)?;
            }
        }
        Ok(())
    }

    /// Perform the process step against the actuator.
    pub fn run<D: Daq>(&self, actuator: &mut ActuatorHandle<D>) -> Result<StepOutcome> {
        match self {
            Step::FastRamp(s) => s.run(actuator),
            Step::PidRegulated(s) => s.run(actuator),
            Step::StopHeating(s) => s.run(actuator),
        }
    }
}

impl FastRamp {
    fn run<D: Daq>(&self, actuator: &mut ActuatorHandle<D>) -> Result<StepOutcome> {
        // Open-loop phase: maximum output until the handover threshold.
        actuator.set_voltage_target(1.0)?;
        actuator.set_current_target(1.0)?;
        let handover = self.target_temperature * self.regulation_threshold;

        loop {
            if actuator.is_cancel_requested() {
                return Ok(StepOutcome::Cancelled);
            }
            let temp = actuator.read_temperature()?;
            if temp >= handover {
                tracing::debug!(temp, handover, "ramp handover to regulation");
                break;
            }
            actuator.sleep(Duration::from_secs_f64(self.ramp_interval));
        }

        regulate(
            actuator,
            self.target_temperature,
            (self.kp, self.ki, self.kd),
            self.duration,
            self.pid_interval,
        )
    }
}

impl PidRegulated {
    fn run<D: Daq>(&self, actuator: &mut ActuatorHandle<D>) -> Result<StepOutcome> {
        regulate(
            actuator,
            self.target_temperature,
            (self.kp, self.ki, self.kd),
            self.duration,
            self.interval,
        )
    }
}

impl StopHeating {
    fn run<D: Daq>(&self, actuator: &mut ActuatorHandle<D>) -> Result<StepOutcome> {
        actuator.set_current_target(0.0)?;
        actuator.set_voltage_target(0.0)?;

        loop {
            if actuator.is_cancel_requested() {
                return Ok(StepOutcome::Cancelled);
            }
            // Keep the auxiliary traces gap-free during cool-down.
            actuator.read_heater_voltage()?;
            actuator.read_heater_current()?;
            let temp = actuator.read_temperature()?;
            if temp <= self.low_temperature {
                tracing::debug!(temp, "cool-down complete");
                return Ok(StepOutcome::Completed);
            }
            actuator.sleep(Duration::from_secs_f64(self.interval));
        }
    }
}

/// Closed-loop regulation phase shared by the ramping and constant steps.
///
/// A fresh PID is constructed per invocation. The loop never sleeps past
/// its own deadline: each iteration sleeps `min(interval, remaining)`, and
/// a non-positive remainder ends the loop before any further actuator
/// write.
fn regulate<D: Daq>(
    actuator: &mut ActuatorHandle<D>,
    target: f64,
    (kp, ki, kd): (f64, f64, f64),
    duration: f64,
    interval: f64,
) -> Result<StepOutcome> {
    let mut pid = Pid::new(target, kp, ki, kd);
    let deadline = actuator.elapsed() + duration;

    loop {
        if actuator.is_cancel_requested() {
            return Ok(StepOutcome::Cancelled);
        }
        let now = actuator.elapsed();
        let remaining = deadline - now;
        if remaining <= 0.0 {
            return Ok(StepOutcome::Completed);
        }

        actuator.read_heater_voltage()?;
        actuator.read_heater_current()?;
        let temp = actuator.read_temperature()?;
        let feedback = pid.compute_output(now, temp).clamp(0.0, 1.0);
        actuator.set_current_target(feedback)?;

        actuator.sleep(Duration::from_secs_f64(interval.min(remaining)));
    }
}
