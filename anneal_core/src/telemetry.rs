//! Telemetry transport between the control loop and the supervisor.
//!
//! An unbounded many-writers-to-one-reader channel carries `(channel,
//! timestamp, value)` samples plus an end-of-stream sentinel. The sentinel
//! is pushed exactly once, by the runner's cleanup path; encoding it as an
//! enum variant means no partially-null sample can ever exist.

use crossbeam_channel as xch;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::series::ChannelKind;

/// Closed set of channels the engine emits. Each id maps 1:1 to a
/// [`TimeSeriesBuffer`](crate::series::TimeSeriesBuffer) owned by the
/// supervising side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    Temperature,
    MeasuredHeaterVoltage,
    MeasuredHeaterCurrent,
    HeaterVoltageTarget,
    HeaterCurrentTarget,
}

impl ChannelId {
    pub const ALL: [ChannelId; 5] = [
        ChannelId::Temperature,
        ChannelId::MeasuredHeaterVoltage,
        ChannelId::MeasuredHeaterCurrent,
        ChannelId::HeaterVoltageTarget,
        ChannelId::HeaterCurrentTarget,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelId::Temperature => "temperature",
            ChannelId::MeasuredHeaterVoltage => "measured_heater_voltage",
            ChannelId::MeasuredHeaterCurrent => "measured_heater_current",
            ChannelId::HeaterVoltageTarget => "heater_voltage_target",
            ChannelId::HeaterCurrentTarget => "heater_current_target",
        }
    }

    /// Measured channels vary between samples; commanded targets hold
    /// their value and render as staircases.
    pub fn kind(self) -> ChannelKind {
        match self {
            ChannelId::Temperature
            | ChannelId::MeasuredHeaterVoltage
            | ChannelId::MeasuredHeaterCurrent => ChannelKind::Continuous,
            ChannelId::HeaterVoltageTarget | ChannelId::HeaterCurrentTarget => ChannelKind::Stepped,
        }
    }

    /// Initial buffer allocation; measured channels sample much faster
    /// than targets change.
    pub fn default_capacity(self) -> usize {
        match self.kind() {
            ChannelKind::Continuous => 36_000,
            ChannelKind::Stepped => 10_000,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message on the telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryMessage {
    /// A reading or a commanded-target change, timestamped in seconds
    /// since the run started.
    Sample {
        channel: ChannelId,
        time: f64,
        value: f64,
    },
    /// Sentinel: nothing further will be sent.
    EndOfStream,
}

pub type TelemetrySender = xch::Sender<TelemetryMessage>;
pub type TelemetryReceiver = xch::Receiver<TelemetryMessage>;

pub fn telemetry_channel() -> (TelemetrySender, TelemetryReceiver) {
    xch::unbounded()
}
