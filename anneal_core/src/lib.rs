#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core annealing engine (hardware-agnostic).
//!
//! All hardware interaction goes through `anneal_traits::Daq`; everything
//! here runs identically against a bench instrument or a simulation.
//!
//! ## Architecture
//!
//! - **Regulation**: PID with integral windup clamping (`pid` module)
//! - **Steps**: the recipe phases and their control loops (`step` module)
//! - **Runner**: one thread per run, panic-isolated (`runner` module)
//! - **Telemetry**: sample channel with an end-of-stream sentinel
//!   (`telemetry` module)
//! - **Supervisor**: lifecycle, buffers and persistence (`process` module)
//! - **Series**: preallocated time-series buffers with stepped-trace
//!   rendering (`series` module)

pub mod actuator;
pub mod error;
pub mod hw_error;
pub mod pid;
pub mod process;
pub mod runner;
pub mod series;
pub mod step;
pub mod telemetry;

pub use actuator::ActuatorHandle;
pub use error::{AnnealError, Result};
pub use pid::{DEFAULT_WINDUP_GUARD, Pid};
pub use process::{AnnealerProcess, ChannelBank, ProcessStatus};
pub use runner::{CancelHandle, ControlLoopRunner};
pub use series::{ChannelKind, TimeSeriesBuffer};
pub use step::{FastRamp, PidRegulated, Step, StepOutcome, StopHeating};
pub use telemetry::{
    ChannelId, TelemetryMessage, TelemetryReceiver, TelemetrySender, telemetry_channel,
};
