//! Handle through which steps drive the hardware.
//!
//! Owns the DAQ backend for the lifetime of a run. Every read and every
//! target write posts one telemetry sample before returning, so the
//! supervisor's buffers track hardware state without the control loop ever
//! touching them. Trait-boundary errors are mapped to typed
//! [`AnnealError`](crate::error::AnnealError)s here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anneal_traits::{Clock, Daq};
use eyre::WrapErr;

use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::telemetry::{ChannelId, TelemetryMessage, TelemetrySender};

pub struct ActuatorHandle<D: Daq> {
    daq: D,
    tx: TelemetrySender,
    cancel: Arc<AtomicBool>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl<D: Daq> ActuatorHandle<D> {
    /// Wrap an initialized backend. The epoch for telemetry timestamps is
    /// taken now.
    pub fn new(
        daq: D,
        tx: TelemetrySender,
        cancel: Arc<AtomicBool>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let epoch = clock.now();
        Self {
            daq,
            tx,
            cancel,
            clock,
            epoch,
        }
    }

    /// Seconds since the run started.
    pub fn elapsed(&self) -> f64 {
        self.clock.secs_since(self.epoch)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn sleep(&self, d: Duration) {
        self.clock.sleep(d);
    }

    fn emit(&self, channel: ChannelId, value: f64) {
        // A send failure means the supervisor is gone; hardware control
        // continues regardless.
        let msg = TelemetryMessage::Sample {
            channel,
            time: self.elapsed(),
            value,
        };
        if self.tx.send(msg).is_err() {
            tracing::debug!(%channel, "telemetry consumer disconnected");
        }
    }

    pub fn read_temperature(&mut self) -> Result<f64> {
        let value = self
            .daq
            .read_temperature()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading temperature")?;
        self.emit(ChannelId::Temperature, value);
        Ok(value)
    }

    pub fn read_heater_voltage(&mut self) -> Result<f64> {
        let value = self
            .daq
            .read_heater_voltage()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading heater voltage")?;
        self.emit(ChannelId::MeasuredHeaterVoltage, value);
        Ok(value)
    }

    pub fn read_heater_current(&mut self) -> Result<f64> {
        let value = self
            .daq
            .read_heater_current()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading heater current")?;
        self.emit(ChannelId::MeasuredHeaterCurrent, value);
        Ok(value)
    }

    /// Command the heater current regulator. Callers clamp to `[0, 1]`.
    pub fn set_current_target(&mut self, value: f64) -> Result<()> {
        self.daq
            .write_current_target(value)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("writing current target")?;
        self.emit(ChannelId::HeaterCurrentTarget, value);
        Ok(())
    }

    /// Command the heater voltage regulator. Callers clamp to `[0, 1]`.
    pub fn set_voltage_target(&mut self, value: f64) -> Result<()> {
        self.daq
            .write_voltage_target(value)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("writing voltage target")?;
        self.emit(ChannelId::HeaterVoltageTarget, value);
        Ok(())
    }
}

impl<D: Daq> Drop for ActuatorHandle<D> {
    fn drop(&mut self) {
        // Release the hardware on every exit path, including unwinding.
        if let Err(e) = self.daq.finalize() {
            tracing::warn!(error = %e, "daq finalize failed");
        }
    }
}
