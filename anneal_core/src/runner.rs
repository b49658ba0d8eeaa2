//! Isolated execution of a step sequence on its own thread.
//!
//! The control loop owns the DAQ for the lifetime of the run and talks to
//! the rest of the system only through the telemetry channel and three
//! atomic flags. A panic or error inside a step never propagates into the
//! supervisor: the thread body is wrapped in `catch_unwind`, the hardware
//! is finalized by the actuator's `Drop`, and the end-of-stream sentinel is
//! pushed by a drop guard on every exit path.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use anneal_traits::{Clock, Daq};
use eyre::WrapErr;

use crate::actuator::ActuatorHandle;
use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::step::{Step, StepOutcome};
use crate::telemetry::{
    TelemetryMessage, TelemetryReceiver, TelemetrySender, telemetry_channel,
};

/// Pushes the end-of-stream sentinel when dropped. Lives outside the
/// `catch_unwind` so the sentinel goes out after the actuator has released
/// the hardware, whether the loop completed, erred or panicked.
struct SentinelGuard {
    tx: TelemetrySender,
}

impl Drop for SentinelGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(TelemetryMessage::EndOfStream);
    }
}

/// Clonable handle to the loop's cancellation flag, detached from the
/// runner so a supervisor can keep it after handing the runner off to a
/// monitoring thread.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Handle to a running (or finished) control loop.
pub struct ControlLoopRunner {
    rx: TelemetryReceiver,
    cancel: Arc<AtomicBool>,
    crashed: Arc<AtomicBool>,
    started: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ControlLoopRunner {
    /// Spawn the control loop thread and hand back its handle.
    ///
    /// The DAQ is moved into the thread uninitialized; `initialize` runs as
    /// the loop's first action so a backend fault surfaces as a crashed
    /// run, not a supervisor error.
    pub fn spawn<D: Daq + Send + 'static>(
        daq: D,
        steps: Vec<Step>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let (tx, rx) = telemetry_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let crashed = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));

        let thread_cancel = Arc::clone(&cancel);
        let thread_crashed = Arc::clone(&crashed);
        let thread_started = Arc::clone(&started);

        let join = std::thread::spawn(move || {
            thread_started.store(true, Ordering::Release);
            let _sentinel = SentinelGuard { tx: tx.clone() };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                run_steps(daq, &steps, tx, thread_cancel, clock)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    thread_crashed.store(true, Ordering::Release);
                    tracing::error!(error = ?e, "control loop failed");
                }
                Err(payload) => {
                    thread_crashed.store(true, Ordering::Release);
                    tracing::error!("control loop panicked");
                    panic::resume_unwind(payload);
                }
            }
        });

        Self {
            rx,
            cancel,
            crashed,
            started,
            join: Some(join),
        }
    }

    /// Receiver side of the telemetry channel. Cloneable; the stream ends
    /// with exactly one [`TelemetryMessage::EndOfStream`].
    pub fn telemetry(&self) -> &TelemetryReceiver {
        &self.rx
    }

    /// Ask the loop to stop at its next cancellation point.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// True once the thread body has begun executing.
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// True when the loop exited with an error or a panic.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Block until the thread exits. Returns `Err` when the loop panicked.
    pub fn join(&mut self) -> std::thread::Result<()> {
        match self.join.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

fn run_steps<D: Daq>(
    mut daq: D,
    steps: &[Step],
    tx: TelemetrySender,
    cancel: Arc<AtomicBool>,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<()> {
    daq.initialize()
        .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
        .wrap_err("initializing daq")?;
    let mut actuator = ActuatorHandle::new(daq, tx, cancel, clock);

    // Seed every channel with one sample at t=0 so the stepped traces have
    // an anchor point; targets start at the measured output state.
    actuator.read_temperature()?;
    let voltage = actuator.read_heater_voltage()?;
    let current = actuator.read_heater_current()?;
    actuator.set_voltage_target(voltage.clamp(0.0, 1.0))?;
    actuator.set_current_target(current.clamp(0.0, 1.0))?;

    for step in steps {
        if actuator.is_cancel_requested() {
            break;
        }
        tracing::info!(step = step.kind(), "starting step");
        if step.run(&mut actuator)? == StepOutcome::Cancelled {
            tracing::info!(step = step.kind(), "step cancelled");
            break;
        }
    }
    Ok(())
}
