//! Process supervisor: step list editing, lifecycle, telemetry draining
//! and process-file persistence.
//!
//! The supervisor never touches the hardware. It spawns the control loop,
//! then watches it from two worker threads: a poller that drains telemetry
//! samples into the channel buffers, and a monitor that tracks the loop's
//! lifecycle flags and settles the terminal status once the loop thread
//! exits.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anneal_traits::{Clock, Daq};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AnnealError;
use crate::runner::{CancelHandle, ControlLoopRunner};
use crate::series::TimeSeriesBuffer;
use crate::step::Step;
use crate::telemetry::{ChannelId, TelemetryMessage, TelemetryReceiver};

/// Poll period for the lifecycle monitor and for `wait`.
const MONITOR_POLL: Duration = Duration::from_millis(2);

/// Lifecycle of an annealing run.
///
/// `Started` covers the window between spawning the loop thread and its
/// body actually executing; `Stopping` is entered on a stop request and
/// holds until the loop observes the flag and exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessStatus {
    Inactive = 0,
    Started = 1,
    Running = 2,
    Stopping = 3,
    Completed = 4,
    Stopped = 5,
    Failed = 6,
}

impl ProcessStatus {
    fn from_u8(v: u8) -> ProcessStatus {
        match v {
            1 => ProcessStatus::Started,
            2 => ProcessStatus::Running,
            3 => ProcessStatus::Stopping,
            4 => ProcessStatus::Completed,
            5 => ProcessStatus::Stopped,
            6 => ProcessStatus::Failed,
            _ => ProcessStatus::Inactive,
        }
    }

    /// A run is in flight and the step list must not be edited.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ProcessStatus::Started | ProcessStatus::Running | ProcessStatus::Stopping
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Completed | ProcessStatus::Stopped | ProcessStatus::Failed
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Inactive => "inactive",
            ProcessStatus::Started => "started",
            ProcessStatus::Running => "running",
            ProcessStatus::Stopping => "stopping",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status cell shared between the supervisor and its monitor thread.
#[derive(Clone)]
struct StatusCell(Arc<AtomicU8>);

impl StatusCell {
    fn new(s: ProcessStatus) -> Self {
        Self(Arc::new(AtomicU8::new(s as u8)))
    }

    fn get(&self) -> ProcessStatus {
        ProcessStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, s: ProcessStatus) {
        self.0.store(s as u8, Ordering::Release);
    }

    /// Store `next` only when the current value is `expected`.
    fn transition(&self, expected: ProcessStatus, next: ProcessStatus) -> bool {
        self.0
            .compare_exchange(
                expected as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// One buffer per telemetry channel, shared between the poller thread and
/// any number of readers.
#[derive(Clone)]
pub struct ChannelBank {
    buffers: HashMap<ChannelId, Arc<Mutex<TimeSeriesBuffer>>>,
}

impl Default for ChannelBank {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBank {
    pub fn new() -> Self {
        let buffers = ChannelId::ALL
            .into_iter()
            .map(|id| {
                let buf = TimeSeriesBuffer::new(id.kind(), id.default_capacity());
                (id, Arc::new(Mutex::new(buf)))
            })
            .collect();
        Self { buffers }
    }

    fn lock(&self, channel: ChannelId) -> MutexGuard<'_, TimeSeriesBuffer> {
        // ChannelId::ALL seeds every key, and buffer writes cannot panic
        // mid-update in a way that leaves torn data.
        let slot = &self.buffers[&channel];
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rewind every buffer; allocations are kept.
    pub fn reset_all(&self) {
        for id in ChannelId::ALL {
            self.lock(id).reset();
        }
    }

    pub fn append(&self, channel: ChannelId, time: f64, value: f64) -> Result<(), AnnealError> {
        let mut buf = self.lock(channel);
        if buf.is_empty() {
            buf.add_first_value(value)
        } else {
            buf.append_value(time, value);
            Ok(())
        }
    }

    pub fn len(&self, channel: ChannelId) -> usize {
        self.lock(channel).len()
    }

    pub fn is_empty(&self, channel: ChannelId) -> bool {
        self.lock(channel).is_empty()
    }

    /// Owned copy of a channel's trace. For stepped channels,
    /// `extrapolate_to` appends one synthetic point holding the last value
    /// at that time.
    pub fn data(&self, channel: ChannelId, extrapolate_to: Option<f64>) -> (Vec<f64>, Vec<f64>) {
        let mut buf = self.lock(channel);
        let (t, v) = buf.get_data(extrapolate_to);
        (t.to_vec(), v.to_vec())
    }
}

/// Worker threads of one run.
struct RunHandles {
    cancel: CancelHandle,
    monitor: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

/// On-disk shape of a process file.
#[derive(Serialize, Deserialize)]
struct ProcessFile {
    description: String,
    steps: Vec<Value>,
}

/// An annealing recipe plus the machinery to run it.
pub struct AnnealerProcess {
    description: String,
    path: Option<PathBuf>,
    steps: Vec<Step>,
    status: StatusCell,
    run: Option<RunHandles>,
}

impl AnnealerProcess {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            path: None,
            steps: Vec::new(),
            status: StatusCell::new(ProcessStatus::Inactive),
            run: None,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Path the process was loaded from or last saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn status(&self) -> ProcessStatus {
        self.status.get()
    }

    fn ensure_editable(&self) -> Result<(), AnnealError> {
        let status = self.status.get();
        if status.is_active() {
            return Err(AnnealError::InvalidState(format!(
                "cannot edit steps while process is {status}"
            )));
        }
        Ok(())
    }

    /// Insert a step at `index`, or append when `index` is `None`.
    pub fn add_step(&mut self, index: Option<usize>, step: Step) -> Result<(), AnnealError> {
        self.ensure_editable()?;
        step.validate()?;
        let at = index.unwrap_or(self.steps.len());
        if at > self.steps.len() {
            return Err(AnnealError::InvalidState(format!(
                "step index {at} out of range (len {})",
                self.steps.len()
            )));
        }
        self.steps.insert(at, step);
        Ok(())
    }

    pub fn remove_step(&mut self, index: usize) -> Result<Step, AnnealError> {
        self.ensure_editable()?;
        if index >= self.steps.len() {
            return Err(AnnealError::InvalidState(format!(
                "step index {index} out of range (len {})",
                self.steps.len()
            )));
        }
        Ok(self.steps.remove(index))
    }

    pub fn move_step(&mut self, from: usize, to: usize) -> Result<(), AnnealError> {
        self.ensure_editable()?;
        if from >= self.steps.len() || to >= self.steps.len() {
            return Err(AnnealError::InvalidState(format!(
                "step move {from} -> {to} out of range (len {})",
                self.steps.len()
            )));
        }
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        Ok(())
    }

    /// Start the run: reset the buffers, spawn the control loop and its
    /// two watcher threads.
    pub fn start<D: Daq + Send + 'static>(
        &mut self,
        bank: &ChannelBank,
        daq: D,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<(), AnnealError> {
        let status = self.status.get();
        if status.is_active() {
            return Err(AnnealError::InvalidState(format!(
                "cannot start while process is {status}"
            )));
        }
        if self.steps.is_empty() {
            return Err(AnnealError::InvalidState(
                "process has no steps".to_string(),
            ));
        }
        self.reap_finished_run();

        bank.reset_all();
        self.status.set(ProcessStatus::Started);
        tracing::info!(description = %self.description, steps = self.steps.len(), "process started");

        let runner = ControlLoopRunner::spawn(daq, self.steps.clone(), clock);
        let cancel = runner.cancel_handle();
        let rx = runner.telemetry().clone();

        let poller = std::thread::spawn({
            let bank = bank.clone();
            move || poll_telemetry(rx, bank)
        });
        let monitor = std::thread::spawn({
            let status = self.status.clone();
            move || monitor_run(runner, status)
        });

        self.run = Some(RunHandles {
            cancel,
            monitor: Some(monitor),
            poller: Some(poller),
        });
        Ok(())
    }

    /// Request the run to stop. Both modes are cooperative; `force` only
    /// changes the log level, since the loop thread cannot be killed and
    /// must release the hardware itself.
    pub fn stop(&mut self, force: bool) -> Result<(), AnnealError> {
        let status = self.status.get();
        if !status.is_active() {
            return Err(AnnealError::InvalidState(format!(
                "cannot stop while process is {status}"
            )));
        }
        let Some(run) = self.run.as_ref() else {
            return Err(AnnealError::InvalidState(
                "active status without a run".to_string(),
            ));
        };
        if force {
            tracing::warn!("forced stop requested; waiting on control loop cooperation");
        } else {
            tracing::info!("stop requested");
        }
        self.status.transition(ProcessStatus::Started, ProcessStatus::Stopping);
        self.status.transition(ProcessStatus::Running, ProcessStatus::Stopping);
        run.cancel.request();
        Ok(())
    }

    /// Block until the run reaches a terminal status. Returns `false` when
    /// the timeout expires first. Waiting on an inactive process returns
    /// immediately.
    pub fn wait(&mut self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if !self.status.get().is_active() {
                self.reap_finished_run();
                return true;
            }
            if let Some(d) = deadline
                && Instant::now() >= d
            {
                return false;
            }
            std::thread::sleep(MONITOR_POLL);
        }
    }

    /// Join worker threads of a run that has already settled.
    fn reap_finished_run(&mut self) {
        if let Some(run) = self.run.as_mut() {
            if let Some(h) = run.monitor.take() {
                let _ = h.join();
            }
            if let Some(h) = run.poller.take() {
                let _ = h.join();
            }
        }
        self.run = None;
    }

    /// Write the process file as pretty-printed JSON and remember the
    /// path.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), AnnealError> {
        let path = path.as_ref();
        let file = ProcessFile {
            description: self.description.clone(),
            steps: self
                .steps
                .iter()
                .map(step_to_value)
                .collect::<Result<_, _>>()?,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| AnnealError::Io(format!("serializing process file: {e}")))?;
        fs::write(path, json)
            .map_err(|e| AnnealError::Io(format!("writing {}: {e}", path.display())))?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Load a process file, rejecting unknown step discriminants and
    /// invalid tunables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnnealError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| AnnealError::Io(format!("reading {}: {e}", path.display())))?;
        let file: ProcessFile = serde_json::from_str(&json)
            .map_err(|e| AnnealError::Io(format!("parsing {}: {e}", path.display())))?;
        let steps = file
            .steps
            .iter()
            .map(step_from_value)
            .collect::<Result<Vec<_>, _>>()?;
        for step in &steps {
            step.validate()?;
        }
        Ok(Self {
            description: file.description,
            path: Some(path.to_path_buf()),
            steps,
            status: StatusCell::new(ProcessStatus::Inactive),
            run: None,
        })
    }
}

/// Drain telemetry into the buffers until the sentinel (or a disconnect,
/// should the loop thread die without unwinding).
fn poll_telemetry(rx: TelemetryReceiver, bank: ChannelBank) {
    loop {
        match rx.recv() {
            Ok(TelemetryMessage::Sample {
                channel,
                time,
                value,
            }) => {
                if let Err(e) = bank.append(channel, time, value) {
                    tracing::error!(%channel, error = %e, "dropping telemetry sample");
                }
            }
            Ok(TelemetryMessage::EndOfStream) | Err(_) => break,
        }
    }
    tracing::debug!("telemetry stream ended");
}

/// Track the loop thread's lifecycle and settle the terminal status.
fn monitor_run(mut runner: ControlLoopRunner, status: StatusCell) {
    // The loop body may not have begun executing yet; a very short run can
    // also finish before we ever observe `started`.
    while !runner.has_started() && !runner.is_finished() {
        std::thread::sleep(MONITOR_POLL);
    }
    // Leave `Stopping` alone when a stop raced the startup.
    status.transition(ProcessStatus::Started, ProcessStatus::Running);

    while !runner.is_finished() {
        std::thread::sleep(MONITOR_POLL);
    }
    let panicked = runner.join().is_err();

    let terminal = if panicked || runner.has_crashed() {
        ProcessStatus::Failed
    } else if runner.cancel_requested() {
        ProcessStatus::Stopped
    } else {
        ProcessStatus::Completed
    };
    tracing::info!(status = %terminal, "process finished");
    status.set(terminal);
}

/// Serialize one step with its `type` discriminant injected.
fn step_to_value(step: &Step) -> Result<Value, AnnealError> {
    let mut value = match step {
        Step::FastRamp(s) => serde_json::to_value(s),
        Step::PidRegulated(s) => serde_json::to_value(s),
        Step::StopHeating(s) => serde_json::to_value(s),
    }
    .map_err(|e| AnnealError::Io(format!("serializing step: {e}")))?;
    match value.as_object_mut() {
        Some(obj) => {
            obj.insert("type".to_string(), Value::String(step.kind().to_string()));
            Ok(value)
        }
        None => Err(AnnealError::Io("step did not serialize to an object".to_string())),
    }
}

/// Deserialize one step, dispatching on the `type` discriminant.
fn step_from_value(value: &Value) -> Result<Step, AnnealError> {
    let Some(obj) = value.as_object() else {
        return Err(AnnealError::Io("step entry is not an object".to_string()));
    };
    let Some(kind) = obj.get("type").and_then(Value::as_str) else {
        return Err(AnnealError::Io("step entry has no \"type\" field".to_string()));
    };
    let mut fields = obj.clone();
    fields.remove("type");
    let fields = Value::Object(fields);
    let parse_err = |e: serde_json::Error| AnnealError::Io(format!("parsing {kind} step: {e}"));
    match kind {
        "FastRamp" => Ok(Step::FastRamp(
            serde_json::from_value(fields).map_err(parse_err)?,
        )),
        "PIDRegulatedStep" => Ok(Step::PidRegulated(
            serde_json::from_value(fields).map_err(parse_err)?,
        )),
        "StopHeatingStep" => Ok(Step::StopHeating(
            serde_json::from_value(fields).map_err(parse_err)?,
        )),
        other => Err(AnnealError::UnknownStepType(other.to_string())),
    }
}
