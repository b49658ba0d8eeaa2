//! Pre-sized time/value recording buffers for one telemetry channel.
//!
//! Written only by the supervisor's polling worker; the control loop never
//! touches these directly. Stepped channels store each logical sample as a
//! held-value point plus the new point so consumers get a staircase trace
//! without interpolating.

use crate::error::AnnealError;

/// How values recorded on a channel behave between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Varies in between recorded values; plotted as a line.
    Continuous,
    /// Holds its last value until the next sample; plotted as a staircase.
    Stepped,
}

/// Growable time/value arrays with an explicit write index.
///
/// Invariants:
/// - `write_index <= capacity` and at least 2 slots stay free after every
///   append (the growth check below), so a stepped append and the
///   `get_data` scratch slot can never write out of bounds.
/// - `times[0..write_index]` is non-decreasing.
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    kind: ChannelKind,
    times: Vec<f64>,
    values: Vec<f64>,
    write_index: usize,
}

/// Smallest usable allocation: one stepped append (2 slots) plus the
/// scratch slot plus one free slot for the post-append growth check.
const MIN_CAPACITY: usize = 4;

impl TimeSeriesBuffer {
    pub fn new(kind: ChannelKind, initial_capacity: usize) -> Self {
        let cap = initial_capacity.max(MIN_CAPACITY);
        Self {
            kind,
            times: vec![0.0; cap],
            values: vec![0.0; cap],
            write_index: 0,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Number of stored points (stepped channels count held points too).
    pub fn len(&self) -> usize {
        self.write_index
    }

    pub fn is_empty(&self) -> bool {
        self.write_index == 0
    }

    pub fn capacity(&self) -> usize {
        self.times.len()
    }

    /// Rewind to empty without releasing the allocation. Called at the
    /// start of every run.
    pub fn reset(&mut self) {
        self.write_index = 0;
    }

    /// Record the very first value at time zero.
    ///
    /// Only valid on an empty buffer; misuse is a programming error and is
    /// surfaced immediately rather than retried.
    pub fn add_first_value(&mut self, value: f64) -> Result<(), AnnealError> {
        if self.write_index != 0 {
            return Err(AnnealError::InvalidState(format!(
                "add_first_value requires write_index 0, not {}",
                self.write_index
            )));
        }
        self.times[0] = 0.0;
        self.values[0] = value;
        self.write_index = 1;
        Ok(())
    }

    /// Append a sample in a way consistent with the channel kind.
    ///
    /// Stepped channels write a held point carrying the previous value at
    /// the new timestamp, then the new pair; the very first stepped sample
    /// has no previous value and occupies a single slot.
    pub fn append_value(&mut self, time: f64, value: f64) {
        let i = self.write_index;
        match self.kind {
            ChannelKind::Continuous => {
                self.times[i] = time;
                self.values[i] = value;
                self.write_index += 1;
            }
            ChannelKind::Stepped if i == 0 => {
                self.times[0] = time;
                self.values[0] = value;
                self.write_index = 1;
            }
            ChannelKind::Stepped => {
                self.times[i] = time;
                self.values[i] = self.values[i - 1];
                self.times[i + 1] = time;
                self.values[i + 1] = value;
                self.write_index += 2;
            }
        }
        self.grow_if_needed();
    }

    /// 1.5x copy-forward reallocation once fewer than 2 free slots remain;
    /// amortizes to O(1) per append and never shrinks.
    fn grow_if_needed(&mut self) {
        if self.capacity() - self.write_index < 2 {
            let new_cap = (self.capacity() as f64 * 1.5) as usize;
            self.times.resize(new_cap, 0.0);
            self.values.resize(new_cap, 0.0);
        }
    }

    /// Retrieve the recorded prefix.
    ///
    /// For a stepped channel with `extrapolate_to` given, one synthetic
    /// trailing point holding the last value at that time (clamped to the
    /// last stored timestamp, keeping the trace non-decreasing) is written
    /// into the scratch slot past `write_index` (free by the growth
    /// invariant) so the trace extends to the current time without waiting
    /// for the next real sample. The stored prefix itself is never altered.
    pub fn get_data(&mut self, extrapolate_to: Option<f64>) -> (&[f64], &[f64]) {
        let i = self.write_index;
        match (self.kind, extrapolate_to) {
            (ChannelKind::Stepped, Some(t)) if i > 0 => {
                // A stale `t` must not break time monotonicity; hold the
                // synthetic point at the last stored timestamp instead.
                self.times[i] = t.max(self.times[i - 1]);
                self.values[i] = self.values[i - 1];
                (&self.times[..i + 1], &self.values[..i + 1])
            }
            _ => (&self.times[..i], &self.values[..i]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_appends_one_slot_each() {
        let mut buf = TimeSeriesBuffer::new(ChannelKind::Continuous, 8);
        for (i, t) in [0.0, 0.5, 1.0].iter().enumerate() {
            buf.append_value(*t, i as f64);
        }
        let (times, values) = buf.get_data(None);
        assert_eq!(times, &[0.0, 0.5, 1.0]);
        assert_eq!(values, &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn stepped_first_sample_takes_single_slot() {
        let mut buf = TimeSeriesBuffer::new(ChannelKind::Stepped, 8);
        buf.append_value(0.0, 1.0);
        assert_eq!(buf.len(), 1);

        // Every later sample takes two slots: held point then new point.
        buf.append_value(2.0, 3.0);
        assert_eq!(buf.len(), 3);
        let (times, values) = buf.get_data(None);
        assert_eq!(times, &[0.0, 2.0, 2.0]);
        assert_eq!(values, &[1.0, 1.0, 3.0]);
    }

    #[test]
    fn add_first_value_rejects_non_empty_buffer() {
        let mut buf = TimeSeriesBuffer::new(ChannelKind::Continuous, 8);
        buf.add_first_value(5.0).expect("first add");
        let err = buf.add_first_value(6.0).expect_err("second add must fail");
        assert!(matches!(err, AnnealError::InvalidState(_)));
        // reset() makes it legal again
        buf.reset();
        buf.add_first_value(7.0).expect("add after reset");
        assert_eq!(buf.get_data(None).1, &[7.0]);
    }

    #[test]
    fn growth_preserves_prior_data() {
        let mut buf = TimeSeriesBuffer::new(ChannelKind::Continuous, 4);
        for i in 0..100 {
            buf.append_value(i as f64, (i * 2) as f64);
        }
        assert!(buf.capacity() >= 102);
        let (times, values) = buf.get_data(None);
        assert_eq!(times.len(), 100);
        for i in 0..100 {
            assert_eq!(times[i], i as f64);
            assert_eq!(values[i], (i * 2) as f64);
        }
    }

    #[test]
    fn stepped_extrapolation_holds_last_value() {
        let mut buf = TimeSeriesBuffer::new(ChannelKind::Stepped, 8);
        buf.append_value(0.0, 1.0);
        buf.append_value(1.0, 2.0);
        let (times, values) = buf.get_data(Some(5.0));
        assert_eq!(times.last(), Some(&5.0));
        assert_eq!(values.last(), Some(&2.0));
        // The synthetic point is transient: the stored prefix is untouched.
        assert_eq!(buf.len(), 3);
        let (times, _) = buf.get_data(None);
        assert_eq!(times.last(), Some(&1.0));
    }

    #[test]
    fn stale_extrapolation_time_keeps_times_monotonic() {
        let mut buf = TimeSeriesBuffer::new(ChannelKind::Stepped, 8);
        buf.append_value(0.0, 1.0);
        buf.append_value(4.0, 2.0);
        // Request a horizon behind the last stored sample.
        let (times, values) = buf.get_data(Some(1.0));
        assert_eq!(times.last(), Some(&4.0));
        assert_eq!(values.last(), Some(&2.0));
        for w in times.windows(2) {
            assert!(w[0] <= w[1], "{times:?}");
        }
    }

    #[test]
    fn continuous_ignores_extrapolation_time() {
        let mut buf = TimeSeriesBuffer::new(ChannelKind::Continuous, 8);
        buf.append_value(0.0, 1.0);
        let (times, values) = buf.get_data(Some(9.0));
        assert_eq!(times, &[0.0]);
        assert_eq!(values, &[1.0]);
    }
}
