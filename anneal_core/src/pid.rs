//! PID regulation used by the closed-loop portion of a step.

/// Default clamp on the integral term. Prevents runaway accumulation when
/// the target changes abruptly or the heater saturates.
pub const DEFAULT_WINDUP_GUARD: f64 = 20.0;

/// Stateful proportional-integral-derivative regulator.
///
/// Constructed fresh for each step invocation that needs regulation;
/// internal state is only cleared by an explicit [`Pid::reset`].
#[derive(Debug, Clone)]
pub struct Pid {
    pub target: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub windup_guard: f64,
    last_time: Option<f64>,
    last_error: f64,
    error_integral: f64,
}

impl Pid {
    pub fn new(target: f64, kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            target,
            kp,
            ki,
            kd,
            windup_guard: DEFAULT_WINDUP_GUARD,
            last_time: None,
            last_error: 0.0,
            error_integral: 0.0,
        }
    }

    pub fn with_windup_guard(mut self, guard: f64) -> Self {
        self.windup_guard = guard;
        self
    }

    /// Compute the new output from a measurement taken at `time` seconds.
    ///
    /// On the first ever call only the proportional term is returned: the
    /// integral and derivative are undefined without a previous sample, and
    /// returning them would inject a spurious spike (or divide by zero).
    /// A repeated timestamp (`dt == 0`) skips the derivative term.
    pub fn compute_output(&mut self, time: f64, measured_value: f64) -> f64 {
        let error = self.target - measured_value;

        let Some(last_time) = self.last_time else {
            self.last_time = Some(time);
            self.last_error = error;
            return self.kp * error;
        };

        let dt = time - last_time;
        let delta_error = error - self.last_error;

        self.error_integral =
            (self.error_integral + error * dt).clamp(-self.windup_guard, self.windup_guard);

        let d_term = if dt > 0.0 { delta_error / dt } else { 0.0 };

        self.last_time = Some(time);
        self.last_error = error;

        self.kp * error + self.ki * self.error_integral + self.kd * d_term
    }

    /// Clear the accumulated history; the next call behaves like the first.
    pub fn reset(&mut self) {
        self.error_integral = 0.0;
        self.last_time = None;
    }

    pub fn error_integral(&self) -> f64 {
        self.error_integral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_returns_proportional_term_only() {
        let mut pid = Pid::new(100.0, 0.5, 100.0, 100.0);
        // Huge I and D gains must not leak into the first output.
        let out = pid.compute_output(3.0, 40.0);
        assert!((out - 0.5 * 60.0).abs() < 1e-12);
    }

    #[test]
    fn integral_is_clamped_to_windup_guard() {
        let mut pid = Pid::new(1000.0, 0.0, 1.0, 0.0);
        pid.compute_output(0.0, 0.0);
        // Adversarial: enormous error over a long dt.
        for i in 1..10 {
            pid.compute_output(i as f64 * 100.0, 0.0);
            assert!(pid.error_integral().abs() <= DEFAULT_WINDUP_GUARD);
        }
        let out = pid.compute_output(1e6, 0.0);
        assert!((out - DEFAULT_WINDUP_GUARD).abs() < 1e-12);

        // Symmetric clamp on the negative side.
        let mut pid = Pid::new(-1000.0, 0.0, 1.0, 0.0);
        pid.compute_output(0.0, 0.0);
        pid.compute_output(1e6, 0.0);
        assert!((pid.error_integral() + DEFAULT_WINDUP_GUARD).abs() < 1e-12);
    }

    #[test]
    fn repeated_timestamp_skips_derivative() {
        let mut pid = Pid::new(10.0, 0.0, 0.0, 5.0);
        pid.compute_output(1.0, 0.0);
        // Same timestamp, different value: derivative would divide by zero.
        let out = pid.compute_output(1.0, 4.0);
        assert_eq!(out, 0.0);
    }

    #[test]
    fn derivative_tracks_error_slope() {
        let mut pid = Pid::new(0.0, 0.0, 0.0, 2.0);
        pid.compute_output(0.0, 0.0);
        // error goes 0 -> -4 over 2 s => slope -2, kd 2 => -4
        let out = pid.compute_output(2.0, 4.0);
        assert!((out + 4.0).abs() < 1e-12);
    }

    #[test]
    fn reset_restores_first_call_behavior() {
        let mut pid = Pid::new(50.0, 1.0, 1.0, 1.0);
        pid.compute_output(0.0, 0.0);
        pid.compute_output(1.0, 10.0);
        assert!(pid.error_integral() != 0.0);
        pid.reset();
        assert_eq!(pid.error_integral(), 0.0);
        let out = pid.compute_output(2.0, 20.0);
        assert!((out - 30.0).abs() < 1e-12);
    }
}
