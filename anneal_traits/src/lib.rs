pub mod clock;

pub use clock::{Clock, MonotonicClock, TestClock};

/// Abstract capability set the engine requires from the annealer DAQ.
///
/// Implementations bind named channels to a physical device (or a
/// simulation). Every operation must fail fast with a clear error when the
/// backend has not been initialized. Readings are in engine units: degrees
/// Celsius for the temperature, normalized `[0, 1]` fractions of full scale
/// for the heater channels.
pub trait Daq {
    fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Temperature seen by the thermocouple, after voltage conversion.
    fn read_temperature(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;

    /// Voltage monitor on the heater supply, as a fraction of full scale.
    fn read_heater_voltage(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;

    /// Current monitor on the heater supply, as a fraction of full scale.
    fn read_heater_current(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;

    /// Command the heater current regulator. `value` must be in `[0, 1]`.
    fn write_current_target(
        &mut self,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Command the heater voltage regulator. `value` must be in `[0, 1]`.
    fn write_voltage_target(
        &mut self,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
