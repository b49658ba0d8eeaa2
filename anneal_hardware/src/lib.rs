//! DAQ backends for the annealer engine.
//!
//! The only backend shipped here is `SimulatedDaq`, a first-order thermal
//! model driven through the shared `Clock` so control-loop tests run
//! deterministically. A physical backend would bind the channel ids from
//! `anneal_config::DaqConfig` to a driver and implement the same trait.
pub mod error;

use std::sync::Arc;
use std::time::Instant;

use anneal_config::Conversion;
use anneal_traits::{Clock, Daq};
use error::HwError;

/// Thermocouple emf slope used by the simulation, in volts per Celsius.
/// The matching conversion is `Polynomial { coeffs: [0.0, 1.0 / SIM_EMF] }`
/// scaled accordingly; the default test config uses 25000 C/V.
pub const SIM_VOLTS_PER_CELSIUS: f64 = 1.0 / 25000.0;

/// Parameters of the first-order plant: the heater drives the temperature
/// toward `ambient + span * power` with time constant `tau` seconds.
#[derive(Debug, Clone, Copy)]
pub struct ThermalModel {
    pub ambient: f64,
    pub span: f64,
    pub tau: f64,
}

impl Default for ThermalModel {
    fn default() -> Self {
        Self {
            ambient: 20.0,
            span: 300.0,
            tau: 0.2,
        }
    }
}

/// Simulated annealer DAQ.
///
/// The heater current target is the power command; the voltage target is
/// recorded and echoed by its monitor but does not feed the model (the
/// simulated supply is ideal). Reads integrate the model over the time
/// elapsed on the injected clock since the previous read.
pub struct SimulatedDaq {
    model: ThermalModel,
    conversion: Conversion,
    clock: Arc<dyn Clock + Send + Sync>,
    temperature: f64,
    current_target: f64,
    voltage_target: f64,
    last_update: Option<Instant>,
    initialized: bool,
}

impl SimulatedDaq {
    pub fn new(
        model: ThermalModel,
        conversion: Conversion,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            temperature: model.ambient,
            model,
            conversion,
            clock,
            current_target: 0.0,
            voltage_target: 0.0,
            last_update: None,
            initialized: false,
        }
    }

    /// Convenience constructor with the default model and a linear
    /// conversion matching `SIM_VOLTS_PER_CELSIUS`.
    pub fn with_defaults(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let conversion = Conversion::Polynomial {
            coeffs: vec![0.0, 1.0 / SIM_VOLTS_PER_CELSIUS],
        };
        Self::new(ThermalModel::default(), conversion, clock)
    }

    fn ensure_initialized(&self) -> error::Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(HwError::NotInitialized)
        }
    }

    /// Integrate the plant up to the clock's current time.
    fn advance(&mut self) {
        let now = self.clock.now();
        if let Some(last) = self.last_update {
            let dt = now.saturating_duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let equilibrium = self.model.ambient + self.model.span * self.current_target;
                let decay = (-dt / self.model.tau).exp();
                self.temperature = equilibrium + (self.temperature - equilibrium) * decay;
            }
        }
        self.last_update = Some(now);
    }

    /// Current plant temperature without touching the trait error plumbing.
    pub fn plant_temperature(&mut self) -> f64 {
        self.advance();
        self.temperature
    }
}

impl Daq for SimulatedDaq {
    fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.initialized = true;
        self.last_update = Some(self.clock.now());
        tracing::debug!("simulated daq initialized");
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.initialized = false;
        tracing::debug!("simulated daq finalized");
        Ok(())
    }

    fn read_temperature(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        self.ensure_initialized()?;
        self.advance();
        // Round-trip through the emf model so the configured conversion is
        // exercised the same way a physical backend would.
        let volts = self.temperature * SIM_VOLTS_PER_CELSIUS;
        Ok(self.conversion.temperature_from_volts(volts))
    }

    fn read_heater_voltage(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        self.ensure_initialized()?;
        Ok(self.voltage_target)
    }

    fn read_heater_current(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        self.ensure_initialized()?;
        Ok(self.current_target)
    }

    fn write_current_target(
        &mut self,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ensure_initialized()?;
        // Integrate at the old power level before switching
        self.advance();
        self.current_target = value;
        tracing::trace!(value, "current target");
        Ok(())
    }

    fn write_voltage_target(
        &mut self,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ensure_initialized()?;
        self.voltage_target = value;
        tracing::trace!(value, "voltage target");
        Ok(())
    }
}
