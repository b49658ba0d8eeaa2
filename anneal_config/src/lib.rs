#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the annealer DAQ binding.
//!
//! - `DaqConfig` is deserialized from TOML and validated.
//! - `Conversion` is the pure thermocouple voltage -> temperature function
//!   handed to the hardware layer: either polynomial coefficients or a
//!   piecewise-linear lookup table, the latter loadable from a
//!   strict-header CSV.
use serde::{Deserialize, Serialize};

/// Conversion table CSV schema.
///
/// Expected headers:
/// volts,celsius
///
/// Example:
/// volts,celsius
/// 0.0,0.0
/// 0.04,1000.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ConversionRow {
    pub volts: f64,
    pub celsius: f64,
}

/// Channel ids used to bind the engine to a physical DAQ.
///
/// For the heater pairs the first id is the monitor (analog input), the
/// second the regulation target (analog output); the user is responsible
/// for the matching jumpers.
#[derive(Debug, Deserialize, Clone)]
pub struct Channels {
    /// Differential analog input wired to the thermocouple amplifier.
    pub temperature: String,
    /// [monitor, target] pair for the heater current regulator.
    pub heater_current: [String; 2],
    /// [monitor, target] pair for the heater voltage regulator.
    pub heater_voltage: [String; 2],
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    /// Console log level: "error","warn","info","debug","trace"
    pub level: Option<String>,
}

/// Thermocouple voltage -> temperature conversion, supplied by the config.
///
/// The engine never interprets raw voltages itself; backends call
/// `temperature_from_volts` once per read.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Conversion {
    /// Polynomial in volts, coefficients in ascending degree order.
    Polynomial { coeffs: Vec<f64> },
    /// Piecewise-linear table of `(volts, celsius)` breakpoints with
    /// strictly increasing volts; clamped outside the table range.
    Table { points: Vec<(f64, f64)> },
}

impl Conversion {
    pub fn temperature_from_volts(&self, volts: f64) -> f64 {
        match self {
            Conversion::Polynomial { coeffs } => {
                coeffs.iter().rev().fold(0.0, |acc, c| acc * volts + c)
            }
            Conversion::Table { points } => {
                match points.iter().position(|(v, _)| *v >= volts) {
                    // Below the first breakpoint
                    Some(0) => points[0].1,
                    Some(i) => {
                        let (v0, c0) = points[i - 1];
                        let (v1, c1) = points[i];
                        c0 + (c1 - c0) * (volts - v0) / (v1 - v0)
                    }
                    // Past the last breakpoint
                    None => points.last().map(|(_, c)| *c).unwrap_or(0.0),
                }
            }
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        match self {
            Conversion::Polynomial { coeffs } => {
                if coeffs.is_empty() {
                    eyre::bail!("conversion.coeffs must not be empty");
                }
                if coeffs.iter().any(|c| !c.is_finite()) {
                    eyre::bail!("conversion.coeffs must all be finite");
                }
            }
            Conversion::Table { points } => {
                if points.len() < 2 {
                    eyre::bail!(
                        "conversion table requires at least two points, got {}",
                        points.len()
                    );
                }
                for (v, c) in points {
                    if !v.is_finite() || !c.is_finite() {
                        eyre::bail!("conversion table entries must be finite");
                    }
                }
                for w in points.windows(2) {
                    if w[1].0 <= w[0].0 {
                        eyre::bail!("conversion table volts must be strictly increasing");
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaqConfig {
    /// Device name as registered with the driver, e.g. "Dev1".
    pub device_id: String,
    pub channels: Channels,
    pub conversion: Conversion,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<DaqConfig, toml::de::Error> {
    toml::from_str::<DaqConfig>(s)
}

impl DaqConfig {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.device_id.trim().is_empty() {
            eyre::bail!("device_id must not be empty");
        }
        for (name, id) in [
            ("channels.temperature", &self.channels.temperature),
            ("channels.heater_current[0]", &self.channels.heater_current[0]),
            ("channels.heater_current[1]", &self.channels.heater_current[1]),
            ("channels.heater_voltage[0]", &self.channels.heater_voltage[0]),
            ("channels.heater_voltage[1]", &self.channels.heater_voltage[1]),
        ] {
            if id.trim().is_empty() {
                eyre::bail!("{name} must not be empty");
            }
        }
        self.conversion.validate()
    }
}

/// Load a `volts,celsius` conversion table with strict headers.
pub fn load_conversion_csv(path: &std::path::Path) -> eyre::Result<Conversion> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open conversion CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["volts", "celsius"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "conversion CSV must have headers 'volts,celsius', got: {}",
            actual.join(",")
        );
    }

    let mut points = Vec::new();
    for (idx, rec) in rdr.deserialize::<ConversionRow>().enumerate() {
        match rec {
            Ok(row) => points.push((row.volts, row.celsius)),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    let conversion = Conversion::Table { points };
    conversion.validate()?;
    Ok(conversion)
}
