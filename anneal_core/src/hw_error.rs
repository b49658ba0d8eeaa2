//! Maps `Box<dyn Error>` from the `Daq` trait boundary to typed `AnnealError`.
//!
//! The trait in `anneal_traits` uses `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed error enum,
//! with an optional feature-gated path for `anneal_hardware::HwError`
//! downcasting.

use crate::error::AnnealError;

/// Map a trait-boundary error to a typed `AnnealError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> AnnealError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<anneal_hardware::error::HwError>() {
            return match hw {
                anneal_hardware::error::HwError::NotInitialized => AnnealError::HardwareNotReady,
                other => AnnealError::ActuatorFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("initialize") {
        AnnealError::HardwareNotReady
    } else {
        AnnealError::ActuatorFault(s)
    }
}

#[cfg(test)]
mod tests {
    use super::map_hw_error;
    use crate::error::AnnealError;

    #[test]
    fn maps_not_initialized_to_hardware_not_ready() {
        let e = anneal_hardware::error::HwError::NotInitialized;
        assert!(matches!(map_hw_error(&e), AnnealError::HardwareNotReady));
    }

    #[test]
    fn maps_unknown_errors_to_actuator_fault() {
        let e = std::io::Error::other("bus glitch");
        match map_hw_error(&e) {
            AnnealError::ActuatorFault(s) => assert!(s.contains("bus glitch")),
            other => panic!("expected ActuatorFault, got {other:?}"),
        }
    }
}
