//! Sender-side photon source.
//!
//! The source prepares one polarization state per tick and reports the mean
//! incident flux that accompanies it. In single-photon operation the flux is
//! a weak-coherent 0.1 photons per pulse; under a blinding override an
//! attacker floods the link with bright continuous-wave light, modelled as a
//! flux many orders of magnitude above the detector's saturation limit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::quantum::{Polarization, PolarizationState};

/// Mean photons per pulse in normal operation.
pub const SINGLE_PHOTON_FLUX: f64 = 0.1;

/// Incident flux of a bright-light blinding attack.
pub const BLINDING_FLUX: f64 = 1e9;

/// Intensity regime of the light arriving at the receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityMode {
    #[default]
    SinglePhoton,
    Blinding,
}

impl IntensityMode {
    pub fn flux(self) -> f64 {
        match self {
            Self::SinglePhoton => SINGLE_PHOTON_FLUX,
            Self::Blinding => BLINDING_FLUX,
        }
    }
}

impl fmt::Display for IntensityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SinglePhoton => write!(f, "single_photon"),
            Self::Blinding => write!(f, "blinding"),
        }
    }
}

impl FromStr for IntensityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_photon" | "single-photon" | "normal" => Ok(Self::SinglePhoton),
            "blinding" | "bright" => Ok(Self::Blinding),
            other => Err(format!(
                "unknown intensity mode '{other}' (expected single_photon or blinding)"
            )),
        }
    }
}

/// Polarization-encoding photon source.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotonSource;

impl PhotonSource {
    pub fn new() -> Self {
        Self
    }

    /// Prepare a fresh state for `label` and report the flux for `intensity`.
    pub fn emit(&self, label: Polarization, intensity: IntensityMode) -> (PolarizationState, f64) {
        (PolarizationState::from_label(label), intensity.flux())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_prepares_requested_label() {
        let source = PhotonSource::new();
        for label in Polarization::ALL {
            let (state, flux) = source.emit(label, IntensityMode::SinglePhoton);
            assert!((state.fidelity(label) - 1.0).abs() < 1e-12);
            assert_eq!(flux, SINGLE_PHOTON_FLUX);
        }
    }

    #[test]
    fn blinding_flux_is_overwhelming() {
        let (_, flux) = PhotonSource::new().emit(Polarization::H, IntensityMode::Blinding);
        assert!(flux >= 1e9);
    }

    #[test]
    fn intensity_parsing() {
        assert_eq!(
            "blinding".parse::<IntensityMode>().unwrap(),
            IntensityMode::Blinding
        );
        assert_eq!(
            "single_photon".parse::<IntensityMode>().unwrap(),
            IntensityMode::SinglePhoton
        );
        assert!("laser".parse::<IntensityMode>().is_err());
        assert_eq!(IntensityMode::Blinding.to_string(), "blinding");
    }
}
