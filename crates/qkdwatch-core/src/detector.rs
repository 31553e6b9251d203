//! Avalanche photodiode (APD) receiver model.
//!
//! A gated InGaAs single-photon detector operated in Geiger mode: a photon
//! absorbed in the multiplication region triggers a macroscopic avalanche that
//! is read out as a voltage pulse with a small timing jitter.
//!
//! ## Physics
//!
//! 1. **Dead time**: after every avalanche the bias is quenched and restored;
//!    for 10 µs the diode cannot fire again, whatever arrives.
//! 2. **Dark counts**: thermally generated carriers occasionally trigger an
//!    avalanche with no photon present (1e-5 per gate). The recorded bit is
//!    random and the telemetry is erratic.
//! 3. **Efficiency**: only ~25% of incident single photons produce a click.
//! 4. **Intrinsic errors**: optical misalignment flips ~0.5% of bits.
//!
//! ## Attack signatures
//!
//! | regime     | voltage (V)  | jitter (ns)  | fires   |
//! |------------|--------------|--------------|---------|
//! | saturated  | 9.0 ± 0.05   | 0.10 ± 0.01  | always  |
//! | time-shift | 3.3 ± 0.2    | 0.05 ± 0.01  | 15%     |
//! | zero-day   | 6.5 ± 0.1    | 2.8 ± 0.1    | 25%     |
//! | normal     | 3.3 ± 0.2    | 1.2 ± 0.2    | 25%     |
//!
//! A detector pushed into saturation by bright light leaves Geiger mode and
//! behaves as a classical linear photodiode. Saturation pre-empts every other
//! regime: a blinded diode cannot also show gate-edge timing behaviour.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::quantum::{Basis, PolarizationState};

/// Recovery interval after an avalanche.
pub const DEAD_TIME: Duration = Duration::from_micros(10);

/// Probability of a thermal false click per gate.
pub const DARK_COUNT_PROB: f64 = 1e-5;

/// Click probability for an incident single photon.
pub const BASE_EFFICIENCY: f64 = 0.25;

/// Probability that a measured bit is flipped by detector imperfection.
pub const INTRINSIC_FLIP_PROB: f64 = 0.005;

/// Incident flux above which the diode leaves Geiger mode.
pub const SATURATION_LIMIT: f64 = 1e7;

/// Nominal bias voltage of a healthy detector, in volts.
pub const NOMINAL_VOLTAGE: f64 = 3.3;

/// Nominal timing jitter of a healthy detector, in nanoseconds.
pub const NOMINAL_JITTER: f64 = 1.2;

/// Draw from N(mean, std²). A negative or non-finite `std` yields the mean.
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, std: f64) -> f64 {
    match Normal::new(mean, std) {
        Ok(normal) => normal.sample(rng),
        Err(_) => mean,
    }
}

// ---------------------------------------------------------------------------
// Modes and regimes
// ---------------------------------------------------------------------------

/// Discrete attack tag carried by the detector state.
///
/// `Intercept` acts on the quantum channel, not on the diode; the detector
/// answers it with its normal response profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackMode {
    #[default]
    None,
    Intercept,
    TimeShift,
    ZeroDay,
}

impl fmt::Display for AttackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Intercept => write!(f, "intercept"),
            Self::TimeShift => write!(f, "timeshift"),
            Self::ZeroDay => write!(f, "zeroday"),
        }
    }
}

impl FromStr for AttackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "normal" => Ok(Self::None),
            "intercept" | "intercept_resend" => Ok(Self::Intercept),
            "timeshift" | "time_shift" => Ok(Self::TimeShift),
            "zeroday" | "zero_day" => Ok(Self::ZeroDay),
            other => Err(format!(
                "unknown attack mode '{other}' (expected none, intercept, timeshift or zeroday)"
            )),
        }
    }
}

/// Gaussian telemetry and click probability for one operating regime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseProfile {
    pub voltage_mean: f64,
    pub voltage_std: f64,
    pub jitter_mean: f64,
    pub jitter_std: f64,
    pub efficiency: f64,
}

impl ResponseProfile {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Telemetry {
        Telemetry {
            voltage: gaussian(rng, self.voltage_mean, self.voltage_std),
            jitter: gaussian(rng, self.jitter_mean, self.jitter_std).max(0.0),
        }
    }
}

const SATURATED_PROFILE: ResponseProfile = ResponseProfile {
    voltage_mean: 9.0,
    voltage_std: 0.05,
    jitter_mean: 0.1,
    jitter_std: 0.01,
    efficiency: 1.0,
};

const TIME_SHIFT_PROFILE: ResponseProfile = ResponseProfile {
    voltage_mean: NOMINAL_VOLTAGE,
    voltage_std: 0.2,
    jitter_mean: 0.05,
    jitter_std: 0.01,
    efficiency: 0.15,
};

const ZERO_DAY_PROFILE: ResponseProfile = ResponseProfile {
    voltage_mean: 6.5,
    voltage_std: 0.1,
    jitter_mean: 2.8,
    jitter_std: 0.1,
    efficiency: 0.25,
};

/// Thermal false clicks: nominal voltage, erratic timing.
const DARK_COUNT_PROFILE: ResponseProfile = ResponseProfile {
    voltage_mean: NOMINAL_VOLTAGE,
    voltage_std: 0.2,
    jitter_mean: NOMINAL_JITTER,
    jitter_std: 0.5,
    efficiency: 1.0,
};

/// Operating regime selected for one detection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Saturated,
    TimeShift,
    ZeroDay,
    Normal,
}

impl Regime {
    /// Pick the regime in strict priority order: saturation, then the
    /// attack tag, then normal operation.
    pub fn classify(flux: f64, mode: AttackMode, saturation_limit: f64) -> Self {
        if flux > saturation_limit {
            return Self::Saturated;
        }
        match mode {
            AttackMode::TimeShift => Self::TimeShift,
            AttackMode::ZeroDay => Self::ZeroDay,
            AttackMode::None | AttackMode::Intercept => Self::Normal,
        }
    }

    pub fn profile(self, base_efficiency: f64) -> ResponseProfile {
        match self {
            Self::Saturated => SATURATED_PROFILE,
            Self::TimeShift => TIME_SHIFT_PROFILE,
            Self::ZeroDay => ZERO_DAY_PROFILE,
            Self::Normal => ResponseProfile {
                voltage_mean: NOMINAL_VOLTAGE,
                voltage_std: 0.2,
                jitter_mean: NOMINAL_JITTER,
                jitter_std: 0.2,
                efficiency: base_efficiency,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Tunable detector constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub dead_time: Duration,
    pub dark_count_prob: f64,
    pub base_efficiency: f64,
    pub intrinsic_flip_prob: f64,
    pub saturation_limit: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            dead_time: DEAD_TIME,
            dark_count_prob: DARK_COUNT_PROB,
            base_efficiency: BASE_EFFICIENCY,
            intrinsic_flip_prob: INTRINSIC_FLIP_PROB,
            saturation_limit: SATURATION_LIMIT,
        }
    }
}

/// Analog readout of one avalanche.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Bias voltage in volts.
    pub voltage: f64,
    /// Timing jitter in nanoseconds.
    pub jitter: f64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            voltage: NOMINAL_VOLTAGE,
            jitter: NOMINAL_JITTER,
        }
    }
}

/// Mutable per-session detector state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorState {
    /// Stream time of the last avalanche; `None` until the first click.
    pub last_fire: Option<Duration>,
    pub attack_mode: AttackMode,
    /// Most recent telemetry, refreshed on every attempt past the dead-time gate.
    pub telemetry: Telemetry,
}

/// A click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bit: u8,
    pub telemetry: Telemetry,
    pub dark_count: bool,
}

/// Why an attempt produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoEventReason {
    /// Still recovering from the previous avalanche.
    DeadTime,
    /// The photon was not registered (efficiency or gate miss).
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectOutcome {
    Fired(Detection),
    NoEvent(NoEventReason),
}

impl DetectOutcome {
    pub fn detection(self) -> Option<Detection> {
        match self {
            Self::Fired(d) => Some(d),
            Self::NoEvent(_) => None,
        }
    }
}

/// Gated single-photon avalanche detector.
#[derive(Debug, Clone, Default)]
pub struct ApdDetector {
    config: DetectorConfig,
    state: DetectorState,
}

impl ApdDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::default(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn attack_mode(&self) -> AttackMode {
        self.state.attack_mode
    }

    pub fn set_attack_mode(&mut self, mode: AttackMode) {
        self.state.attack_mode = mode;
    }

    /// One detection attempt at stream time `now`. The incoming state is
    /// consumed by the measurement.
    pub fn detect<R: Rng + ?Sized>(
        &mut self,
        mut state: PolarizationState,
        flux: f64,
        basis: Basis,
        now: Duration,
        rng: &mut R,
    ) -> DetectOutcome {
        if let Some(last) = self.state.last_fire {
            if now.saturating_sub(last) < self.config.dead_time {
                return DetectOutcome::NoEvent(NoEventReason::DeadTime);
            }
        }

        if rng.random::<f64>() < self.config.dark_count_prob {
            let telemetry = DARK_COUNT_PROFILE.sample(rng);
            let bit = u8::from(rng.random::<bool>());
            return self.fire(now, bit, telemetry, true);
        }

        let mut bit = state.measure(basis, rng);
        if rng.random::<f64>() < self.config.intrinsic_flip_prob {
            bit ^= 1;
        }

        let regime = Regime::classify(flux, self.state.attack_mode, self.config.saturation_limit);
        let profile = regime.profile(self.config.base_efficiency);
        let telemetry = profile.sample(rng);
        self.state.telemetry = telemetry;

        if rng.random::<f64>() < profile.efficiency {
            self.fire(now, bit, telemetry, false)
        } else {
            DetectOutcome::NoEvent(NoEventReason::Miss)
        }
    }

    fn fire(&mut self, now: Duration, bit: u8, telemetry: Telemetry, dark_count: bool) -> DetectOutcome {
        self.state.last_fire = Some(now);
        self.state.telemetry = telemetry;
        DetectOutcome::Fired(Detection {
            bit,
            telemetry,
            dark_count,
        })
    }
}
