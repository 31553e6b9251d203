//! Photon-by-photon event stream.
//!
//! [`EventStream`] drives the source, the channel and the detector one tick at
//! a time and yields an [`Event`] whenever the detector clicks. The stream is
//! unbounded and cannot be restarted; a fresh stream is a fresh session.
//!
//! Transient attack injections arrive over a message channel. An external
//! controller holds an [`InjectionHandle`]; the stream drains the channel once
//! per tick and applies the most recent message.

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detector::{ApdDetector, AttackMode, DetectOutcome, DetectorConfig};
use crate::quantum::{Basis, Polarization, PolarizationState};
use crate::source::{IntensityMode, PhotonSource};

/// Simulation time advanced per photon.
pub const DEFAULT_TICK: Duration = Duration::from_micros(1);

/// Channel depolarizing probability (fiber birefringence, misalignment).
pub const DEFAULT_DEPOLARIZING_RATE: f64 = 0.04;

// ---------------------------------------------------------------------------
// Scenario and injection
// ---------------------------------------------------------------------------

/// Attack tag plus intensity regime applied to a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scenario {
    pub attack: AttackMode,
    pub intensity: IntensityMode,
}

impl Scenario {
    pub const NORMAL: Scenario = Scenario {
        attack: AttackMode::None,
        intensity: IntensityMode::SinglePhoton,
    };

    pub const BLINDING: Scenario = Scenario {
        attack: AttackMode::None,
        intensity: IntensityMode::Blinding,
    };

    pub fn new(attack: AttackMode, intensity: IntensityMode) -> Self {
        Self { attack, intensity }
    }

    /// Build from separate attack and intensity names. The attack name
    /// `blinding` selects the bright-light intensity.
    pub fn from_names(attack: &str, intensity: Option<&str>) -> Result<Self, String> {
        let mut scenario: Scenario = attack.parse()?;
        if let Some(intensity) = intensity {
            let intensity: IntensityMode = intensity.parse()?;
            if intensity == IntensityMode::Blinding {
                scenario.intensity = intensity;
            }
        }
        Ok(scenario)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.attack, self.intensity) {
            (attack, IntensityMode::SinglePhoton) => write!(f, "{attack}"),
            (AttackMode::None, IntensityMode::Blinding) => write!(f, "blinding"),
            (attack, IntensityMode::Blinding) => write!(f, "{attack}+blinding"),
        }
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blinding" => Ok(Self::BLINDING),
            other => match other.split_once('+') {
                Some((attack, "blinding")) => Ok(Self::new(attack.parse()?, IntensityMode::Blinding)),
                _ => Ok(Self::new(other.parse()?, IntensityMode::SinglePhoton)),
            },
        }
    }
}

/// Request to override the baseline scenario for a number of ticks.
/// `events == 0` cancels any active override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Injection {
    pub scenario: Scenario,
    pub events: u64,
}

/// Override currently in force inside the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientInjection {
    pub scenario: Scenario,
    /// Ticks left before reverting to the baseline.
    pub remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event stream has shut down")]
pub struct StreamClosed;

/// Sending half of the injection channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InjectionHandle {
    tx: mpsc::Sender<Injection>,
}

impl InjectionHandle {
    pub fn inject(&self, injection: Injection) -> Result<(), StreamClosed> {
        self.tx.send(injection).map_err(|_| StreamClosed)
    }

    pub fn cancel(&self) -> Result<(), StreamClosed> {
        self.inject(Injection {
            scenario: Scenario::NORMAL,
            events: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One detected photon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub sender_bit: u8,
    pub sender_basis: Basis,
    pub receiver_basis: Basis,
    pub receiver_bit: u8,
    pub voltage: f64,
    pub jitter: f64,
}

impl Event {
    pub fn bases_match(&self) -> bool {
        self.sender_basis == self.receiver_basis
    }

    /// Sifted error: bits disagree on a basis-matched pair.
    pub fn is_error(&self) -> bool {
        self.bases_match() && self.sender_bit != self.receiver_bit
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    pub detector: DetectorConfig,
    pub depolarizing_rate: f64,
    pub tick: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            depolarizing_rate: DEFAULT_DEPOLARIZING_RATE,
            tick: DEFAULT_TICK,
        }
    }
}

pub struct EventStream {
    config: StreamConfig,
    source: PhotonSource,
    detector: ApdDetector,
    rng: StdRng,
    clock: Duration,
    ticks: u64,
    events: u64,
    baseline: Scenario,
    injection: Option<TransientInjection>,
    control_rx: mpsc::Receiver<Injection>,
    control_tx: mpsc::Sender<Injection>,
}

impl EventStream {
    /// Create a stream. A `seed` makes the session reproducible.
    pub fn new(config: StreamConfig, baseline: Scenario, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let (control_tx, control_rx) = mpsc::channel();
        log::info!(
            "event stream started: baseline={baseline}, depolarizing={:.3}, tick={:?}",
            config.depolarizing_rate,
            config.tick
        );
        Self {
            config,
            source: PhotonSource::new(),
            detector: ApdDetector::new(config.detector),
            rng,
            clock: Duration::ZERO,
            ticks: 0,
            events: 0,
            baseline,
            injection: None,
            control_rx,
            control_tx,
        }
    }

    pub fn injector(&self) -> InjectionHandle {
        InjectionHandle {
            tx: self.control_tx.clone(),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn baseline(&self) -> Scenario {
        self.baseline
    }

    pub fn injection(&self) -> Option<TransientInjection> {
        self.injection
    }

    /// Scenario that the next tick will run under.
    pub fn active_scenario(&self) -> Scenario {
        self.injection.map_or(self.baseline, |inj| inj.scenario)
    }

    pub fn detector(&self) -> &ApdDetector {
        &self.detector
    }

    fn poll_control(&mut self) {
        let mut latest = None;
        while let Ok(msg) = self.control_rx.try_recv() {
            latest = Some(msg);
        }
        let Some(msg) = latest else { return };
        if msg.events == 0 {
            if self.injection.take().is_some() {
                log::info!("injection cancelled, reverting to {}", self.baseline);
            }
        } else {
            log::info!(
                "injection accepted: {} for {} ticks (tick {})",
                msg.scenario,
                msg.events,
                self.ticks
            );
            self.injection = Some(TransientInjection {
                scenario: msg.scenario,
                remaining: msg.events,
            });
        }
    }

    fn random_basis(&mut self) -> Basis {
        if self.rng.random::<bool>() {
            Basis::Diagonal
        } else {
            Basis::Rectilinear
        }
    }

    /// Run exactly one photon tick. Returns the event if the detector fired.
    pub fn step(&mut self) -> Option<Event> {
        self.poll_control();
        let scenario = self.active_scenario();
        self.detector.set_attack_mode(scenario.attack);

        let sender_bit = u8::from(self.rng.random::<bool>());
        let sender_basis = self.random_basis();
        let label = Polarization::encode(sender_bit, sender_basis);
        let (mut state, flux) = self.source.emit(label, scenario.intensity);

        if scenario.attack == AttackMode::Intercept {
            // Measure in a random basis and re-prepare what was seen.
            let eve_basis = self.random_basis();
            let eve_bit = state.measure(eve_basis, &mut self.rng);
            state = PolarizationState::from_label(Polarization::encode(eve_bit, eve_basis));
        }
        if self.config.depolarizing_rate > 0.0 {
            state.apply_depolarizing(self.config.depolarizing_rate);
        }

        let receiver_basis = self.random_basis();
        let outcome = self
            .detector
            .detect(state, flux, receiver_basis, self.clock, &mut self.rng);

        self.clock += self.config.tick;
        self.ticks += 1;
        if let Some(inj) = self.injection.as_mut() {
            inj.remaining = inj.remaining.saturating_sub(1);
            if inj.remaining == 0 {
                log::info!("injection of {} expired, reverting to {}", inj.scenario, self.baseline);
                self.injection = None;
            }
        }

        match outcome {
            DetectOutcome::Fired(d) => {
                self.events += 1;
                Some(Event {
                    sender_bit,
                    sender_basis,
                    receiver_basis,
                    receiver_bit: d.bit,
                    voltage: d.telemetry.voltage,
                    jitter: d.telemetry.jitter,
                })
            }
            DetectOutcome::NoEvent(_) => None,
        }
    }
}

/// Never returns `None`: ticks are run until the detector fires.
impl Iterator for EventStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.step() {
                return Some(event);
            }
        }
    }
}
