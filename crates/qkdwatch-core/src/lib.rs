//! # qkdwatch-core
//!
//! **Photon-level QKD link simulation with a real-time tamper detector.**
//!
//! `qkdwatch-core` simulates the physical layer of a BB84 link one photon at a
//! time (polarization qubits, a depolarizing fiber, a gated avalanche
//! photodiode with attack-dependent response curves) and watches the
//! resulting event stream for eavesdropping and detector tampering:
//! intercept-resend, bright-light blinding, time-shift, and telemetry that
//! matches nothing seen before.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use qkdwatch_core::{Cascade, CascadeConfig, IdsConfig, Monitor, Scenario};
//!
//! let config = IdsConfig::default();
//! let cascade = Cascade::load(
//!     Path::new("models/signature_model.json"),
//!     Path::new("models/novelty_model.json"),
//!     CascadeConfig::default(),
//! )?;
//! let mut monitor = Monitor::new(&config, cascade, Scenario::NORMAL, Some(42));
//!
//! loop {
//!     if let Some(report) = monitor.step() {
//!         println!("window {}: {}", report.sequence, report.verdict);
//!         break;
//!     }
//! }
//! # Ok::<(), qkdwatch_core::CascadeError>(())
//! ```
//!
//! ## Architecture
//!
//! Kernel → Source/Detector → EventStream → EventWindow → Cascade → WindowReport
//!
//! Data only flows upward. The stream owns all mutable session state
//! (detector, clock, active injection); the cascade alone decides verdicts.

pub mod audit;
pub mod cascade;
pub mod config;
pub mod detector;
pub mod monitor;
pub mod narrative;
pub mod quantum;
pub mod source;
pub mod stream;
pub mod training;
pub mod window;

pub use audit::{AuditConfig, AuditMeta, AuditWriter};
pub use cascade::{
    Assessment, BoundaryModel, Cascade, CascadeConfig, CascadeError, GaussianSignatureModel,
    ModelError, NoveltyModel, SignatureModel, ThreatClass, Verdict, decide,
};
pub use config::{ConfigError, IdsConfig, PhysicsConfig, WindowConfig};
pub use detector::{
    ApdDetector, AttackMode, DetectOutcome, Detection, DetectorConfig, DetectorState,
    NoEventReason, Regime, Telemetry,
};
pub use monitor::{Monitor, MonitorStats, MonitorSummary, WindowReport};
pub use narrative::{Vitals, forensic_report};
pub use quantum::{Basis, KernelError, Polarization, PolarizationState};
pub use source::{IntensityMode, PhotonSource};
pub use stream::{
    Event, EventStream, Injection, InjectionHandle, Scenario, StreamClosed, StreamConfig,
    TransientInjection,
};
pub use training::{TrainedModels, TrainingConfig};
pub use window::{EventWindow, FEATURE_NAMES, Fingerprint};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
