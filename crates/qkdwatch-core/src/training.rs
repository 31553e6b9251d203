//! Offline training of the cascade models from simulated windows.
//!
//! Each labelled scenario is run through the same stream and window code the
//! monitor uses, so the models learn exactly the fingerprints they will see
//! at run time. Sensor noise is added afterwards to stand in for real
//! measurement uncertainty:
//!
//! | feature     | σ      | origin             |
//! |-------------|--------|--------------------|
//! | QBER (×3)   | 0.005  | photon shot noise  |
//! | voltage     | 0.15 V | ADC quantization   |
//! | jitter      | 0.05 ns| oscilloscope noise |
//! | count rate  | 0.01   | Poisson variance   |

use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cascade::{BoundaryModel, GaussianSignatureModel, ModelError, ThreatClass};
use crate::config::IdsConfig;
use crate::detector::{AttackMode, gaussian};
use crate::source::IntensityMode;
use crate::stream::{EventStream, Scenario};
use crate::window::{EventWindow, FEATURE_COUNT, Fingerprint};

pub const SIGNATURE_FILE: &str = "signature_model.json";
pub const NOVELTY_FILE: &str = "novelty_model.json";

/// Per-feature standard deviation of the augmentation noise.
pub const SENSOR_NOISE_STD: [f64; FEATURE_COUNT] = [0.005, 0.005, 0.005, 0.15, 0.05, 0.01];

/// Scenario simulated for each known class.
pub const TRAINING_SCENARIOS: [(ThreatClass, Scenario); 4] = [
    (ThreatClass::Normal, Scenario::NORMAL),
    (
        ThreatClass::Intercept,
        Scenario {
            attack: AttackMode::Intercept,
            intensity: IntensityMode::SinglePhoton,
        },
    ),
    (ThreatClass::Blinding, Scenario::BLINDING),
    (
        ThreatClass::TimeShift,
        Scenario {
            attack: AttackMode::TimeShift,
            intensity: IntensityMode::SinglePhoton,
        },
    ),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    /// Fingerprints collected per class.
    pub windows_per_class: usize,
    /// New events between consecutive samples once the window is full.
    pub sample_stride: usize,
    pub seed: u64,
    pub noise: [f64; FEATURE_COUNT],
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            windows_per_class: 400,
            sample_stride: 50,
            seed: 42,
            noise: SENSOR_NOISE_STD,
        }
    }
}

/// Run `scenario` and sample `count` fingerprints from its sliding window.
pub fn collect_fingerprints(
    config: &IdsConfig,
    scenario: Scenario,
    count: usize,
    stride: usize,
    seed: u64,
) -> Vec<Fingerprint> {
    let stride = stride.max(1);
    let mut stream = EventStream::new(config.physics.stream_config(), scenario, Some(seed));
    let mut window = EventWindow::new(config.window.size);
    let mut samples = Vec::with_capacity(count);
    let mut since = stride - 1;
    while samples.len() < count {
        window.tick();
        let Some(event) = stream.step() else { continue };
        window.push(event);
        if !window.is_ready() {
            continue;
        }
        since += 1;
        if since < stride {
            continue;
        }
        since = 0;
        if let Some(f) = window.extract_features() {
            samples.push(f);
        }
    }
    samples
}

/// Add independent Gaussian noise to every feature.
pub fn augment(samples: &mut [Fingerprint], stds: &[f64; FEATURE_COUNT], rng: &mut StdRng) {
    for f in samples.iter_mut() {
        let mut v = f.to_array();
        for (x, s) in v.iter_mut().zip(stds) {
            *x = gaussian(rng, *x, *s);
        }
        *f = Fingerprint::from_array(v);
    }
}

/// The two fitted models.
#[derive(Debug, Clone)]
pub struct TrainedModels {
    pub signature: GaussianSignatureModel,
    pub novelty: BoundaryModel,
}

impl TrainedModels {
    /// Write both artifacts into `dir`, returning their paths.
    pub fn save(&self, dir: &Path) -> Result<(PathBuf, PathBuf), ModelError> {
        std::fs::create_dir_all(dir)?;
        let signature = dir.join(SIGNATURE_FILE);
        let novelty = dir.join(NOVELTY_FILE);
        self.signature.save(&signature)?;
        self.novelty.save(&novelty)?;
        Ok((signature, novelty))
    }
}

/// Simulate every known class, augment, and fit both models. The novelty
/// boundary sees normal windows only.
pub fn train(config: &IdsConfig, training: &TrainingConfig) -> Result<TrainedModels, ModelError> {
    let mut rng = StdRng::seed_from_u64(training.seed);
    let mut labelled = Vec::new();
    let mut normal = Vec::new();

    for (i, (class, scenario)) in TRAINING_SCENARIOS.iter().enumerate() {
        let mut samples = collect_fingerprints(
            config,
            *scenario,
            training.windows_per_class,
            training.sample_stride,
            training.seed.wrapping_add(i as u64 + 1),
        );
        augment(&mut samples, &training.noise, &mut rng);
        log::info!("collected {} windows for {class} ({scenario})", samples.len());
        if *class == ThreatClass::Normal {
            normal.extend_from_slice(&samples);
        }
        labelled.extend(samples.into_iter().map(|f| (f, *class)));
    }

    let signature = GaussianSignatureModel::fit(&labelled)?;
    let novelty = BoundaryModel::fit(&normal, config.cascade.novelty_nu)?;
    log::info!(
        "trained signature model on {} windows, novelty boundary on {}",
        labelled.len(),
        normal.len()
    );
    Ok(TrainedModels { signature, novelty })
}
