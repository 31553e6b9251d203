//! Two-model detection cascade.
//!
//! A fingerprint is scored by a novelty boundary (trained on normal windows
//! only) and a multi-class signature model, and the two answers are combined
//! in strict priority order:
//!
//! 1. out-of-distribution, labelled normal, confidence below threshold → `ZeroDay`
//! 2. confidence below threshold → `Uncertain(label)`
//! 3. label is an attack → `Attack(label)`
//! 4. otherwise → `Normal`
//!
//! Disagreement between the models ranks above a merely low-confidence call.

pub mod model;
pub mod verdict;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::window::Fingerprint;

pub use model::{
    BoundaryModel, GaussianSignatureModel, ModelError, NoveltyModel, SignatureModel, ThreatClass,
    most_probable,
};
pub use verdict::{Assessment, Verdict};

/// Minimum signature confidence for a definite call.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// Expected outlier fraction used when fitting the novelty boundary.
pub const DEFAULT_NOVELTY_NU: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub confidence_threshold: f64,
    pub novelty_nu: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            novelty_nu: DEFAULT_NOVELTY_NU,
        }
    }
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("model artifact not found: {}", .0.display())]
    MissingArtifact(PathBuf),
    #[error("failed to load model {}: {source}", .path.display())]
    Model {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
}

/// Combine the two model outputs into a verdict.
pub fn decide(label: ThreatClass, confidence: f64, novelty_flag: bool, threshold: f64) -> Verdict {
    let confident = confidence >= threshold;
    if novelty_flag && label == ThreatClass::Normal && !confident {
        Verdict::ZeroDay
    } else if !confident {
        Verdict::Uncertain(label)
    } else if label != ThreatClass::Normal {
        Verdict::Attack(label)
    } else {
        Verdict::Normal
    }
}

pub struct Cascade {
    signature: Box<dyn SignatureModel>,
    novelty: Box<dyn NoveltyModel>,
    config: CascadeConfig,
}

impl Cascade {
    pub fn new(
        signature: Box<dyn SignatureModel>,
        novelty: Box<dyn NoveltyModel>,
        config: CascadeConfig,
    ) -> Self {
        Self {
            signature,
            novelty,
            config,
        }
    }

    /// Load both artifacts. A missing file is fatal; nothing is retried.
    pub fn load(
        signature_path: &Path,
        novelty_path: &Path,
        config: CascadeConfig,
    ) -> Result<Self, CascadeError> {
        for path in [signature_path, novelty_path] {
            if !path.is_file() {
                return Err(CascadeError::MissingArtifact(path.to_path_buf()));
            }
        }
        let signature =
            GaussianSignatureModel::from_file(signature_path).map_err(|source| CascadeError::Model {
                path: signature_path.to_path_buf(),
                source,
            })?;
        let novelty = BoundaryModel::from_file(novelty_path).map_err(|source| CascadeError::Model {
            path: novelty_path.to_path_buf(),
            source,
        })?;
        log::info!(
            "cascade loaded: classes={:?}, boundary nu={}, threshold={}",
            signature.class_labels(),
            novelty.nu,
            config.confidence_threshold
        );
        Ok(Self::new(Box::new(signature), Box::new(novelty), config))
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn assess(&self, features: &Fingerprint) -> Assessment {
        let novelty_score = self.novelty.score(features);
        let novelty_flag = self.novelty.is_outlier(features);
        let class_probabilities = self.signature.predict_proba(features);
        let (label, confidence) = most_probable(&class_probabilities);
        let verdict = decide(label, confidence, novelty_flag, self.config.confidence_threshold);
        Assessment {
            verdict,
            signature_label: label,
            signature_confidence: confidence,
            class_probabilities,
            novelty_flag,
            novelty_score,
            flagged: verdict.is_flagged(),
        }
    }
}
