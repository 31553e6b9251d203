//! Statistical models behind the cascade and their JSON artifacts.
//!
//! Two capabilities, each behind a trait so any conforming implementation can
//! be swapped in:
//!
//! - [`SignatureModel`]: multi-class classifier over known link conditions.
//!   Shipped implementation: [`GaussianSignatureModel`] (Gaussian naive Bayes
//!   whose posterior flattens toward uniform when no class explains the
//!   fingerprint).
//! - [`NoveltyModel`]: one-class boundary trained on normal fingerprints only.
//!   Shipped implementation: [`BoundaryModel`] (standardised distance to the
//!   normal centroid, scored against a χ² distribution).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use thiserror::Error;

use crate::window::{FEATURE_COUNT, FEATURE_NAMES, Fingerprint};

/// Artifact format version written by this crate.
pub const MODEL_FORMAT_VERSION: &str = "1.0.0";

/// Smallest per-class variance; keeps degenerate features (a QBER pinned at
/// exactly 0) from producing infinite likelihoods.
const VARIANCE_FLOOR: f64 = 1e-6;

/// Smallest per-feature scale of the novelty boundary.
const MIN_STD: f64 = 1e-3;

/// Class support below which the signature posterior is flattened.
pub const DEFAULT_SUPPORT_FLOOR: f64 = 1e-3;

fn default_support_floor() -> f64 {
    DEFAULT_SUPPORT_FLOOR
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid model JSON: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("feature names {0:?} do not match the fingerprint layout")]
    FeatureOrder(Vec<String>),
    #[error("non-finite or non-positive parameter in {0}")]
    NonFinite(&'static str),
    #[error("model has no '{0}' class")]
    MissingClass(ThreatClass),
    #[error("class '{0}' appears more than once")]
    DuplicateClass(ThreatClass),
    #[error("support floor {0} must lie in (0, 1)")]
    InvalidSupportFloor(f64),
    #[error("novelty rate {0} must lie in (0, 1)")]
    InvalidNu(f64),
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

/// Link conditions the signature model knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThreatClass {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "attack_intercept")]
    Intercept,
    #[serde(rename = "attack_blinding")]
    Blinding,
    #[serde(rename = "attack_timeshift")]
    TimeShift,
}

impl ThreatClass {
    pub const ALL: [ThreatClass; 4] = [
        ThreatClass::Normal,
        ThreatClass::Intercept,
        ThreatClass::Blinding,
        ThreatClass::TimeShift,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Intercept => "attack_intercept",
            Self::Blinding => "attack_blinding",
            Self::TimeShift => "attack_timeshift",
        }
    }
}

impl fmt::Display for ThreatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "attack_intercept" | "intercept" => Ok(Self::Intercept),
            "attack_blinding" | "blinding" => Ok(Self::Blinding),
            "attack_timeshift" | "timeshift" => Ok(Self::TimeShift),
            other => Err(format!("unknown threat class '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Multi-class signature classifier.
pub trait SignatureModel: Send + Sync {
    /// Posterior probability per class; sums to 1.
    fn predict_proba(&self, features: &Fingerprint) -> BTreeMap<ThreatClass, f64>;

    /// Most probable class and its probability.
    fn predict(&self, features: &Fingerprint) -> (ThreatClass, f64) {
        most_probable(&self.predict_proba(features))
    }
}

/// Arg-max of a class distribution. Ties go to the class ordered first, so
/// a flat distribution reads as `Normal`.
pub fn most_probable(probs: &BTreeMap<ThreatClass, f64>) -> (ThreatClass, f64) {
    probs
        .iter()
        .fold((ThreatClass::Normal, f64::NEG_INFINITY), |best, (&class, &p)| {
            if p > best.1 { (class, p) } else { best }
        })
}

/// One-class boundary detector.
pub trait NoveltyModel: Send + Sync {
    /// In-distribution score in [0, 1]; small means unfamiliar.
    fn score(&self, features: &Fingerprint) -> f64;

    fn is_outlier(&self, features: &Fingerprint) -> bool;
}

// ---------------------------------------------------------------------------
// Artifact helpers
// ---------------------------------------------------------------------------

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_artifact<T: Serialize>(value: &T, path: &Path) -> Result<(), ModelError> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn check_feature_names(names: &[String]) -> Result<(), ModelError> {
    if names.len() != FEATURE_COUNT || names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b) {
        return Err(ModelError::FeatureOrder(names.to_vec()));
    }
    Ok(())
}

fn check_vector(v: &[f64], positive: bool, field: &'static str) -> Result<(), ModelError> {
    if v.len() != FEATURE_COUNT {
        return Err(ModelError::DimensionMismatch {
            expected: FEATURE_COUNT,
            got: v.len(),
        });
    }
    if v.iter().any(|x| !x.is_finite() || (positive && *x <= 0.0)) {
        return Err(ModelError::NonFinite(field));
    }
    Ok(())
}

fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

fn mean_and_variance<'a>(rows: impl Iterator<Item = &'a [f64; FEATURE_COUNT]> + Clone) -> (Vec<f64>, Vec<f64>) {
    let n = rows.clone().count().max(1) as f64;
    let mut mean = vec![0.0; FEATURE_COUNT];
    for row in rows.clone() {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x / n;
        }
    }
    let mut var = vec![0.0; FEATURE_COUNT];
    for row in rows {
        for ((v, x), m) in var.iter_mut().zip(row).zip(&mean) {
            *v += (x - m) * (x - m) / n;
        }
    }
    (mean, var)
}

// ---------------------------------------------------------------------------
// Gaussian naive Bayes signature model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassStats {
    pub class: ThreatClass,
    pub prior: f64,
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

/// Gaussian naive Bayes over the six fingerprint features.
///
/// Naive Bayes posteriors saturate: a fingerprint far from every class still
/// gets probability ~1 for whichever class is least far. Each class therefore
/// also reports its support, the χ² upper-tail probability of the
/// fingerprint's standardised distance to that class. When the best support
/// drops below `support_floor` the posterior is mixed toward uniform in
/// proportion, so telemetry unlike any training window scores low confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianSignatureModel {
    pub model_id: String,
    pub model_version: String,
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub training_samples: usize,
    #[serde(default = "default_support_floor")]
    pub support_floor: f64,
    pub classes: Vec<ClassStats>,
}

impl GaussianSignatureModel {
    /// Fit per-class means, variances and priors.
    pub fn fit(samples: &[(Fingerprint, ThreatClass)]) -> Result<Self, ModelError> {
        if samples.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let rows: Vec<([f64; FEATURE_COUNT], ThreatClass)> =
            samples.iter().map(|(f, c)| (f.to_array(), *c)).collect();

        let mut classes = Vec::new();
        for class in ThreatClass::ALL {
            let members = rows.iter().filter(|(_, c)| *c == class).map(|(x, _)| x);
            let count = members.clone().count();
            if count == 0 {
                continue;
            }
            let (mean, variance) = mean_and_variance(members);
            classes.push(ClassStats {
                class,
                prior: count as f64 / rows.len() as f64,
                mean,
                variance: variance.into_iter().map(|v| v.max(VARIANCE_FLOOR)).collect(),
            });
        }

        let model = Self {
            model_id: "gaussian-signature".to_string(),
            model_version: MODEL_FORMAT_VERSION.to_string(),
            feature_names: feature_names(),
            training_samples: samples.len(),
            support_floor: DEFAULT_SUPPORT_FLOOR,
            classes,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        check_feature_names(&self.feature_names)?;
        if !self.classes.iter().any(|c| c.class == ThreatClass::Normal) {
            return Err(ModelError::MissingClass(ThreatClass::Normal));
        }
        if !(self.support_floor > 0.0 && self.support_floor < 1.0) {
            return Err(ModelError::InvalidSupportFloor(self.support_floor));
        }
        let mut seen = BTreeSet::new();
        for c in &self.classes {
            if !seen.insert(c.class) {
                return Err(ModelError::DuplicateClass(c.class));
            }
            check_vector(&c.mean, false, "class mean")?;
            check_vector(&c.variance, true, "class variance")?;
            if !c.prior.is_finite() || c.prior <= 0.0 {
                return Err(ModelError::NonFinite("class prior"));
            }
        }
        Ok(())
    }

    pub fn class_labels(&self) -> Vec<ThreatClass> {
        self.classes.iter().map(|c| c.class).collect()
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let model: Self = read_artifact(path)?;
        model.validate()?;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        write_artifact(self, path)
    }

    /// Uncalibrated naive Bayes posterior.
    pub fn posterior(&self, features: &Fingerprint) -> BTreeMap<ThreatClass, f64> {
        let log_joint = self.log_joint(&features.to_array());
        let max = log_joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = log_joint.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        self.classes
            .iter()
            .zip(exp)
            .map(|(c, e)| (c.class, e / total))
            .collect()
    }

    /// χ² upper-tail probability of the fingerprint under each class.
    pub fn class_support(&self, features: &Fingerprint) -> BTreeMap<ThreatClass, f64> {
        let x = features.to_array();
        let Ok(chi) = ChiSquared::new(FEATURE_COUNT as f64) else {
            return BTreeMap::new();
        };
        self.classes
            .iter()
            .map(|c| {
                let d: f64 = x
                    .iter()
                    .zip(c.mean.iter().zip(&c.variance))
                    .map(|(xi, (m, v))| (xi - m) * (xi - m) / v)
                    .sum();
                let support = if d.is_finite() { chi.sf(d) } else { 0.0 };
                (c.class, support)
            })
            .collect()
    }

    /// Weight in [0, 1] given to the naive Bayes posterior; the rest goes to
    /// the uniform distribution.
    pub fn trust(&self, features: &Fingerprint) -> f64 {
        let best = self
            .class_support(features)
            .into_values()
            .fold(0.0, f64::max);
        (best / self.support_floor).min(1.0)
    }

    fn log_joint(&self, x: &[f64; FEATURE_COUNT]) -> Vec<f64> {
        self.classes
            .iter()
            .map(|c| {
                let ll: f64 = x
                    .iter()
                    .zip(c.mean.iter().zip(&c.variance))
                    .map(|(xi, (m, v))| {
                        -0.5 * (std::f64::consts::TAU * v).ln() - (xi - m) * (xi - m) / (2.0 * v)
                    })
                    .sum();
                c.prior.ln() + ll
            })
            .collect()
    }
}

impl SignatureModel for GaussianSignatureModel {
    fn predict_proba(&self, features: &Fingerprint) -> BTreeMap<ThreatClass, f64> {
        let trust = self.trust(features);
        let uniform = 1.0 / self.classes.len() as f64;
        self.posterior(features)
            .into_iter()
            .map(|(class, p)| (class, trust * p + (1.0 - trust) * uniform))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Boundary novelty model
// ---------------------------------------------------------------------------

/// Standardised squared distance to the centroid of normal fingerprints.
///
/// Under the training distribution the distance is approximately χ² with
/// six degrees of freedom; a fingerprint whose upper-tail probability falls
/// below `nu` lies outside the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryModel {
    pub model_id: String,
    pub model_version: String,
    pub feature_names: Vec<String>,
    pub nu: f64,
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
    #[serde(default)]
    pub training_samples: usize,
}

impl BoundaryModel {
    pub fn fit(normal: &[Fingerprint], nu: f64) -> Result<Self, ModelError> {
        if normal.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let rows: Vec<[f64; FEATURE_COUNT]> = normal.iter().map(Fingerprint::to_array).collect();
        let (center, variance) = mean_and_variance(rows.iter());
        let model = Self {
            model_id: "chi2-boundary".to_string(),
            model_version: MODEL_FORMAT_VERSION.to_string(),
            feature_names: feature_names(),
            nu,
            center,
            scale: variance.into_iter().map(|v| v.sqrt().max(MIN_STD)).collect(),
            training_samples: normal.len(),
        };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        check_feature_names(&self.feature_names)?;
        if !(self.nu > 0.0 && self.nu < 1.0) {
            return Err(ModelError::InvalidNu(self.nu));
        }
        check_vector(&self.center, false, "boundary center")?;
        check_vector(&self.scale, true, "boundary scale")?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let model: Self = read_artifact(path)?;
        model.validate()?;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        write_artifact(self, path)
    }

    /// Σ ((x − c) / s)².
    pub fn distance(&self, features: &Fingerprint) -> f64 {
        features
            .to_array()
            .iter()
            .zip(self.center.iter().zip(&self.scale))
            .map(|(x, (c, s))| ((x - c) / s).powi(2))
            .sum()
    }
}

impl NoveltyModel for BoundaryModel {
    fn score(&self, features: &Fingerprint) -> f64 {
        let d = self.distance(features);
        if !d.is_finite() {
            return 0.0;
        }
        ChiSquared::new(FEATURE_COUNT as f64)
            .map(|chi| chi.sf(d))
            .unwrap_or(0.0)
    }

    fn is_outlier(&self, features: &Fingerprint) -> bool {
        self.score(features) < self.nu
    }
}
