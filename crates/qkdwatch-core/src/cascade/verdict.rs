//! Cascade outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::model::ThreatClass;

/// Exactly one of four outcomes per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "class", rename_all = "snake_case")]
pub enum Verdict {
    Normal,
    /// Confident known-attack classification.
    Attack(ThreatClass),
    /// Low-confidence classification; must reach an operator.
    Uncertain(ThreatClass),
    /// The signature model calls it benign but the novelty model has never
    /// seen anything like it.
    ZeroDay,
}

impl Verdict {
    /// Every verdict other than `Normal` is surfaced.
    pub fn is_flagged(&self) -> bool {
        !matches!(self, Self::Normal)
    }

    /// Short stable key for counters and logs.
    pub fn key(&self) -> String {
        match self {
            Self::Normal => "normal".to_string(),
            Self::Attack(c) => c.as_str().to_string(),
            Self::Uncertain(c) => format!("uncertain:{c}"),
            Self::ZeroDay => "zeroday".to_string(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Attack(c) => write!(f, "ATTACK ({c})"),
            Self::Uncertain(c) => write!(f, "UNCERTAIN ({c})"),
            Self::ZeroDay => write!(f, "ZERO-DAY ANOMALY"),
        }
    }
}

/// Accepts the forms produced by [`Verdict::key`].
impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "zeroday" | "zero_day" | "zero-day" => Ok(Self::ZeroDay),
            other => match other.strip_prefix("uncertain:") {
                Some(class) => class.parse().map(Self::Uncertain),
                None => match other.parse::<ThreatClass>()? {
                    ThreatClass::Normal => Ok(Self::Normal),
                    class => Ok(Self::Attack(class)),
                },
            },
        }
    }
}

/// Everything the cascade concluded about one fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub verdict: Verdict,
    pub signature_label: ThreatClass,
    pub signature_confidence: f64,
    pub class_probabilities: BTreeMap<ThreatClass, f64>,
    pub novelty_flag: bool,
    pub novelty_score: f64,
    pub flagged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_normal_is_unflagged() {
        assert!(!Verdict::Normal.is_flagged());
        assert!(Verdict::ZeroDay.is_flagged());
        assert!(Verdict::Attack(ThreatClass::Blinding).is_flagged());
        assert!(Verdict::Uncertain(ThreatClass::Normal).is_flagged());
    }

    #[test]
    fn keys_parse_back() {
        let all = [
            Verdict::Normal,
            Verdict::ZeroDay,
            Verdict::Attack(ThreatClass::Intercept),
            Verdict::Attack(ThreatClass::TimeShift),
            Verdict::Uncertain(ThreatClass::Normal),
            Verdict::Uncertain(ThreatClass::Blinding),
        ];
        for v in all {
            assert_eq!(v.key().parse::<Verdict>().unwrap(), v);
        }
        assert_eq!("blinding".parse::<Verdict>().unwrap(), Verdict::Attack(ThreatClass::Blinding));
        assert!("meltdown".parse::<Verdict>().is_err());
    }

    #[test]
    fn serialized_shape() {
        let json = serde_json::to_value(Verdict::Attack(ThreatClass::Intercept)).unwrap();
        assert_eq!(json["kind"], "attack");
        assert_eq!(json["class"], "attack_intercept");
        let json = serde_json::to_value(Verdict::ZeroDay).unwrap();
        assert_eq!(json["kind"], "zero_day");
    }
}
