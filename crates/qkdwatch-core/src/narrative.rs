//! Deterministic forensic narrative for a verdict and the link vitals behind it.
//!
//! Same input, same text: there is no hidden state and no randomness. The
//! report grounds each verdict in the physical evidence an operator can check
//! on the hardware.

use serde::{Deserialize, Serialize};

use crate::cascade::{ThreatClass, Verdict};
use crate::detector::{NOMINAL_JITTER, NOMINAL_VOLTAGE};
use crate::window::Fingerprint;

/// QBER at which key generation must be aborted.
pub const ABORT_QBER: f64 = 0.11;

/// Calibrated QBER of a healthy link (channel depolarizing plus detector flips).
pub const NOISE_FLOOR_QBER: f64 = 0.04;

/// QBER signature of a full intercept-resend attack.
pub const INTERCEPT_QBER: f64 = 0.25;

const NEAR_CRITICAL_QBER: f64 = 0.08;
const CAUTION_QBER: f64 = 0.05;

/// Hardware readings quoted in a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Mean bias voltage (V).
    pub voltage: f64,
    /// Mean timing jitter (ns).
    pub jitter: f64,
    /// Overall sifted QBER.
    pub qber: f64,
}

impl From<&Fingerprint> for Vitals {
    fn from(f: &Fingerprint) -> Self {
        Self {
            voltage: f.voltage,
            jitter: f.jitter,
            qber: f.qber_overall,
        }
    }
}

fn pct(x: f64) -> String {
    format!("{:.2}%", x * 100.0)
}

fn class_section(class: ThreatClass, v: &Vitals, out: &mut Vec<String>) {
    match class {
        ThreatClass::Blinding => {
            out.push("CRITICAL THREAT: DETECTOR SATURATION".into());
            out.push("  Reasoning: saturation signature in the detector telemetry.".into());
            if v.voltage > 5.0 {
                out.push(format!(
                    "  - Evidence A: Voltage spike ({:.2} V). Detectors forced into linear mode (normal: ~{NOMINAL_VOLTAGE} V).",
                    v.voltage
                ));
            }
            if v.jitter < 0.2 {
                out.push(format!(
                    "  - Evidence B: Zero jitter ({:.2} ns). Signal is continuous-wave, not pulsed (normal: ~{NOMINAL_JITTER} ns).",
                    v.jitter
                ));
            }
            out.push("  -> Conclusion: the detectors are being blinded to force deterministic clicks.".into());
        }
        ThreatClass::TimeShift => {
            out.push("SOPHISTICATED THREAT: TIMING ANOMALY".into());
            out.push("  Reasoning: efficiency mismatch consistent with shifted arrival times.".into());
            if v.jitter < 0.5 {
                out.push(format!(
                    "  - Evidence A: Unnatural precision ({:.2} ns). Thermal jitter should exceed 1.0 ns.",
                    v.jitter
                ));
            }
            out.push("  -> Conclusion: pulses are being shifted onto the detector's gate edge.".into());
        }
        ThreatClass::Intercept => {
            out.push("QUANTUM THREAT: INTERCEPT-RESEND DETECTED".into());
            out.push("  Reasoning: QBER is elevated beyond the noise floor.".into());
            out.push(format!(
                "  - Evidence A: QBER = {} (calibrated noise floor: ~{}, intercept-resend signature: ~{}).",
                pct(v.qber),
                pct(NOISE_FLOOR_QBER),
                pct(INTERCEPT_QBER)
            ));
            out.push("  -> Conclusion: photons are being measured and re-prepared in transit.".into());
        }
        ThreatClass::Normal => {
            if v.qber > NEAR_CRITICAL_QBER {
                out.push("WARNING: NEAR-CRITICAL NOISE LEVELS".into());
                out.push(format!(
                    "  - Status: link is safe, but QBER ({}) is approaching the abort threshold ({}).",
                    pct(v.qber),
                    pct(ABORT_QBER)
                ));
                out.push("  - Action: check for eavesdropping attempts or fiber damage.".into());
            } else if v.qber > CAUTION_QBER {
                out.push("CAUTION: SUSPICIOUS ACTIVITY".into());
                out.push(format!(
                    "  - Status: QBER is elevated ({}). Likely dirty fiber connectors.",
                    pct(v.qber)
                ));
            } else {
                out.push("SYSTEM SECURE".into());
                out.push(format!(
                    "  - Status: nominal operation. QBER ({}) is within safety limits.",
                    pct(v.qber)
                ));
            }
        }
    }
}

/// Multi-line incident report for `verdict` given the window vitals.
pub fn forensic_report(verdict: &Verdict, vitals: &Vitals) -> String {
    let mut out = vec![format!("FORENSIC ANALYSIS: [{verdict}]")];

    let shown_class = match verdict {
        Verdict::Normal => Some(ThreatClass::Normal),
        Verdict::Attack(c) => Some(*c),
        Verdict::Uncertain(c) => {
            out.push(format!(
                "LOW CONFIDENCE: leading hypothesis is {c}; operator review required."
            ));
            Some(*c)
        }
        Verdict::ZeroDay => {
            out.push("ZERO-DAY ANOMALY: TELEMETRY MATCHES NO KNOWN SIGNATURE".into());
            out.push(
                "  Reasoning: the signature model leans benign but the telemetry lies outside every normal window seen in training."
                    .into(),
            );
            out.push(format!(
                "  - Voltage deviation: {:+.2} V from nominal {NOMINAL_VOLTAGE} V.",
                vitals.voltage - NOMINAL_VOLTAGE
            ));
            out.push(format!(
                "  - Jitter deviation: {:+.2} ns from nominal {NOMINAL_JITTER} ns.",
                vitals.jitter - NOMINAL_JITTER
            ));
            out.push(format!("  - QBER: {}.", pct(vitals.qber)));
            out.push("  -> Action: isolate the receiver and inspect the detector module.".into());
            None
        }
    };
    if let Some(class) = shown_class {
        class_section(class, vitals, &mut out);
    }

    let blinding = matches!(
        verdict,
        Verdict::Attack(ThreatClass::Blinding) | Verdict::Uncertain(ThreatClass::Blinding)
    );
    if !blinding && vitals.voltage > 5.0 && vitals.jitter > 1.0 {
        out.push(
            "ANOMALY: high voltage with normal jitter. Possible RF interference or device malfunction, not a blinding pattern."
                .into(),
        );
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vitals(voltage: f64, jitter: f64, qber: f64) -> Vitals {
        Vitals {
            voltage,
            jitter,
            qber,
        }
    }

    #[test]
    fn identical_input_identical_output() {
        let cases = [
            (Verdict::Normal, vitals(3.3, 1.2, 0.04)),
            (Verdict::Attack(ThreatClass::Blinding), vitals(9.0, 0.1, 0.01)),
            (Verdict::Attack(ThreatClass::TimeShift), vitals(3.3, 0.05, 0.03)),
            (Verdict::ZeroDay, vitals(6.5, 2.8, 0.03)),
        ];
        for (v, vit) in cases {
            assert_eq!(forensic_report(&v, &vit), forensic_report(&v, &vit));
        }
    }

    #[test]
    fn blinding_cites_voltage_and_jitter() {
        let r = forensic_report(&Verdict::Attack(ThreatClass::Blinding), &vitals(9.04, 0.09, 0.01));
        assert!(r.contains("attack_blinding"));
        assert!(r.contains("Evidence A") && r.contains("9.04"));
        assert!(r.contains("Evidence B") && r.contains("0.09"));
        assert!(!r.contains("ANOMALY: high voltage"));
    }

    #[test]
    fn intercept_quotes_qber() {
        let r = forensic_report(&Verdict::Attack(ThreatClass::Intercept), &vitals(3.3, 1.2, 0.25));
        assert!(r.contains("INTERCEPT-RESEND"));
        assert!(r.contains("25.00%"));
    }

    #[test]
    fn normal_severity_bands() {
        let secure = forensic_report(&Verdict::Normal, &vitals(3.3, 1.2, 0.03));
        assert!(secure.contains("SYSTEM SECURE"));
        let caution = forensic_report(&Verdict::Normal, &vitals(3.3, 1.2, 0.06));
        assert!(caution.contains("CAUTION"));
        let near = forensic_report(&Verdict::Normal, &vitals(3.3, 1.2, 0.09));
        assert!(near.contains("NEAR-CRITICAL"));
        assert!(near.contains("11.00%"));
    }

    #[test]
    fn zero_day_reports_deviation() {
        let r = forensic_report(&Verdict::ZeroDay, &vitals(6.5, 2.8, 0.03));
        assert!(r.contains("ZERO-DAY"));
        assert!(r.contains("+3.20 V"));
        assert!(r.contains("+1.60 ns"));
        assert!(r.contains("ANOMALY: high voltage"));
    }

    #[test]
    fn uncertain_requests_review() {
        let r = forensic_report(&Verdict::Uncertain(ThreatClass::TimeShift), &vitals(3.3, 0.05, 0.03));
        assert!(r.contains("operator review"));
        assert!(r.contains("TIMING ANOMALY"));
    }
}
