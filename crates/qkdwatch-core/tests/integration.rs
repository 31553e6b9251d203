//! Integration tests for qkdwatch-core.
//!
//! These tests drive the full pipeline:
//! stream → window → cascade → narrative / audit trail.

use std::collections::BTreeMap;

use qkdwatch_core::config::WindowConfig;
use qkdwatch_core::detector::gaussian;
use qkdwatch_core::training::{self, TrainingConfig};
use qkdwatch_core::{
    AttackMode, AuditConfig, AuditWriter, BoundaryModel, Cascade, CascadeConfig, Fingerprint,
    GaussianSignatureModel, IdsConfig, Injection, IntensityMode, Monitor, NoveltyModel, Scenario,
    SignatureModel, ThreatClass, Verdict, Vitals, WindowReport, forensic_report,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

const CLUSTER_STD: [f64; 6] = [0.01, 0.015, 0.015, 0.15, 0.05, 0.01];

fn cluster(rng: &mut StdRng, mean: [f64; 6], n: usize) -> Vec<Fingerprint> {
    (0..n)
        .map(|_| {
            let mut v = mean;
            for (x, s) in v.iter_mut().zip(CLUSTER_STD) {
                *x = gaussian(rng, *x, s);
            }
            Fingerprint::from_array(v)
        })
        .collect()
}

/// Models fitted on synthetic clusters around each class's physical signature.
fn synthetic_models() -> (GaussianSignatureModel, BoundaryModel) {
    let mut rng = StdRng::seed_from_u64(2024);
    let specs = [
        (ThreatClass::Normal, [0.04, 0.04, 0.04, 3.3, 1.2, 0.25]),
        (ThreatClass::Intercept, [0.25, 0.25, 0.25, 3.3, 1.2, 0.25]),
        (ThreatClass::Blinding, [0.0, 0.0, 0.0, 9.0, 0.1, 0.1]),
        (ThreatClass::TimeShift, [0.04, 0.04, 0.04, 3.3, 0.05, 0.15]),
    ];
    let mut labelled = Vec::new();
    let mut normal = Vec::new();
    for (class, mean) in specs {
        let samples = cluster(&mut rng, mean, 300);
        if class == ThreatClass::Normal {
            normal.extend_from_slice(&samples);
        }
        labelled.extend(samples.into_iter().map(|f| (f, class)));
    }
    (
        GaussianSignatureModel::fit(&labelled).unwrap(),
        BoundaryModel::fit(&normal, 0.01).unwrap(),
    )
}

fn synthetic_cascade() -> Cascade {
    let (signature, novelty) = synthetic_models();
    Cascade::new(Box::new(signature), Box::new(novelty), CascadeConfig::default())
}

fn small_config() -> IdsConfig {
    IdsConfig {
        window: WindowConfig {
            size: 100,
            report_stride: 25,
        },
        ..IdsConfig::default()
    }
}

/// Cascade trained from simulated windows, shared by the pipeline tests.
fn simulated_cascade(config: &IdsConfig) -> Cascade {
    let models = training::train(
        config,
        &TrainingConfig {
            windows_per_class: 80,
            sample_stride: 25,
            seed: 7,
            ..TrainingConfig::default()
        },
    )
    .unwrap();
    Cascade::new(
        Box::new(models.signature),
        Box::new(models.novelty),
        config.cascade,
    )
}

fn collect_reports(monitor: &mut Monitor, n: usize) -> Vec<WindowReport> {
    let mut reports = Vec::with_capacity(n);
    while reports.len() < n {
        if let Some(r) = monitor.step() {
            reports.push(r);
        }
    }
    reports
}

fn share(reports: &[WindowReport], verdict: Verdict) -> f64 {
    reports.iter().filter(|r| r.verdict == verdict).count() as f64 / reports.len() as f64
}

// ---------------------------------------------------------------------------
// Reference fingerprints
// ---------------------------------------------------------------------------

#[test]
fn intercept_fingerprint_is_an_intercept_attack() {
    let cascade = synthetic_cascade();
    let f = Fingerprint {
        qber_overall: 0.25,
        qber_rectilinear: 0.25,
        qber_diagonal: 0.25,
        voltage: 3.3,
        jitter: 1.2,
        count_rate: 0.25,
    };
    let a = cascade.assess(&f);
    assert_eq!(a.verdict, Verdict::Attack(ThreatClass::Intercept));
    assert!(a.flagged);
    assert!(a.signature_confidence >= 0.70);
}

#[test]
fn saturated_fingerprint_is_a_blinding_attack() {
    let cascade = synthetic_cascade();
    let f = Fingerprint {
        qber_overall: 0.0,
        qber_rectilinear: 0.0,
        qber_diagonal: 0.0,
        voltage: 9.0,
        jitter: 0.1,
        count_rate: 0.1,
    };
    assert_eq!(cascade.assess(&f).verdict, Verdict::Attack(ThreatClass::Blinding));
}

#[test]
fn nominal_fingerprint_is_normal() {
    let cascade = synthetic_cascade();
    let f = Fingerprint::from_array([0.04, 0.04, 0.04, 3.3, 1.2, 0.25]);
    let a = cascade.assess(&f);
    assert_eq!(a.verdict, Verdict::Normal);
    assert!(!a.novelty_flag);
    assert!(!a.flagged);
}

struct CoinFlipNormal;

impl SignatureModel for CoinFlipNormal {
    fn predict_proba(&self, _: &Fingerprint) -> BTreeMap<ThreatClass, f64> {
        BTreeMap::from([
            (ThreatClass::Normal, 0.5),
            (ThreatClass::Intercept, 0.2),
            (ThreatClass::Blinding, 0.2),
            (ThreatClass::TimeShift, 0.1),
        ])
    }
}

#[test]
fn unseen_telemetry_called_normal_is_zero_day() {
    let (_, novelty) = synthetic_models();
    let far = Fingerprint::from_array([0.04, 0.04, 0.04, 6.5, 2.8, 0.25]);
    assert!(novelty.is_outlier(&far));

    let cascade = Cascade::new(Box::new(CoinFlipNormal), Box::new(novelty), CascadeConfig::default());
    let a = cascade.assess(&far);
    assert_eq!(a.verdict, Verdict::ZeroDay);
    assert_eq!(a.signature_label, ThreatClass::Normal);
    assert!(a.novelty_flag && a.flagged);

    // the same low-confidence call inside the boundary is only uncertain
    let near = Fingerprint::from_array([0.04, 0.04, 0.04, 3.3, 1.2, 0.25]);
    assert_eq!(cascade.assess(&near).verdict, Verdict::Uncertain(ThreatClass::Normal));
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

#[test]
fn simulated_links_are_classified() {
    let config = small_config();

    let mut normal = Monitor::new(&config, simulated_cascade(&config), Scenario::NORMAL, Some(11));
    let reports = collect_reports(&mut normal, 40);
    assert!(share(&reports, Verdict::Normal) > 0.7, "normal share too low");
    for r in &reports {
        assert!(r.fingerprint.is_finite());
        assert!((0.0..=1.0).contains(&r.vitals.qber));
        assert_eq!(r.flagged, r.verdict != Verdict::Normal);
    }

    let intercept = Scenario::new(AttackMode::Intercept, IntensityMode::SinglePhoton);
    let mut attacked = Monitor::new(&config, simulated_cascade(&config), intercept, Some(12));
    let reports = collect_reports(&mut attacked, 40);
    assert!(
        share(&reports, Verdict::Attack(ThreatClass::Intercept)) > 0.7,
        "intercept share too low"
    );
}

#[test]
fn simulated_timeshift_is_classified() {
    let config = small_config();
    let timeshift = Scenario::new(AttackMode::TimeShift, IntensityMode::SinglePhoton);
    let mut monitor = Monitor::new(&config, simulated_cascade(&config), timeshift, Some(15));
    let reports = collect_reports(&mut monitor, 40);
    assert!(
        share(&reports, Verdict::Attack(ThreatClass::TimeShift)) > 0.7,
        "timeshift share too low"
    );
    assert!(reports.iter().all(|r| r.vitals.jitter < 0.2));
}

#[test]
fn simulated_zero_day_is_escalated() {
    let config = small_config();
    let zero_day = Scenario::new(AttackMode::ZeroDay, IntensityMode::SinglePhoton);
    let mut monitor = Monitor::new(&config, simulated_cascade(&config), zero_day, Some(16));
    let reports = collect_reports(&mut monitor, 40);
    for r in &reports {
        assert!(r.flagged, "window {} passed as {}", r.sequence, r.verdict);
        assert!(r.novelty_flag);
        assert!(r.signature_confidence < 0.70);
    }
    assert!(share(&reports, Verdict::ZeroDay) > 0.7, "zero-day share too low");
}

#[test]
fn drifting_blinding_telemetry_is_uncertain() {
    let config = small_config();
    let models = training::train(
        &config,
        &TrainingConfig {
            windows_per_class: 80,
            sample_stride: 25,
            seed: 7,
            ..TrainingConfig::default()
        },
    )
    .unwrap();
    let blinding = models
        .signature
        .classes
        .iter()
        .find(|c| c.class == ThreatClass::Blinding)
        .unwrap();
    let mut v: [f64; 6] = blinding.mean.clone().try_into().unwrap();

    // walk the voltage up until the blinding class barely explains it
    let target = models.signature.support_floor / 5.0;
    let mut f = Fingerprint::from_array(v);
    while models.signature.class_support(&f)[&ThreatClass::Blinding] > target {
        v[3] += 0.01;
        f = Fingerprint::from_array(v);
    }

    let cascade = Cascade::new(
        Box::new(models.signature),
        Box::new(models.novelty),
        config.cascade,
    );
    let a = cascade.assess(&f);
    assert_eq!(a.verdict, Verdict::Uncertain(ThreatClass::Blinding));
    assert!(a.signature_confidence < 0.70);
    assert!(a.flagged);
}

#[test]
fn injected_blinding_is_detected_then_clears() {
    let config = small_config();
    let mut monitor = Monitor::new(&config, simulated_cascade(&config), Scenario::NORMAL, Some(13));
    collect_reports(&mut monitor, 5);

    // enough ticks for several full windows of blinded clicks
    monitor
        .injector()
        .inject(Injection {
            scenario: Scenario::BLINDING,
            events: 5_000,
        })
        .unwrap();
    let during = collect_reports(&mut monitor, 8);
    let last = during.last().unwrap();
    assert_eq!(last.verdict, Verdict::Attack(ThreatClass::Blinding));
    assert!(last.vitals.voltage > 8.0);

    let after = collect_reports(&mut monitor, 20);
    assert_eq!(after.last().unwrap().scenario, Scenario::NORMAL);
    assert_ne!(after.last().unwrap().verdict, Verdict::Attack(ThreatClass::Blinding));
}

#[test]
fn reports_feed_narrative_and_audit() {
    let config = small_config();
    let mut monitor = Monitor::new(&config, synthetic_cascade(), Scenario::BLINDING, Some(14));
    let reports = collect_reports(&mut monitor, 3);

    let text = forensic_report(&reports[0].verdict, &reports[0].vitals);
    assert!(text.starts_with("FORENSIC ANALYSIS"));
    assert_eq!(
        text,
        forensic_report(&reports[0].verdict, &Vitals::from(&reports[0].fingerprint))
    );

    let tmp = tempfile::tempdir().unwrap();
    let mut writer = AuditWriter::new(AuditConfig {
        output_dir: tmp.path().to_path_buf(),
        scenario: Scenario::BLINDING,
        config,
        ..AuditConfig::default()
    })
    .unwrap();
    for r in &reports {
        writer.record(r).unwrap();
    }
    let dir = writer.finish().unwrap();
    let lines = std::fs::read_to_string(dir.join("reports.jsonl")).unwrap();
    assert_eq!(lines.lines().count(), 3);
    assert!(dir.join("session.json").exists());
}
