//! Audit trail for monitoring sessions.
//!
//! Every assessed window can be appended to an on-disk session so that an
//! incident can be reconstructed after the fact.
//!
//! # Storage Format
//!
//! Each session is a directory `<timestamp>-<scenario>/` containing:
//! - `reports.jsonl` — one [`WindowReport`] per line, flushed per write
//! - `session.json` — metadata written by [`AuditWriter::finish`] (timing,
//!   scenario, configuration, verdict counts, model artifact digests)

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::IdsConfig;
use crate::monitor::WindowReport;
use crate::stream::Scenario;

/// Format version of `session.json`.
pub const AUDIT_FORMAT_VERSION: u32 = 1;

/// SHA-256 of a model artifact in use during the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub path: String,
    pub sha256: String,
}

/// Contents of `session.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditMeta {
    pub version: u32,
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    pub scenario: String,
    pub seed: Option<u64>,
    pub config: IdsConfig,
    pub windows: u64,
    pub flagged: u64,
    pub verdict_counts: BTreeMap<String, u64>,
    pub models: Vec<ArtifactDigest>,
    pub note: Option<String>,
    pub qkdwatch_version: String,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub output_dir: PathBuf,
    pub scenario: Scenario,
    pub config: IdsConfig,
    pub seed: Option<u64>,
    /// Artifacts to fingerprint into the session metadata.
    pub model_paths: Vec<PathBuf>,
    pub note: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("sessions"),
            scenario: Scenario::NORMAL,
            config: IdsConfig::default(),
            seed: None,
            model_paths: Vec::new(),
            note: None,
        }
    }
}

/// Incremental writer for one audit session.
pub struct AuditWriter {
    session_dir: PathBuf,
    reports: BufWriter<File>,
    windows: u64,
    flagged: u64,
    verdict_counts: BTreeMap<String, u64>,
    models: Vec<ArtifactDigest>,
    started_at: SystemTime,
    started_instant: Instant,
    session_id: String,
    config: AuditConfig,
}

impl AuditWriter {
    /// Create the session directory and `reports.jsonl`, hashing the model
    /// artifacts up front so the digests describe what was actually loaded.
    pub fn new(config: AuditConfig) -> std::io::Result<Self> {
        let models = config
            .model_paths
            .iter()
            .map(|p| file_digest(p))
            .collect::<std::io::Result<Vec<_>>>()?;

        let started_at = SystemTime::now();
        let since_epoch = started_at.duration_since(UNIX_EPOCH).unwrap_or_default();
        let slug = config.scenario.to_string().replace('+', "-");
        let session_dir = config
            .output_dir
            .join(format!("{}-{slug}", compact_timestamp(since_epoch)));
        fs::create_dir_all(&session_dir)?;

        let reports = BufWriter::new(File::create(session_dir.join("reports.jsonl"))?);

        Ok(Self {
            session_dir,
            reports,
            windows: 0,
            flagged: 0,
            verdict_counts: BTreeMap::new(),
            models,
            started_at,
            started_instant: Instant::now(),
            session_id: Uuid::new_v4().to_string(),
            config,
        })
    }

    /// Append one report as a JSON line.
    pub fn record(&mut self, report: &WindowReport) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.reports, report).map_err(std::io::Error::other)?;
        self.reports.write_all(b"\n")?;
        self.reports.flush()?;

        self.windows += 1;
        if report.flagged {
            self.flagged += 1;
        }
        *self
            .verdict_counts
            .entry(report.verdict.key())
            .or_insert(0) += 1;
        Ok(())
    }

    /// Write `session.json` and return the session directory.
    pub fn finish(mut self) -> std::io::Result<PathBuf> {
        self.reports.flush()?;

        let ended_at = SystemTime::now();
        let meta = AuditMeta {
            version: AUDIT_FORMAT_VERSION,
            id: self.session_id,
            started_at: iso8601(self.started_at.duration_since(UNIX_EPOCH).unwrap_or_default()),
            ended_at: iso8601(ended_at.duration_since(UNIX_EPOCH).unwrap_or_default()),
            duration_ms: self.started_instant.elapsed().as_millis() as u64,
            scenario: self.config.scenario.to_string(),
            seed: self.config.seed,
            config: self.config.config,
            windows: self.windows,
            flagged: self.flagged,
            verdict_counts: self.verdict_counts,
            models: self.models,
            note: self.config.note,
            qkdwatch_version: crate::VERSION.to_string(),
        };

        let json = serde_json::to_string_pretty(&meta).map_err(std::io::Error::other)?;
        fs::write(self.session_dir.join("session.json"), json)?;
        log::info!(
            "audit session {} closed: {} windows, {} flagged",
            meta.id,
            meta.windows,
            meta.flagged
        );
        Ok(self.session_dir)
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn windows(&self) -> u64 {
        self.windows
    }

    pub fn elapsed(&self) -> Duration {
        self.started_instant.elapsed()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn file_digest(path: &Path) -> std::io::Result<ArtifactDigest> {
    let bytes = fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    let sha256 = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(ArtifactDigest {
        path: path.display().to_string(),
        sha256,
    })
}

/// Civil date from days since 1970-01-01 (proleptic Gregorian).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn utc_parts(since_epoch: Duration) -> (i64, u32, u32, u64, u64, u64) {
    let secs = since_epoch.as_secs();
    let (y, mo, d) = civil_from_days((secs / 86_400) as i64);
    let rem = secs % 86_400;
    (y, mo, d, rem / 3600, (rem / 60) % 60, rem % 60)
}

/// `2026-10-19T08:15:00Z`
fn iso8601(since_epoch: Duration) -> String {
    let (y, mo, d, h, mi, s) = utc_parts(since_epoch);
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
}

/// `2026-10-19T081500Z`, safe in directory names.
fn compact_timestamp(since_epoch: Duration) -> String {
    let (y, mo, d, h, mi, s) = utc_parts(since_epoch);
    format!("{y:04}-{mo:02}-{d:02}T{h:02}{mi:02}{s:02}Z")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{ThreatClass, Verdict};
    use crate::narrative::Vitals;
    use crate::window::Fingerprint;

    fn report(sequence: u64, verdict: Verdict) -> WindowReport {
        WindowReport {
            sequence,
            tick: sequence * 100,
            scenario: Scenario::NORMAL,
            verdict,
            signature_label: ThreatClass::Normal,
            signature_confidence: 0.9,
            class_probabilities: BTreeMap::from([(ThreatClass::Normal, 0.9), (ThreatClass::Blinding, 0.1)]),
            novelty_flag: false,
            novelty_score: 0.5,
            flagged: verdict.is_flagged(),
            vitals: Vitals {
                voltage: 3.3,
                jitter: 1.2,
                qber: 0.03,
            },
            fingerprint: Fingerprint::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Timestamp formatting
    // -----------------------------------------------------------------------

    #[test]
    fn epoch_formats() {
        assert_eq!(iso8601(Duration::ZERO), "1970-01-01T00:00:00Z");
        assert_eq!(compact_timestamp(Duration::ZERO), "1970-01-01T000000Z");
    }

    #[test]
    fn known_dates() {
        assert_eq!(iso8601(Duration::from_secs(946_684_800)), "2000-01-01T00:00:00Z");
        // leap day
        assert_eq!(iso8601(Duration::from_secs(951_782_400)), "2000-02-29T00:00:00Z");
        assert_eq!(iso8601(Duration::from_secs(1_709_251_199)), "2024-02-29T23:59:59Z");
    }

    // -----------------------------------------------------------------------
    // Writer
    // -----------------------------------------------------------------------

    #[test]
    fn writes_reports_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let model = tmp.path().join("signature_model.json");
        std::fs::write(&model, b"{}").unwrap();

        let mut writer = AuditWriter::new(AuditConfig {
            output_dir: tmp.path().to_path_buf(),
            scenario: Scenario::BLINDING,
            seed: Some(7),
            model_paths: vec![model],
            ..Default::default()
        })
        .unwrap();
        assert!(writer.session_dir().join("reports.jsonl").exists());
        assert!(writer.session_dir().to_string_lossy().ends_with("-blinding"));

        writer.record(&report(1, Verdict::Normal)).unwrap();
        writer.record(&report(2, Verdict::Attack(ThreatClass::Blinding))).unwrap();
        writer.record(&report(3, Verdict::Attack(ThreatClass::Blinding))).unwrap();
        assert_eq!(writer.windows(), 3);

        let dir = writer.finish().unwrap();
        let lines = std::fs::read_to_string(dir.join("reports.jsonl")).unwrap();
        let parsed: Vec<WindowReport> = lines
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].verdict, Verdict::Attack(ThreatClass::Blinding));

        let meta: AuditMeta =
            serde_json::from_str(&std::fs::read_to_string(dir.join("session.json")).unwrap()).unwrap();
        assert_eq!(meta.version, AUDIT_FORMAT_VERSION);
        assert_eq!(meta.windows, 3);
        assert_eq!(meta.flagged, 2);
        assert_eq!(meta.verdict_counts.get("attack_blinding"), Some(&2));
        assert_eq!(meta.scenario, "blinding");
        assert_eq!(meta.seed, Some(7));
        assert_eq!(meta.models.len(), 1);
        // sha256("{}")
        assert_eq!(
            meta.models[0].sha256,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
        assert!(Uuid::parse_str(&meta.id).is_ok());
    }

    #[test]
    fn missing_model_artifact_fails_early() {
        let tmp = tempfile::tempdir().unwrap();
        let result = AuditWriter::new(AuditConfig {
            output_dir: tmp.path().to_path_buf(),
            model_paths: vec![tmp.path().join("absent.json")],
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
