//! Real-time monitor: stream → window → cascade, one photon per tick.
//!
//! [`Monitor::step`] runs exactly one tick and is fully synchronous.
//! [`Monitor::run`] wraps it in a cooperative async loop that yields to the
//! runtime after every tick, delivers reports without ever waiting on the
//! consumer and checks a stop flag once per tick.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::cascade::{Cascade, ThreatClass, Verdict};
use crate::config::IdsConfig;
use crate::narrative::Vitals;
use crate::stream::{EventStream, InjectionHandle, Scenario};
use crate::window::{EventWindow, Fingerprint};

/// Result record for one assessed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    /// 1-based index of the assessed window in this session.
    pub sequence: u64,
    /// Stream tick at which the window was assessed.
    pub tick: u64,
    /// Scenario in force on that tick.
    pub scenario: Scenario,
    pub verdict: Verdict,
    pub signature_label: ThreatClass,
    pub signature_confidence: f64,
    pub class_probabilities: BTreeMap<ThreatClass, f64>,
    pub novelty_flag: bool,
    pub novelty_score: f64,
    pub flagged: bool,
    pub vitals: Vitals,
    pub fingerprint: Fingerprint,
}

/// Counters at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub ticks: u64,
    pub events: u64,
    pub windows: u64,
    pub dropped: u64,
    pub verdict_counts: BTreeMap<String, u64>,
}

/// Live counters readable from other tasks while the loop owns the monitor.
#[derive(Debug, Default)]
pub struct MonitorStats {
    ticks: AtomicU64,
    events: AtomicU64,
    windows: AtomicU64,
    dropped: AtomicU64,
}

impl MonitorStats {
    /// Counters only; verdict counts stay with the monitor.
    pub fn snapshot(&self) -> MonitorSummary {
        MonitorSummary {
            ticks: self.ticks.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            windows: self.windows.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            verdict_counts: BTreeMap::new(),
        }
    }
}

pub struct Monitor {
    stream: EventStream,
    window: EventWindow,
    cascade: Cascade,
    stride: usize,
    since_report: usize,
    windows: u64,
    dropped: u64,
    verdict_counts: BTreeMap<String, u64>,
    last_verdict: Option<Verdict>,
    stats: Arc<MonitorStats>,
}

impl Monitor {
    pub fn new(config: &IdsConfig, cascade: Cascade, baseline: Scenario, seed: Option<u64>) -> Self {
        let stream = EventStream::new(config.physics.stream_config(), baseline, seed);
        Self::from_parts(
            stream,
            EventWindow::new(config.window.size),
            cascade,
            config.window.report_stride,
        )
    }

    pub fn from_parts(stream: EventStream, window: EventWindow, cascade: Cascade, stride: usize) -> Self {
        let stride = stride.max(1);
        Self {
            stream,
            window,
            cascade,
            stride,
            // the first full window is always assessed
            since_report: stride - 1,
            windows: 0,
            dropped: 0,
            verdict_counts: BTreeMap::new(),
            last_verdict: None,
            stats: Arc::new(MonitorStats::default()),
        }
    }

    pub fn injector(&self) -> InjectionHandle {
        self.stream.injector()
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    pub fn window(&self) -> &EventWindow {
        &self.window
    }

    pub fn stats(&self) -> Arc<MonitorStats> {
        Arc::clone(&self.stats)
    }

    pub fn summary(&self) -> MonitorSummary {
        MonitorSummary {
            ticks: self.stream.ticks(),
            events: self.stream.events(),
            windows: self.windows,
            dropped: self.dropped,
            verdict_counts: self.verdict_counts.clone(),
        }
    }

    /// Run one photon tick. Returns a report when a full window was assessed.
    pub fn step(&mut self) -> Option<WindowReport> {
        let scenario = self.stream.active_scenario();
        self.window.tick();
        let event = self.stream.step();
        self.stats.ticks.store(self.stream.ticks(), Ordering::Relaxed);
        let event = event?;
        self.stats.events.store(self.stream.events(), Ordering::Relaxed);
        self.window.push(event);
        if !self.window.is_ready() {
            return None;
        }

        self.since_report += 1;
        if self.since_report < self.stride {
            return None;
        }
        self.since_report = 0;

        let fingerprint = self.window.extract_features()?;
        let assessment = self.cascade.assess(&fingerprint);
        self.windows += 1;
        self.stats.windows.store(self.windows, Ordering::Relaxed);
        *self
            .verdict_counts
            .entry(assessment.verdict.key())
            .or_insert(0) += 1;

        let vitals = Vitals::from(&fingerprint);
        self.log_verdict(assessment.verdict, &vitals);

        Some(WindowReport {
            sequence: self.windows,
            tick: self.stream.ticks(),
            scenario,
            verdict: assessment.verdict,
            signature_label: assessment.signature_label,
            signature_confidence: assessment.signature_confidence,
            class_probabilities: assessment.class_probabilities,
            novelty_flag: assessment.novelty_flag,
            novelty_score: assessment.novelty_score,
            flagged: assessment.flagged,
            vitals,
            fingerprint,
        })
    }

    fn log_verdict(&mut self, verdict: Verdict, vitals: &Vitals) {
        log::debug!(
            "window {}: {verdict} (V={:.2}, J={:.2}, QBER={:.4})",
            self.windows,
            vitals.voltage,
            vitals.jitter,
            vitals.qber
        );
        if self.last_verdict == Some(verdict) {
            return;
        }
        match verdict {
            Verdict::Normal => log::debug!("window {}: link nominal", self.windows),
            Verdict::ZeroDay => log::warn!(
                "window {}: ZERO-DAY anomaly (V={:.2}, J={:.2})",
                self.windows,
                vitals.voltage,
                vitals.jitter
            ),
            Verdict::Uncertain(c) => log::warn!(
                "window {}: uncertain classification, leaning {c}; operator review required",
                self.windows
            ),
            Verdict::Attack(c) => log::warn!(
                "window {}: attack detected: {c} (QBER={:.4})",
                self.windows,
                vitals.qber
            ),
        }
        self.last_verdict = Some(verdict);
    }

    /// Cooperative loop until `stop` is set or the consumer goes away.
    pub async fn run(&mut self, sink: mpsc::Sender<WindowReport>, stop: Arc<AtomicBool>) -> MonitorSummary {
        while !stop.load(Ordering::Relaxed) {
            if let Some(report) = self.step() {
                match sink.try_send(report) {
                    Ok(()) => {}
                    Err(TrySendError::Full(report)) => {
                        self.dropped += 1;
                        self.stats.dropped.store(self.dropped, Ordering::Relaxed);
                        log::debug!("consumer busy, dropped report {}", report.sequence);
                    }
                    Err(TrySendError::Closed(_)) => {
                        log::info!("report consumer closed, stopping monitor");
                        break;
                    }
                }
            }
            tokio::task::yield_now().await;
        }
        let summary = self.summary();
        log::info!(
            "monitor stopped: {} ticks, {} events, {} windows, {} dropped",
            summary.ticks,
            summary.events,
            summary.windows,
            summary.dropped
        );
        summary
    }
}
