//! `qkdwatch monitor` — run the link and print a verdict per assessed window.

use std::iter::Peekable;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::vec::IntoIter;

use tokio::sync::mpsc;

use qkdwatch_core::training::{NOVELTY_FILE, SIGNATURE_FILE};
use qkdwatch_core::{
    AuditConfig, AuditWriter, Injection, InjectionHandle, Monitor, Verdict, WindowReport,
    forensic_report,
};

use super::{ScheduledInjection, parse_injection};

const REPORT_BUFFER: usize = 256;

pub struct MonitorCommandConfig<'a> {
    pub attack: &'a str,
    pub intensity: Option<&'a str>,
    pub models_dir: &'a Path,
    pub config_path: Option<&'a Path>,
    pub max_windows: Option<u64>,
    pub stride: Option<usize>,
    pub seed: Option<u64>,
    pub record_dir: Option<&'a Path>,
    pub injections: &'a [String],
    pub json: bool,
    pub note: Option<&'a str>,
}

/// Run the monitor command.
pub fn run(cmd: MonitorCommandConfig<'_>) {
    let mut config = super::load_config(cmd.config_path);
    if let Some(stride) = cmd.stride {
        config.window.report_stride = stride;
    }
    let scenario = super::parse_scenario(cmd.attack, cmd.intensity);

    let mut schedule: Vec<ScheduledInjection> = cmd
        .injections
        .iter()
        .map(|s| {
            parse_injection(s).unwrap_or_else(|e| {
                log::error!("{e}");
                std::process::exit(1);
            })
        })
        .collect();
    schedule.sort_by_key(|s| s.after_window);

    let cascade = super::load_cascade(cmd.models_dir, &config);
    let monitor = Monitor::new(&config, cascade, scenario, cmd.seed);
    let injector = monitor.injector();

    let mut writer = cmd.record_dir.map(|dir| {
        AuditWriter::new(AuditConfig {
            output_dir: dir.to_path_buf(),
            scenario,
            config,
            seed: cmd.seed,
            model_paths: vec![
                cmd.models_dir.join(SIGNATURE_FILE),
                cmd.models_dir.join(NOVELTY_FILE),
            ],
            note: cmd.note.map(str::to_string),
        })
        .unwrap_or_else(|e| {
            log::error!("could not create audit session: {e}");
            std::process::exit(1);
        })
    });

    if !cmd.json {
        println!("qkdwatch monitor v{}", qkdwatch_core::VERSION);
        println!("  Baseline:  {scenario}");
        println!(
            "  Window:    {} events, stride {}",
            config.window.size, config.window.report_stride
        );
        match cmd.max_windows {
            Some(n) => println!("  Windows:   {n}"),
            None => println!("  Windows:   until Ctrl+C"),
        }
        for s in &schedule {
            println!(
                "  Inject:    {} for {} ticks after window {}",
                s.scenario, s.ticks, s.after_window
            );
        }
        if let Some(w) = &writer {
            println!("  Recording: {}", w.session_dir().display());
        }
        println!();
    }

    let stop = super::install_stop_handler();
    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        log::error!("could not start runtime: {e}");
        std::process::exit(1);
    });

    let summary = rt.block_on(async {
        let (tx, mut rx) = mpsc::channel(REPORT_BUFFER);
        let loop_stop = Arc::clone(&stop);
        let task = tokio::spawn(async move {
            let mut monitor = monitor;
            monitor.run(tx, loop_stop).await
        });

        let mut pending = schedule.into_iter().peekable();
        fire_due(&mut pending, &injector, 0);

        let mut last_verdict = None;
        while let Some(report) = rx.recv().await {
            if cmd.json {
                match serde_json::to_string(&report) {
                    Ok(line) => println!("{line}"),
                    Err(e) => log::warn!("could not serialize report {}: {e}", report.sequence),
                }
            } else {
                print_report(&report, last_verdict);
            }
            last_verdict = Some(report.verdict);

            if let Some(w) = writer.as_mut() {
                if let Err(e) = w.record(&report) {
                    log::error!("audit write failed: {e}");
                    break;
                }
            }

            fire_due(&mut pending, &injector, report.sequence);
            if cmd.max_windows.is_some_and(|n| report.sequence >= n) {
                break;
            }
        }
        stop.store(true, Ordering::SeqCst);
        drop(rx);
        task.await
    });

    let summary = match summary {
        Ok(s) => s,
        Err(e) => {
            log::error!("monitor task failed: {e}");
            std::process::exit(1);
        }
    };

    if !cmd.json {
        println!();
        println!(
            "{} ticks, {} events, {} windows assessed, {} reports dropped",
            summary.ticks, summary.events, summary.windows, summary.dropped
        );
        for (verdict, count) in &summary.verdict_counts {
            println!("  {verdict:<24} {count}");
        }
    }

    if let Some(w) = writer {
        match w.finish() {
            Ok(dir) => {
                if !cmd.json {
                    println!();
                    println!("Session saved to {}", dir.display());
                    println!("  session.json   — metadata");
                    println!("  reports.jsonl  — one window report per line");
                }
            }
            Err(e) => {
                log::error!("could not finalize audit session: {e}");
                std::process::exit(1);
            }
        }
    }
}

/// Send every scheduled injection whose window has been reached.
fn fire_due(
    pending: &mut Peekable<IntoIter<ScheduledInjection>>,
    injector: &InjectionHandle,
    windows: u64,
) {
    while let Some(next) = pending.next_if(|s| s.after_window <= windows) {
        let injection = Injection {
            scenario: next.scenario,
            events: next.ticks,
        };
        if let Err(e) = injector.inject(injection) {
            log::warn!("injection {} dropped: {e}", next.scenario);
        }
    }
}

fn print_report(report: &WindowReport, previous: Option<Verdict>) {
    let marker = if report.flagged { "!" } else { " " };
    println!(
        "{marker}[{:>5}] tick {:>9}  {:<18} {:<22} p={:.2}  QBER {:.4}  V {:.2}  J {:.2}",
        report.sequence,
        report.tick,
        report.scenario.to_string(),
        report.verdict.to_string(),
        report.signature_confidence,
        report.vitals.qber,
        report.vitals.voltage,
        report.vitals.jitter,
    );
    if report.flagged && previous != Some(report.verdict) {
        println!();
        for line in forensic_report(&report.verdict, &report.vitals).lines() {
            println!("    {line}");
        }
        println!();
    }
}
