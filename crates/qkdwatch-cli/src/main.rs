//! CLI for qkdwatch — watch a simulated QKD link for eavesdroppers and detector tampering.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qkdwatch")]
#[command(about = "qkdwatch — photon-level QKD link monitor with a tamper-detection cascade")]
#[command(version = qkdwatch_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate the link and classify every sliding window as it fills
    Monitor {
        /// Baseline attack: none, intercept, timeshift, zeroday, or blinding
        #[arg(long, default_value = "none")]
        attack: String,

        /// Source intensity: single_photon or blinding
        #[arg(long)]
        intensity: Option<String>,

        /// Directory holding signature_model.json and novelty_model.json
        #[arg(long, default_value = "models")]
        models: PathBuf,

        /// JSON configuration file (missing fields take defaults)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many assessed windows (default: until Ctrl+C)
        #[arg(long)]
        windows: Option<u64>,

        /// Events between assessed windows once the window is full
        #[arg(long)]
        stride: Option<usize>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Record an audit session into this directory
        #[arg(long)]
        record: Option<PathBuf>,

        /// Transient scenario as MODE:TICKS@WINDOW, e.g. blinding:20000@10 (repeatable)
        #[arg(long)]
        inject: Vec<String>,

        /// Print one JSON report per line instead of the table
        #[arg(long)]
        json: bool,

        /// Free-form note stored with the audit session
        #[arg(long)]
        note: Option<String>,
    },

    /// Simulate each labelled scenario and fit the detection models
    Train {
        /// Output directory for the model artifacts
        #[arg(long, default_value = "models")]
        models: PathBuf,

        /// Windows sampled per class
        #[arg(long, default_value = "400")]
        windows_per_class: usize,

        /// Events between sampled windows
        #[arg(long, default_value = "50")]
        sample_stride: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// JSON configuration file (window size and physics used for training)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the forensic narrative for a verdict and its vitals
    Explain {
        /// normal, attack_intercept, attack_blinding, attack_timeshift,
        /// uncertain:<class>, or zeroday
        #[arg(long)]
        verdict: String,

        /// Detector bias voltage (V)
        #[arg(long, default_value = "3.3")]
        voltage: f64,

        /// Timing jitter (ns)
        #[arg(long, default_value = "1.2")]
        jitter: f64,

        /// Quantum bit error rate
        #[arg(long, default_value = "0.03")]
        qber: f64,
    },

    /// Run the monitor behind an HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "8042")]
        port: u16,

        #[arg(long, default_value = "models")]
        models: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "none")]
        attack: String,

        #[arg(long)]
        intensity: Option<String>,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor {
            attack,
            intensity,
            models,
            config,
            windows,
            stride,
            seed,
            record,
            inject,
            json,
            note,
        } => commands::monitor::run(commands::monitor::MonitorCommandConfig {
            attack: &attack,
            intensity: intensity.as_deref(),
            models_dir: &models,
            config_path: config.as_deref(),
            max_windows: windows,
            stride,
            seed,
            record_dir: record.as_deref(),
            injections: &inject,
            json,
            note: note.as_deref(),
        }),
        Commands::Train {
            models,
            windows_per_class,
            sample_stride,
            seed,
            config,
        } => commands::train::run(
            &models,
            windows_per_class,
            sample_stride,
            seed,
            config.as_deref(),
        ),
        Commands::Explain {
            verdict,
            voltage,
            jitter,
            qber,
        } => commands::explain::run(&verdict, voltage, jitter, qber),
        Commands::Serve {
            host,
            port,
            models,
            config,
            attack,
            intensity,
            seed,
        } => commands::serve::run(
            &host,
            port,
            &models,
            config.as_deref(),
            &attack,
            intensity.as_deref(),
            seed,
        ),
    }
}
