//! `qkdwatch train` — fit the signature and novelty models from simulation.

use std::path::Path;
use std::time::Instant;

use qkdwatch_core::training::{self, TRAINING_SCENARIOS, TrainingConfig};

pub fn run(
    models_dir: &Path,
    windows_per_class: usize,
    sample_stride: usize,
    seed: u64,
    config_path: Option<&Path>,
) {
    let config = super::load_config(config_path);
    let training = TrainingConfig {
        windows_per_class,
        sample_stride,
        seed,
        ..TrainingConfig::default()
    };

    println!("Training qkdwatch models");
    println!("  Window:    {} events", config.window.size);
    println!("  Samples:   {windows_per_class} windows per class, stride {sample_stride}");
    println!("  Seed:      {seed}");
    for (class, scenario) in &TRAINING_SCENARIOS {
        println!("  {:<18} ← {scenario}", class.as_str());
    }
    println!();

    let start = Instant::now();
    let models = training::train(&config, &training).unwrap_or_else(|e| {
        log::error!("training failed: {e}");
        std::process::exit(1);
    });

    match models.save(models_dir) {
        Ok((signature, novelty)) => {
            println!("Models saved in {:.1}s", start.elapsed().as_secs_f64());
            println!("  {}", signature.display());
            println!("  {}", novelty.display());
        }
        Err(e) => {
            log::error!("could not write models to {}: {e}", models_dir.display());
            std::process::exit(1);
        }
    }
}
