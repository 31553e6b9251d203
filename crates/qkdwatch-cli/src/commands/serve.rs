use std::path::Path;

use qkdwatch_core::Monitor;

pub fn run(
    host: &str,
    port: u16,
    models_dir: &Path,
    config_path: Option<&Path>,
    attack: &str,
    intensity: Option<&str>,
    seed: Option<u64>,
) {
    let config = super::load_config(config_path);
    let scenario = super::parse_scenario(attack, intensity);
    let cascade = super::load_cascade(models_dir, &config);
    let monitor = Monitor::new(&config, cascade, scenario, seed);

    let base = format!("http://{host}:{port}");
    println!("qkdwatch server v{}", qkdwatch_core::VERSION);
    println!("   {base}");
    println!("   baseline scenario: {scenario}");
    println!();
    println!("   Endpoints:");
    println!("     GET  /                API index (try: curl {base})");
    println!("     GET  /health          Live counters");
    println!("     GET  /report/latest   Most recent window report");
    println!("     POST /inject          Transient attack injection");
    println!();
    println!("   Examples:");
    println!("     curl {base}/report/latest");
    println!(
        "     curl -X POST {base}/inject -H 'content-type: application/json' \\\n          -d '{{\"attack\":\"blinding\",\"events\":20000}}'"
    );
    println!();

    let stop = super::install_stop_handler();
    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        log::error!("could not start runtime: {e}");
        std::process::exit(1);
    });
    match rt.block_on(qkdwatch_server::run_server(monitor, host, port, stop)) {
        Ok(summary) => println!(
            "{} ticks, {} events, {} windows assessed, {} reports dropped",
            summary.ticks, summary.events, summary.windows, summary.dropped
        ),
        Err(e) => {
            log::error!("server failed: {e}");
            std::process::exit(1);
        }
    }
}
