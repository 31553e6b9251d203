pub mod explain;
pub mod monitor;
pub mod serve;
pub mod train;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use qkdwatch_core::training::{NOVELTY_FILE, SIGNATURE_FILE};
use qkdwatch_core::{Cascade, IdsConfig, Scenario};

/// Load the JSON config, or defaults when no path is given. Exits on error.
pub fn load_config(path: Option<&Path>) -> IdsConfig {
    let Some(path) = path else {
        return IdsConfig::default();
    };
    match IdsConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid config {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

/// Load both model artifacts from `dir`. A missing artifact is fatal.
pub fn load_cascade(dir: &Path, config: &IdsConfig) -> Cascade {
    match Cascade::load(&dir.join(SIGNATURE_FILE), &dir.join(NOVELTY_FILE), config.cascade) {
        Ok(cascade) => cascade,
        Err(e) => {
            log::error!("{e}");
            log::error!("run `qkdwatch train --models {}` first", dir.display());
            std::process::exit(1);
        }
    }
}

/// Resolve attack and intensity names into a scenario. Exits on unknown names.
pub fn parse_scenario(attack: &str, intensity: Option<&str>) -> Scenario {
    Scenario::from_names(attack, intensity).unwrap_or_else(|e| {
        log::error!("{e}");
        std::process::exit(1);
    })
}

/// Stop flag flipped by Ctrl+C.
pub fn install_stop_handler() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        log::warn!("could not install Ctrl+C handler: {e}");
    }
    stop
}

/// An injection to send once a given number of windows has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledInjection {
    pub scenario: Scenario,
    pub ticks: u64,
    pub after_window: u64,
}

/// Parse `MODE:TICKS@WINDOW`. `@WINDOW` is optional and defaults to 0
/// (inject before the first window).
pub fn parse_injection(s: &str) -> Result<ScheduledInjection, String> {
    let (head, after_window) = match s.split_once('@') {
        Some((head, w)) => (
            head,
            w.trim()
                .parse()
                .map_err(|_| format!("invalid window index '{w}' in '{s}'"))?,
        ),
        None => (s, 0),
    };
    let (mode, ticks) = head
        .split_once(':')
        .ok_or_else(|| format!("expected MODE:TICKS[@WINDOW], got '{s}'"))?;
    let scenario: Scenario = mode.trim().parse()?;
    let ticks = ticks
        .trim()
        .parse()
        .map_err(|_| format!("invalid tick count '{ticks}' in '{s}'"))?;
    Ok(ScheduledInjection {
        scenario,
        ticks,
        after_window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qkdwatch_core::{AttackMode, IntensityMode};

    // -----------------------------------------------------------------------
    // parse_injection tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_injection_full() {
        let inj = parse_injection("blinding:20000@10").unwrap();
        assert_eq!(inj.scenario, Scenario::BLINDING);
        assert_eq!(inj.ticks, 20_000);
        assert_eq!(inj.after_window, 10);
    }

    #[test]
    fn test_parse_injection_without_window() {
        let inj = parse_injection("intercept:500").unwrap();
        assert_eq!(inj.scenario.attack, AttackMode::Intercept);
        assert_eq!(inj.scenario.intensity, IntensityMode::SinglePhoton);
        assert_eq!(inj.after_window, 0);
    }

    #[test]
    fn test_parse_injection_combined_scenario() {
        let inj = parse_injection("timeshift+blinding:100@3").unwrap();
        assert_eq!(inj.scenario.attack, AttackMode::TimeShift);
        assert_eq!(inj.scenario.intensity, IntensityMode::Blinding);
    }

    #[test]
    fn test_parse_injection_cancel() {
        let inj = parse_injection("none:0@5").unwrap();
        assert_eq!(inj.ticks, 0);
    }

    #[test]
    fn test_parse_injection_rejects_malformed() {
        assert!(parse_injection("blinding").is_err());
        assert!(parse_injection("blinding:lots").is_err());
        assert!(parse_injection("blinding:10@soon").is_err());
        assert!(parse_injection("laser:10").is_err());
    }

    // -----------------------------------------------------------------------
    // parse_scenario tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_scenario_intensity_flag() {
        let s = parse_scenario("intercept", Some("blinding"));
        assert_eq!(s.attack, AttackMode::Intercept);
        assert_eq!(s.intensity, IntensityMode::Blinding);
        assert_eq!(parse_scenario("none", None), Scenario::NORMAL);
    }

    #[test]
    fn test_load_config_defaults_without_path() {
        assert_eq!(load_config(None), IdsConfig::default());
    }
}
