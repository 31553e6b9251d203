use qkdwatch_core::{Verdict, Vitals, forensic_report};

pub fn run(verdict: &str, voltage: f64, jitter: f64, qber: f64) {
    let verdict: Verdict = verdict.parse().unwrap_or_else(|e| {
        log::error!("{e}");
        std::process::exit(1);
    });
    println!(
        "{}",
        forensic_report(
            &verdict,
            &Vitals {
                voltage,
                jitter,
                qber
            }
        )
    );
}
