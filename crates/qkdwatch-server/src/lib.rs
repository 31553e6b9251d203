//! HTTP surface for a running monitor.
//!
//! Exposes the latest window verdict and live counters to result consumers,
//! and lets an external controller inject a transient attack scenario into
//! the event stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use qkdwatch_core::{
    Injection, InjectionHandle, Monitor, MonitorStats, MonitorSummary, Scenario, WindowReport,
};

/// Reports buffered between the monitor loop and the consumer task.
const REPORT_BUFFER: usize = 64;

/// Shared server state.
struct AppState {
    injector: InjectionHandle,
    latest: watch::Receiver<Option<WindowReport>>,
    stats: Arc<MonitorStats>,
    baseline: Scenario,
}

#[derive(Deserialize)]
struct InjectRequest {
    attack: String,
    intensity: Option<String>,
    events: u64,
}

#[derive(Debug, Serialize)]
struct InjectResponse {
    accepted: bool,
    scenario: String,
    injection: Injection,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    baseline: String,
    ticks: u64,
    events: u64,
    windows: u64,
    dropped: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let live = state.stats.snapshot();
    Json(HealthResponse {
        status: if live.windows > 0 {
            "monitoring".to_string()
        } else {
            "warming_up".to_string()
        },
        baseline: state.baseline.to_string(),
        ticks: live.ticks,
        events: live.events,
        windows: live.windows,
        dropped: live.dropped,
    })
}

async fn handle_latest(State(state): State<Arc<AppState>>) -> Result<Json<WindowReport>, ApiError> {
    let latest = state.latest.borrow().clone();
    latest
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "no window assessed yet"))
}

async fn handle_inject(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InjectRequest>,
) -> Result<(StatusCode, Json<InjectResponse>), ApiError> {
    let scenario = Scenario::from_names(&req.attack, req.intensity.as_deref())
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    let injection = Injection {
        scenario,
        events: req.events,
    };
    state
        .injector
        .inject(injection)
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    log::info!("injection requested over HTTP: {scenario} for {} ticks", req.events);

    Ok((
        StatusCode::ACCEPTED,
        Json(InjectResponse {
            accepted: true,
            scenario: scenario.to_string(),
            injection,
        }),
    ))
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "qkdwatch",
        "version": qkdwatch_core::VERSION,
        "baseline": state.baseline.to_string(),
        "endpoints": {
            "/": "This API index",
            "/health": "Live counters: ticks, events, windows, dropped reports",
            "/report/latest": "Most recent window report (404 until the first window is full)",
            "/inject": {
                "method": "POST",
                "description": "Override the baseline scenario for a number of ticks",
                "body": {
                    "attack": "none, intercept, timeshift, zeroday, or blinding",
                    "intensity": "single_photon or blinding (optional)",
                    "events": "Ticks to keep the override; 0 cancels",
                }
            },
        },
        "examples": {
            "blinding": {"attack": "blinding", "events": 20000},
            "cancel": {"attack": "none", "events": 0},
        }
    }))
}

/// Build the axum router.
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/report/latest", get(handle_latest))
        .route("/inject", post(handle_inject))
        .with_state(state)
}

/// Run the monitor loop and serve it over HTTP until `stop` is set.
pub async fn run_server(
    monitor: Monitor,
    host: &str,
    port: u16,
    stop: Arc<AtomicBool>,
) -> std::io::Result<MonitorSummary> {
    let (report_tx, mut report_rx) = mpsc::channel(REPORT_BUFFER);
    let (latest_tx, latest_rx) = watch::channel(None);

    let state = Arc::new(AppState {
        injector: monitor.injector(),
        latest: latest_rx,
        stats: monitor.stats(),
        baseline: monitor.stream().baseline(),
    });

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("serving on http://{addr}");

    let loop_stop = Arc::clone(&stop);
    let monitor_task = tokio::spawn(async move {
        let mut monitor = monitor;
        monitor.run(report_tx, loop_stop).await
    });
    let consumer_task = tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            latest_tx.send_replace(Some(report));
        }
    });

    let shutdown = {
        let stop = Arc::clone(&stop);
        async move {
            while !stop.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    };
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await;

    stop.store(true, Ordering::Relaxed);
    let summary = monitor_task.await.map_err(std::io::Error::other)?;
    consumer_task.await.map_err(std::io::Error::other)?;
    served?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qkdwatch_core::{
        AttackMode, Cascade, CascadeConfig, EventStream, EventWindow, Fingerprint, IntensityMode,
        NoveltyModel, SignatureModel, StreamConfig, ThreatClass,
    };
    use std::collections::BTreeMap;

    struct AlwaysNormal;

    impl SignatureModel for AlwaysNormal {
        fn predict_proba(&self, _: &Fingerprint) -> BTreeMap<ThreatClass, f64> {
            BTreeMap::from([(ThreatClass::Normal, 1.0)])
        }
    }

    struct NeverOutlier;

    impl NoveltyModel for NeverOutlier {
        fn score(&self, _: &Fingerprint) -> f64 {
            1.0
        }
        fn is_outlier(&self, _: &Fingerprint) -> bool {
            false
        }
    }

    fn test_monitor() -> Monitor {
        let cascade = Cascade::new(Box::new(AlwaysNormal), Box::new(NeverOutlier), CascadeConfig::default());
        Monitor::from_parts(
            EventStream::new(StreamConfig::default(), Scenario::NORMAL, Some(5)),
            EventWindow::new(20),
            cascade,
            1,
        )
    }

    fn state_for(monitor: &Monitor) -> (Arc<AppState>, watch::Sender<Option<WindowReport>>) {
        let (tx, rx) = watch::channel(None);
        let state = Arc::new(AppState {
            injector: monitor.injector(),
            latest: rx,
            stats: monitor.stats(),
            baseline: monitor.stream().baseline(),
        });
        (state, tx)
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn latest_is_404_until_first_window() {
        let mut monitor = test_monitor();
        let (state, tx) = state_for(&monitor);

        let err = handle_latest(State(Arc::clone(&state))).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        let report = loop {
            if let Some(r) = monitor.step() {
                break r;
            }
        };
        tx.send_replace(Some(report));
        let Json(latest) = handle_latest(State(state)).await.unwrap();
        assert_eq!(latest.sequence, 1);
    }

    #[tokio::test]
    async fn health_reflects_live_counters() {
        let mut monitor = test_monitor();
        let (state, _tx) = state_for(&monitor);
        while monitor.step().is_none() {}

        let Json(health) = handle_health(State(state)).await;
        assert_eq!(health.status, "monitoring");
        assert_eq!(health.baseline, "none");
        assert_eq!(health.windows, 1);
        assert_eq!(health.events, 20);
        assert_eq!(health.ticks, monitor.stream().ticks());
    }

    #[tokio::test]
    async fn inject_reaches_the_stream() {
        let mut monitor = test_monitor();
        let (state, _tx) = state_for(&monitor);

        let (status, Json(body)) = handle_inject(
            State(state),
            Json(InjectRequest {
                attack: "timeshift".into(),
                intensity: None,
                events: 300,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.accepted);
        assert_eq!(body.injection.scenario.attack, AttackMode::TimeShift);

        monitor.step();
        let active = monitor.stream().injection().unwrap();
        assert_eq!(active.scenario.attack, AttackMode::TimeShift);
    }

    #[tokio::test]
    async fn inject_accepts_blinding_shorthand() {
        let monitor = test_monitor();
        let (state, _tx) = state_for(&monitor);
        let (_, Json(body)) = handle_inject(
            State(state),
            Json(InjectRequest {
                attack: "blinding".into(),
                intensity: None,
                events: 10,
            }),
        )
        .await
        .unwrap();
        assert_eq!(body.injection.scenario.intensity, IntensityMode::Blinding);
        assert_eq!(body.scenario, "blinding");
    }

    #[tokio::test]
    async fn inject_rejects_unknown_names() {
        let monitor = test_monitor();
        let (state, _tx) = state_for(&monitor);

        for (attack, intensity) in [("photon_storm", None), ("none", Some("laser"))] {
            let err = handle_inject(
                State(Arc::clone(&state)),
                Json(InjectRequest {
                    attack: attack.into(),
                    intensity: intensity.map(String::from),
                    events: 10,
                }),
            )
            .await
            .unwrap_err();
            assert_eq!(err.0, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn inject_after_stream_gone_is_unavailable() {
        let monitor = test_monitor();
        let (state, _tx) = state_for(&monitor);
        drop(monitor);

        let err = handle_inject(
            State(state),
            Json(InjectRequest {
                attack: "intercept".into(),
                intensity: None,
                events: 10,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn server_stops_on_flag() {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = tokio::spawn(async move { run_server(test_monitor(), "127.0.0.1", 0, flag).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.store(true, Ordering::Relaxed);
        let summary = handle.await.unwrap().unwrap();
        assert!(summary.ticks > 0);
    }
}
