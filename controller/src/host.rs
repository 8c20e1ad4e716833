use std::{convert::Infallible, fmt::Display, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ac_remote_common::{
    ClimateSensor, Command, CommandOutcome, DirStorage, FormParams, GreeFrame, IrSink,
    LoadOutcome, PresetStorage, RemoteController, SensorReading,
};

type SharedController = Arc<Mutex<RemoteController<Box<dyn PresetStorage + Send>>>>;

#[derive(Clone)]
struct AppState {
    controller: SharedController,
    sensor: Arc<Mutex<Box<dyn ClimateSensor + Send>>>,
    transmit: Arc<Notify>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Stand-in for the IR LED: logs each frame.
#[derive(Debug, Default)]
struct LoggingIrSink {
    sent_frames: u64,
}

impl IrSink for LoggingIrSink {
    type Error = Infallible;

    fn transmit(&mut self, frame: &GreeFrame) -> Result<(), Self::Error> {
        self.sent_frames = self.sent_frames.saturating_add(1);
        info!(
            "ir frame #{} {} ({} timings)",
            self.sent_frames,
            frame.to_hex(),
            frame.timings().len()
        );
        Ok(())
    }
}

/// Stand-in for the DHT11 with slowly drifting values.
#[derive(Debug, Default)]
struct SimulatedSensor {
    tick: u64,
    offline: bool,
}

impl ClimateSensor for SimulatedSensor {
    fn read(&mut self) -> SensorReading {
        if self.offline {
            return SensorReading::failed();
        }

        self.tick = self.tick.saturating_add(1);
        SensorReading {
            temperature_c: Some(24.0 + (self.tick % 8) as f32 * 0.2),
            humidity: Some(45.0 + (self.tick % 6) as f32 * 0.5),
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("AC_REMOTE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.ac-remote"));
    let storage: Box<dyn PresetStorage + Send> = Box::new(DirStorage::new(&data_dir));
    let sensor = SimulatedSensor {
        offline: std::env::var_os("AC_REMOTE_SENSOR_OFFLINE").is_some(),
        ..Default::default()
    };

    let app_state = AppState {
        controller: Arc::new(Mutex::new(RemoteController::new(storage))),
        sensor: Arc::new(Mutex::new(Box::new(sensor))),
        transmit: Arc::new(Notify::new()),
    };

    spawn_transmit_loop(app_state.clone(), LoggingIrSink::default());

    let app = build_router(app_state);

    let port = std::env::var("AC_REMOTE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind remote server at {addr}"))?;

    info!(
        "remote listening on http://{addr}, presets in {}",
        data_dir.display()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn build_router(app_state: AppState) -> Router {
    let mut router: Router<AppState> = Router::new()
        .route("/ac", get(handle_get_state).fallback(handle_not_found))
        .route("/sensor", get(handle_get_sensor).fallback(handle_not_found));

    for command in Command::ALL {
        router = router.route(
            command.path(),
            post(move |State(state): State<AppState>, body: Bytes| {
                handle_command(state, command, body)
            })
            .fallback(handle_not_found),
        );
    }

    router
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn spawn_transmit_loop<T>(app_state: AppState, mut sink: T)
where
    T: IrSink + Send + 'static,
    T::Error: Display,
{
    tokio::spawn(async move {
        loop {
            app_state.transmit.notified().await;
            if let Err(err) = transmit_pending(&app_state, &mut sink).await {
                warn!("ir transmission failed: {err}");
            }
        }
    });
}

/// Drains the pending flag and sends the state as it is at this moment.
/// The controller lock is released before the sink runs.
async fn transmit_pending<T: IrSink>(app_state: &AppState, sink: &mut T) -> Result<bool, T::Error> {
    let frame = { app_state.controller.lock().await.take_pending_frame() };
    match frame {
        Some(frame) => {
            sink.transmit(&frame)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

async fn handle_command(state: AppState, command: Command, body: Bytes) -> Response {
    let form = FormParams::parse(&body);

    let (result, pending) = {
        let mut controller = state.controller.lock().await;
        let result = controller.execute(command, &form);
        (result, controller.is_transmit_pending())
    };

    match result {
        Ok(outcome) => {
            log_outcome(command, &outcome);
            if pending {
                state.transmit.notify_one();
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            warn!("{} rejected: {err}", command.path());
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(status, &err.to_string())
        }
    }
}

fn log_outcome(command: Command, outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Applied => info!("{} applied", command.path()),
        CommandOutcome::PresetSaved(name) => info!("preset `{name}` saved"),
        CommandOutcome::PresetLoaded(name, LoadOutcome::Applied) => {
            info!("preset `{name}` loaded")
        }
        CommandOutcome::PresetLoaded(name, LoadOutcome::NotFound) => {
            info!("preset `{name}` not found, state unchanged")
        }
        CommandOutcome::PresetLoaded(name, LoadOutcome::SizeMismatch { expected, actual }) => {
            warn!("preset `{name}` is {actual} bytes, expected {expected}; ignored")
        }
    }
}

async fn handle_get_state(State(state): State<AppState>) -> impl IntoResponse {
    let payload = state.controller.lock().await.state_payload();
    Json(payload)
}

async fn handle_get_sensor(State(state): State<AppState>) -> impl IntoResponse {
    let reading = state.sensor.lock().await.read();
    if reading.temperature_c.is_none() || reading.humidity.is_none() {
        warn!("sensor read incomplete: {reading:?}");
    }
    Json(reading.payload())
}

async fn handle_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::io;

    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Method, Request},
    };
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tower::ServiceExt;

    use ac_remote_common::{MemoryStorage, PresetName};

    use super::*;

    struct ScriptedSensor(SensorReading);

    impl ClimateSensor for ScriptedSensor {
        fn read(&mut self) -> SensorReading {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<GreeFrame>,
    }

    impl IrSink for RecordingSink {
        type Error = Infallible;

        fn transmit(&mut self, frame: &GreeFrame) -> Result<(), Self::Error> {
            self.frames.push(*frame);
            Ok(())
        }
    }

    struct FailingStorage;

    impl PresetStorage for FailingStorage {
        fn read_slot(&self, _name: &PresetName) -> io::Result<Option<Vec<u8>>> {
            Err(io::Error::other("flash unavailable"))
        }

        fn write_slot(&mut self, _name: &PresetName, _record: &[u8]) -> io::Result<()> {
            Err(io::Error::other("flash unavailable"))
        }
    }

    fn app_state_with(storage: Box<dyn PresetStorage + Send>, reading: SensorReading) -> AppState {
        AppState {
            controller: Arc::new(Mutex::new(RemoteController::new(storage))),
            sensor: Arc::new(Mutex::new(Box::new(ScriptedSensor(reading)))),
            transmit: Arc::new(Notify::new()),
        }
    }

    fn app_state() -> AppState {
        app_state_with(
            Box::new(MemoryStorage::new()),
            SensorReading {
                temperature_c: Some(22.5),
                humidity: Some(40.0),
            },
        )
    }

    async fn send(router: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn post(router: &Router, uri: &str, body: &str) -> StatusCode {
        send(router, Method::POST, uri, body).await.0
    }

    async fn get_state(router: &Router) -> Value {
        let (status, body) = send(router, Method::GET, "/ac", "").await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_str(&body).unwrap()
    }

    #[tokio::test]
    async fn temperature_is_reported_back() {
        let router = build_router(app_state());
        for temp in 16..=30 {
            assert_eq!(
                post(&router, "/ac/temp", &format!("temp={temp}")).await,
                StatusCode::NO_CONTENT
            );
            assert_eq!(get_state(&router).await["temp"], temp);
        }
    }

    #[tokio::test]
    async fn unrecognized_values_fall_back() {
        let router = build_router(app_state());
        post(&router, "/ac/fan", "fan=max").await;
        assert_eq!(get_state(&router).await["fan"], "max");

        assert_eq!(post(&router, "/ac/fan", "fan=xyz").await, StatusCode::NO_CONTENT);
        assert_eq!(get_state(&router).await["fan"], "auto");

        post(&router, "/ac/swing", "swing=on").await;
        assert_eq!(post(&router, "/ac/swingPos", "pos=sideways").await, StatusCode::NO_CONTENT);
        assert_eq!(get_state(&router).await["swing"], "off");
    }

    #[tokio::test]
    async fn missing_parameter_is_rejected_without_mutation() {
        let state = app_state();
        let router = build_router(state.clone());
        let before = get_state(&router).await;

        for command in Command::ALL {
            let (status, body) = send(&router, Method::POST, command.path(), "other=1").await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", command.path());
            assert!(body.contains(command.field()));
        }

        assert_eq!(get_state(&router).await, before);
        assert!(!state.controller.lock().await.is_transmit_pending());
    }

    #[tokio::test]
    async fn preset_restores_everything_but_mode() {
        let router = build_router(app_state());
        post(&router, "/ac/temp", "temp=19").await;
        post(&router, "/ac/fan", "fan=min").await;
        post(&router, "/ac/light", "light=off").await;
        assert_eq!(post(&router, "/ac/savePreset", "name=p1").await, StatusCode::NO_CONTENT);
        let saved = get_state(&router).await;

        post(&router, "/ac/power", "power=off").await;
        post(&router, "/ac/temp", "temp=29").await;
        post(&router, "/ac/fan", "fan=max").await;
        post(&router, "/ac/light", "light=on").await;
        post(&router, "/ac/swing", "swing=on").await;
        post(&router, "/ac/mode", "mode=dry").await;

        assert_eq!(post(&router, "/ac/loadPreset", "name=p1").await, StatusCode::NO_CONTENT);
        let restored = get_state(&router).await;

        for key in ["power", "temp", "fan", "light", "swing"] {
            assert_eq!(restored[key], saved[key], "{key}");
        }
        assert_eq!(restored["mode"], "dry");
    }

    #[tokio::test]
    async fn unknown_or_corrupt_presets_leave_state_alone() {
        let mut storage = MemoryStorage::new();
        storage.insert_raw(PresetName::parse("torn").unwrap(), vec![0, 17]);
        let state = app_state_with(Box::new(storage), SensorReading::failed());
        let router = build_router(state.clone());
        post(&router, "/ac/temp", "temp=23").await;
        let before = state.controller.lock().await.state().clone();

        assert_eq!(post(&router, "/ac/loadPreset", "name=ghost").await, StatusCode::NO_CONTENT);
        assert_eq!(state.controller.lock().await.state(), &before);

        assert_eq!(post(&router, "/ac/loadPreset", "name=torn").await, StatusCode::NO_CONTENT);
        assert_eq!(state.controller.lock().await.state(), &before);
    }

    #[tokio::test]
    async fn invalid_preset_names_are_bad_requests() {
        let router = build_router(app_state());
        assert_eq!(
            post(&router, "/ac/savePreset", "name=..%2Fruntime").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(post(&router, "/ac/loadPreset", "name=").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn storage_failures_surface_as_server_errors() {
        let router = build_router(app_state_with(
            Box::new(FailingStorage),
            SensorReading::failed(),
        ));
        assert_eq!(
            post(&router, "/ac/savePreset", "name=p1").await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            post(&router, "/ac/loadPreset", "name=p1").await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn back_to_back_requests_send_one_frame() {
        let state = app_state();
        let router = build_router(state.clone());
        let mut sink = RecordingSink::default();

        post(&router, "/ac/temp", "temp=18").await;
        post(&router, "/ac/fan", "fan=med").await;

        assert!(transmit_pending(&state, &mut sink).await.unwrap());
        assert!(!transmit_pending(&state, &mut sink).await.unwrap());

        let latest = GreeFrame::from_state(state.controller.lock().await.state());
        assert_eq!(sink.frames, vec![latest]);
    }

    #[tokio::test]
    async fn state_and_sensor_queries_do_not_transmit() {
        let state = app_state();
        let router = build_router(state.clone());
        send(&router, Method::GET, "/ac", "").await;
        send(&router, Method::GET, "/sensor", "").await;
        assert!(!state.controller.lock().await.is_transmit_pending());
    }

    #[tokio::test]
    async fn sensor_reports_values() {
        let router = build_router(app_state());
        let (status, body) = send(&router, Method::GET, "/sensor", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"temperature":22.5,"humidity":40.0}"#);
    }

    #[tokio::test]
    async fn faulty_sensor_reports_null_markers() {
        let router = build_router(app_state_with(
            Box::new(MemoryStorage::new()),
            SensorReading::failed(),
        ));
        let (status, body) = send(&router, Method::GET, "/sensor", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"temperature":null,"humidity":null}"#);
    }

    #[tokio::test]
    async fn unmatched_routes_are_not_found() {
        let router = build_router(app_state());
        assert_eq!(send(&router, Method::GET, "/nope", "").await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&router, Method::GET, "/ac/power", "").await.0, StatusCode::NOT_FOUND);
        let (status, body) = send(&router, Method::POST, "/ac", "power=on").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not found");
    }
}
