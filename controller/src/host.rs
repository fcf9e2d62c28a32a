use std::{
    collections::HashMap,
    convert::Infallible,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use roomctl_common::{
    ActuatorDriver, ActuatorLatch, ClimateReading, ClimateSensor, ConfigStore, ControlEvent, Diagnostics,
    EventLevel, EventSink, PersistedEntry, RoomController, RuntimeConfig, StoreError, TickInputs,
    TimeOfDay, TOPIC_EVENTS, TOPIC_SIM_HUMIDITY, TOPIC_SIM_LIGHT, TOPIC_SIM_MAIN_LED_SWITCH,
    TOPIC_SIM_MASTER_SWITCH, TOPIC_SIM_TEMPERATURE, TOPIC_STATE,
};

use crate::commands::{self, COMMAND_ROUTES};

const CONTROL_TICK_MS: u64 = 200;
const STATE_PUBLISH_INTERVAL_SECS: u64 = 10;
const EVENT_QUEUE_DEPTH: usize = 64;
const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

type HostController = RoomController<FileStore, TokioSink>;

#[derive(Clone)]
struct AppState {
    controller: Arc<Mutex<HostController>>,
    hardware: Arc<Mutex<SimulatedHardware>>,
    timezone: Arc<String>,
    mqtt: AsyncClient,
}

/// Stand-in for the DHT22, LDR and the two touch/proximity inputs.
#[derive(Debug, Clone)]
struct SimulatedHardware {
    temperature_c: f32,
    humidity: f32,
    light_raw: u16,
    master_switch_raw: bool,
    main_led_switch_raw: bool,
    fail_reads: bool,
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self {
            temperature_c: 27.0,
            humidity: 60.0,
            light_raw: 3_000,
            master_switch_raw: false,
            main_led_switch_raw: false,
            fail_reads: false,
        }
    }
}

impl ClimateSensor for SimulatedHardware {
    fn read(&mut self) -> ClimateReading {
        if self.fail_reads {
            return ClimateReading::failed();
        }
        ClimateReading {
            temperature_c: self.temperature_c,
            humidity: self.humidity,
        }
    }
}

impl ActuatorDriver for SimulatedHardware {
    type Error = Infallible;

    fn set_fan(&mut self, on: bool) -> Result<(), Infallible> {
        info!("fan relay -> {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    fn set_night_led_duty(&mut self, duty: u32) -> Result<(), Infallible> {
        info!("night LED duty -> {duty}");
        Ok(())
    }

    fn set_main_led_duty(&mut self, duty: u32) -> Result<(), Infallible> {
        info!("main LED duty -> {duty}");
        Ok(())
    }
}

/// `runtime.json` under the data directory, rewritten on every setter.
#[derive(Debug)]
struct FileStore {
    path: PathBuf,
    runtime: RuntimeConfig,
}

impl FileStore {
    fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join("runtime.json");
        let runtime = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => RuntimeConfig::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, runtime })
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(&self.runtime)?;
        std::fs::write(&self.path, payload)?;
        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn put(&mut self, entry: PersistedEntry) -> Result<(), StoreError> {
        entry.apply_to(&mut self.runtime.settings);
        self.save().map_err(|err| StoreError(format!("{err:#}")))
    }
}

/// Event sink feeding the async drain task; never waits on the queue.
#[derive(Debug)]
struct TokioSink {
    sender: mpsc::Sender<ControlEvent>,
    dropped: u64,
}

impl EventSink for TokioSink {
    fn emit(&mut self, event: ControlEvent) {
        if self.sender.try_send(event).is_err() {
            self.dropped = self.dropped.saturating_add(1);
            if self.dropped.is_power_of_two() {
                warn!("event queue full; {} events dropped so far", self.dropped);
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("ROOMCTL_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.roomctl"));
    let store = FileStore::open(&data_dir).unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        FileStore {
            path: data_dir.join("runtime.json"),
            runtime: RuntimeConfig::default(),
        }
    });
    let runtime = store.runtime.clone();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("roomctl-controller-host", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let sink = TokioSink {
        sender: event_tx,
        dropped: 0,
    };

    let hardware = SimulatedHardware::default();
    let boot = tick_inputs(&hardware, monotonic_ms(), &runtime.timezone);
    let mut controller = RoomController::new(
        runtime.controller.clone(),
        runtime.settings.clone(),
        store,
        sink,
        &boot,
    );
    controller.report_boot(false);

    let app_state = AppState {
        controller: Arc::new(Mutex::new(controller)),
        hardware: Arc::new(Mutex::new(hardware)),
        timezone: Arc::new(runtime.timezone),
        mqtt,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_event_drain(app_state.mqtt.clone(), event_rx);
    spawn_control_loop(app_state.clone());
    spawn_state_publish_loop(app_state.clone());

    let app = build_router(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(app_state: AppState) -> Router {
    let mut router: Router<AppState> = Router::new()
        .route("/data", get(handle_get_data))
        .route("/sim", get(handle_sim));

    for path in COMMAND_ROUTES {
        router = router.route(
            path,
            get(
                move |State(state): State<AppState>,
                      Query(params): Query<HashMap<String, String>>| {
                    handle_command(state, path, params)
                },
            ),
        );
    }

    router
        .fallback(handle_not_found)
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SIM_TEMPERATURE,
        TOPIC_SIM_HUMIDITY,
        TOPIC_SIM_LIGHT,
        TOPIC_SIM_MASTER_SWITCH,
        TOPIC_SIM_MAIN_LED_SWITCH,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Logs every control event and forwards it to MQTT, off the tick path.
fn spawn_event_drain(mqtt: AsyncClient, mut events: mpsc::Receiver<ControlEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event.level() {
                EventLevel::Info => info!("{event}"),
                EventLevel::Warning => warn!("{event}"),
            }

            let body = match serde_json::to_vec(&event.to_record()) {
                Ok(body) => body,
                Err(err) => {
                    warn!("event serialization failed: {err}");
                    continue;
                }
            };
            if let Err(err) = mqtt.try_publish(TOPIC_EVENTS, QoS::AtMostOnce, false, body) {
                warn!("event publish failed: {err}");
            }
        }
    });
}

fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(CONTROL_TICK_MS));
        let mut latch = ActuatorLatch::default();

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            let mut hardware = app_state.hardware.lock().await;
            let inputs = tick_inputs(&hardware, now_ms, &app_state.timezone);
            let outputs = {
                let mut controller = app_state.controller.lock().await;
                controller.tick(&inputs, &mut *hardware)
            };
            latch.apply(&mut *hardware, outputs);
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(STATE_PUBLISH_INTERVAL_SECS));
        loop {
            interval.tick().await;

            let now_ms = monotonic_ms();
            let payload = {
                let controller = app_state.controller.lock().await;
                serde_json::to_vec(&controller.status(now_ms, host_diagnostics()))
            };

            match payload {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let message = message.trim();
    let mut hardware = app_state.hardware.lock().await;

    match topic.as_str() {
        TOPIC_SIM_TEMPERATURE => {
            if message.eq_ignore_ascii_case("nan") {
                hardware.fail_reads = true;
            } else if let Ok(temperature) = message.parse::<f32>() {
                hardware.temperature_c = temperature;
                hardware.fail_reads = false;
            }
        }
        TOPIC_SIM_HUMIDITY => {
            if let Ok(humidity) = message.parse::<f32>() {
                hardware.humidity = humidity;
            }
        }
        TOPIC_SIM_LIGHT => {
            if let Ok(light) = message.parse::<u16>() {
                hardware.light_raw = light;
            }
        }
        TOPIC_SIM_MASTER_SWITCH => {
            if let Some(level) = parse_level(message) {
                hardware.master_switch_raw = level;
            }
        }
        TOPIC_SIM_MAIN_LED_SWITCH => {
            if let Some(level) = parse_level(message) {
                hardware.main_led_switch_raw = level;
            }
        }
        _ => {}
    }

    Ok(())
}

async fn handle_get_data(State(state): State<AppState>) -> impl IntoResponse {
    let now_ms = monotonic_ms();
    let status = {
        let controller = state.controller.lock().await;
        controller.status(now_ms, host_diagnostics())
    };
    Json(status)
}

async fn handle_command(
    state: AppState,
    path: &'static str,
    params: HashMap<String, String>,
) -> axum::response::Response {
    let command = match commands::parse(path, |key| params.get(key).map(String::as_str)) {
        Ok(command) => command,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let now_ms = monotonic_ms();
    let status = {
        let mut controller = state.controller.lock().await;
        if let Err(err) = commands::execute(&mut *controller, command, now_ms) {
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
        controller.status(now_ms, host_diagnostics())
    };

    Json(status).into_response()
}

/// Drives the simulated inputs, e.g. `/sim?temperature=29.4&light=1200`.
async fn handle_sim(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    {
        let mut hardware = state.hardware.lock().await;
        if let Some(value) = params.get("temperature") {
            let Ok(temperature) = value.parse::<f32>() else {
                return error_response(StatusCode::BAD_REQUEST, "Invalid 'temperature' value");
            };
            hardware.temperature_c = temperature;
        }
        if let Some(value) = params.get("humidity") {
            let Ok(humidity) = value.parse::<f32>() else {
                return error_response(StatusCode::BAD_REQUEST, "Invalid 'humidity' value");
            };
            hardware.humidity = humidity;
        }
        if let Some(value) = params.get("light") {
            let Ok(light) = value.parse::<u16>() else {
                return error_response(StatusCode::BAD_REQUEST, "Invalid 'light' value");
            };
            hardware.light_raw = light;
        }
        if let Some(level) = params.get("master").and_then(|value| parse_level(value)) {
            hardware.master_switch_raw = level;
        }
        if let Some(level) = params.get("main_led").and_then(|value| parse_level(value)) {
            hardware.main_led_switch_raw = level;
        }
        if let Some(fail) = params.get("fail").and_then(|value| parse_level(value)) {
            hardware.fail_reads = fail;
        }
    }

    handle_get_data(State(state)).await.into_response()
}

async fn handle_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

fn tick_inputs(hardware: &SimulatedHardware, now_ms: u64, timezone: &str) -> TickInputs {
    TickInputs {
        now_ms,
        master_switch_raw: hardware.master_switch_raw,
        main_led_switch_raw: hardware.main_led_switch_raw,
        light_raw: hardware.light_raw,
        time_of_day: now_in_timezone(timezone).map(|now| TimeOfDay::from_chrono(&now)),
    }
}

fn parse_level(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "high" | "true" => Some(true),
        "0" | "off" | "low" | "false" => Some(false),
        _ => None,
    }
}

fn host_diagnostics() -> Diagnostics {
    Diagnostics {
        free_heap_bytes: None,
        boot_abnormal: false,
    }
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
