use std::{
    collections::HashMap,
    net::Ipv4Addr,
    sync::{
        mpsc::{sync_channel, Receiver},
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use dht_sensor::dht22;
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::Ets,
    gpio::{
        AnyIOPin, AnyInputPin, AnyOutputPin, Gpio2, IOPin, Input, InputOutput, InputPin, Output,
        OutputPin, PinDriver, Pull,
    },
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution},
    units::Hertz,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    ipv4::{
        ClientConfiguration as IpClientConfiguration, ClientSettings as IpClientSettings,
        Configuration as IpConfiguration, Mask, Subnet,
    },
    log::EspLogger,
    netif::{EspNetif, NetifConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    sntp::EspSntp,
    sys::EspError,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use serde::Serialize;

use roomctl_common::{
    config::NetworkConfig, ActuatorDriver, ActuatorLatch, ActuatorOutputs, ChannelSink,
    ClimateReading, ClimateSensor, ConfigStore, ControlEvent, Diagnostics, EventLevel,
    PersistedConfig, PersistedEntry, RoomController, RuntimeConfig, StoreError, TickInputs,
    TimeOfDay, TimeWindow,
};

use crate::commands::{self, COMMAND_ROUTES};

const NVS_NAMESPACE: &str = "roomctl";
const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const CONTROL_TICK_MS: u64 = 10;
const EVENT_QUEUE_DEPTH: usize = 32;
/// SNTP has not run while the RTC still reads a date before 2024.
const MIN_SYNCED_EPOCH_SECS: i64 = 1_704_067_200;

type EspController = RoomController<NvsStore, ChannelSink>;

#[derive(Clone)]
struct SharedState {
    controller: Arc<Mutex<EspController>>,
    timezone: Arc<String>,
    boot_abnormal: bool,
}

/// One NVS key per persisted field. NVS keys are limited to 15 bytes.
struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

struct Dht22 {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
}

struct Inputs {
    master_switch: PinDriver<'static, AnyInputPin, Input>,
    main_led_switch: PinDriver<'static, AnyInputPin, Input>,
    ldr: AdcChannelDriver<'static, Gpio2, AdcDriver<'static, ADC1>>,
    last_light_raw: u16,
}

struct Outputs {
    fan_relay: PinDriver<'static, AnyOutputPin, Output>,
    night_led: LedcDriver<'static>,
    main_led: LedcDriver<'static>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let boot_abnormal = previous_boot_abnormal();
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = RuntimeConfig::default();
    ensure_wifi_defaults(&mut runtime);

    let store = NvsStore::open(nvs_partition.clone())?;
    let settings = store.load();
    info!(
        "NVS settings loaded: on={:.2}C off={:.2}C master={} main_led={}",
        settings.on_threshold_c,
        settings.off_threshold_c,
        settings.master_switch_on,
        settings.main_led_on,
    );

    let Peripherals {
        modem,
        pins,
        ledc,
        adc1,
        ..
    } = Peripherals::take()?;

    let dht = Dht22::new(pins.gpio4.downgrade()).context("failed to initialize DHT22")?;
    let mut outputs = Outputs {
        fan_relay: PinDriver::output(pins.gpio6.downgrade_output())?,
        night_led: LedcDriver::new(
            ledc.channel0,
            LedcTimerDriver::new(ledc.timer0, &pwm_timer(settings.night_led_pwm_hz))?,
            pins.gpio7,
        )?,
        main_led: LedcDriver::new(
            ledc.channel1,
            LedcTimerDriver::new(ledc.timer1, &pwm_timer(settings.main_led_pwm_hz))?,
            pins.gpio1,
        )?,
    };
    let mut inputs = Inputs {
        master_switch: PinDriver::input(pins.gpio3.downgrade_input())?,
        main_led_switch: PinDriver::input(pins.gpio0.downgrade_input())?,
        ldr: AdcChannelDriver::new(
            AdcDriver::new(adc1)?,
            pins.gpio2,
            &AdcChannelConfig {
                attenuation: DB_11,
                ..Default::default()
            },
        )?,
        last_light_raw: 0,
    };

    let (event_tx, event_rx) = sync_channel(EVENT_QUEUE_DEPTH);
    let boot = inputs.sample(monotonic_ms(), &runtime.timezone);
    let mut controller = RoomController::new(
        runtime.controller.clone(),
        settings,
        store,
        ChannelSink::new(event_tx),
        &boot,
    );
    controller.report_boot(boot_abnormal);
    let mut latch = ActuatorLatch::default();
    write_outputs(&mut latch, &mut outputs, controller.outputs());

    let state = SharedState {
        controller: Arc::new(Mutex::new(controller)),
        timezone: Arc::new(runtime.timezone.clone()),
        boot_abnormal,
    };

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    spawn_control_loop(state.clone(), inputs, outputs, latch, dht);

    let wifi = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;
    disable_wifi_power_save();

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized");

    spawn_event_forwarder(event_rx, runtime.network.log_sink_url.clone());
    let server = create_http_server(state)?;

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }

    if let Some(url) = option_env!("LOG_SINK_URL") {
        runtime.network.log_sink_url = url.to_string();
    }
}

fn pwm_timer(frequency_hz: u32) -> TimerConfig {
    TimerConfig::default()
        .frequency(Hertz(frequency_hz))
        .resolution(Resolution::Bits13)
}

impl Dht22 {
    fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;
        Ok(Self { pin, delay: Ets })
    }
}

impl ClimateSensor for Dht22 {
    fn read(&mut self) -> ClimateReading {
        if let Err(err) = self.pin.set_high() {
            warn!("failed to set DHT22 line high before read: {err:?}");
            return ClimateReading::failed();
        }

        match dht22::blocking::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => ClimateReading {
                temperature_c: reading.temperature,
                humidity: reading.relative_humidity,
            },
            Err(err) => {
                warn!("failed to read DHT22 on GPIO4: {err:?}");
                ClimateReading::failed()
            }
        }
    }
}

impl Inputs {
    fn sample(&mut self, now_ms: u64, timezone: &str) -> TickInputs {
        // A failed conversion repeats the previous light level.
        if let Ok(raw) = self.ldr.read() {
            self.last_light_raw = raw;
        }

        TickInputs {
            now_ms,
            master_switch_raw: self.master_switch.is_high(),
            main_led_switch_raw: self.main_led_switch.is_high(),
            light_raw: self.last_light_raw,
            time_of_day: synced_time_of_day(timezone),
        }
    }
}

impl ActuatorDriver for Outputs {
    type Error = EspError;

    fn set_fan(&mut self, on: bool) -> Result<(), EspError> {
        if on {
            self.fan_relay.set_high()
        } else {
            self.fan_relay.set_low()
        }
    }

    fn set_night_led_duty(&mut self, duty: u32) -> Result<(), EspError> {
        self.night_led.set_duty(duty)
    }

    fn set_main_led_duty(&mut self, duty: u32) -> Result<(), EspError> {
        self.main_led.set_duty(duty)
    }
}

/// Driver faults are logged and not retried.
fn write_outputs(latch: &mut ActuatorLatch, outputs: &mut Outputs, levels: ActuatorOutputs) {
    for failure in latch.apply(outputs, levels) {
        warn!("failed to drive {}: {}", failure.channel.as_str(), failure.reason);
    }
}

fn spawn_control_loop(
    state: SharedState,
    mut inputs: Inputs,
    mut outputs: Outputs,
    mut latch: ActuatorLatch,
    mut dht: Dht22,
) {
    thread::Builder::new()
        .name("control-loop".into())
        .stack_size(12 * 1024)
        .spawn(move || {
            if let Err(err) = add_current_task_to_watchdog() {
                warn!("failed to register control loop with watchdog: {err:#}");
            }

            loop {
                feed_watchdog();
                let now_ms = monotonic_ms();
                let tick = inputs.sample(now_ms, &state.timezone);

                let desired = {
                    let mut controller = lock(&state.controller);
                    controller.tick(&tick, &mut dht)
                };
                write_outputs(&mut latch, &mut outputs, desired);

                thread::sleep(Duration::from_millis(CONTROL_TICK_MS));
            }
        })
        .expect("failed to spawn control loop thread");
}

/// Drains control events to the log and the remote collector. Runs on its
/// own thread so a slow collector never stalls the control loop.
fn spawn_event_forwarder(events: Receiver<ControlEvent>, sink_url: String) {
    thread::Builder::new()
        .name("event-forwarder".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            let mut client = None;

            for event in events {
                match event.level() {
                    EventLevel::Info => info!("{event}"),
                    EventLevel::Warning => warn!("{event}"),
                }

                if !is_wifi_station_connected() {
                    continue;
                }

                if client.is_none() {
                    client = match create_http_client() {
                        Ok(created) => Some(created),
                        Err(err) => {
                            warn!("failed to create log sink client: {err:#}");
                            None
                        }
                    };
                }
                let Some(active) = client.as_mut() else {
                    continue;
                };

                match post_event(active, &sink_url, &event) {
                    Ok(status) if (200..300).contains(&status) => {}
                    Ok(status) => warn!("log sink rejected event with HTTP {status}"),
                    Err(err) => {
                        warn!("log sink post failed: {err:#}");
                        client = None;
                    }
                }
            }
        })
        .expect("failed to spawn event forwarder thread");
}

fn create_http_client() -> anyhow::Result<HttpClient<EspHttpConnection>> {
    let conf = HttpClientConfiguration {
        timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    };
    Ok(HttpClient::wrap(EspHttpConnection::new(&conf)?))
}

fn post_event(
    client: &mut HttpClient<EspHttpConnection>,
    url: &str,
    event: &ControlEvent,
) -> anyhow::Result<u16> {
    let body = serde_json::to_vec(&event.to_record())?;
    let content_length = body.len().to_string();
    let headers = [
        ("Content-Type", "application/json"),
        ("Content-Length", content_length.as_str()),
    ];

    let mut request = client
        .post(url, &headers)
        .map_err(|e| anyhow!("{e:?}"))?;
    request.write_all(&body).map_err(|e| anyhow!("{e:?}"))?;
    request.flush().map_err(|e| anyhow!("{e:?}"))?;
    let response = request.submit().map_err(|e| anyhow!("{e:?}"))?;
    Ok(response.status())
}

fn create_http_server(state: SharedState) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 10 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    {
        let state = state.clone();
        server.fn_handler("/data", Method::Get, move |req| {
            let status = {
                let controller = lock(&state.controller);
                controller.status(monotonic_ms(), diagnostics(&state))
            };
            write_json(req, &status)
        })?;
    }

    for path in COMMAND_ROUTES {
        let state = state.clone();
        server.fn_handler(path, Method::Get, move |req| {
            let uri = req.uri().to_string();
            let params = query_params(&uri);
            let command = match commands::parse(path, |key| params.get(key).map(String::as_str)) {
                Ok(command) => command,
                Err(err) => return write_error(req, 400, &err.to_string()),
            };

            let now_ms = monotonic_ms();
            let result = {
                let mut controller = lock(&state.controller);
                commands::execute(&mut *controller, command, now_ms)
                    .map(|()| controller.status(now_ms, diagnostics(&state)))
            };

            match result {
                Ok(status) => write_json(req, &status),
                Err(err) => write_error(req, 400, &err.to_string()),
            }
        })?;
    }

    Ok(server)
}

fn write_json<T: Serialize>(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(
        200,
        Some("OK"),
        &[
            ("Content-Type", "application/json; charset=utf-8"),
            ("Access-Control-Allow-Origin", "*"),
        ],
    )?
    .write_all(&body)?;
    Ok(())
}

fn write_error(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    status_code: u16,
    message: &str,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(&ErrorBody { error: message })?;
    req.into_response(
        status_code,
        None,
        &[
            ("Content-Type", "application/json; charset=utf-8"),
            ("Access-Control-Allow-Origin", "*"),
        ],
    )?
    .write_all(&body)?;
    Ok(())
}

fn query_params(uri: &str) -> HashMap<String, String> {
    let Some((_, query)) = uri.split_once('?') else {
        return HashMap::new();
    };

    query
        .split('&')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (!name.is_empty()).then(|| (name.to_string(), percent_decode(value)))
        })
        .collect()
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'+' => decoded.push(b' '),
            b'%' if index + 2 < bytes.len() => {
                let hex = core::str::from_utf8(&bytes[index + 1..index + 3]).ok();
                match hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                    Some(byte) => {
                        decoded.push(byte);
                        index += 2;
                    }
                    None => decoded.push(b'%'),
                }
            }
            byte => decoded.push(byte),
        }
        index += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

fn ipv4_from_octets(ip: [u8; 4]) -> Ipv4Addr {
    Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3])
}

fn build_sta_netif(network: &NetworkConfig) -> anyhow::Result<Option<EspNetif>> {
    if !network.use_static_ip {
        return Ok(None);
    }

    let static_ip = network
        .static_ip
        .ok_or_else(|| anyhow!("static_ip is required when use_static_ip is true"))?;
    let gateway = network
        .gateway
        .ok_or_else(|| anyhow!("gateway is required when use_static_ip is true"))?;
    let subnet = network
        .subnet
        .ok_or_else(|| anyhow!("subnet is required when use_static_ip is true"))?;

    let mask_ip = ipv4_from_octets(subnet);
    let mask = Mask::try_from(mask_ip).map_err(|_| anyhow!("invalid subnet mask: {}", mask_ip))?;

    let conf = NetifConfiguration {
        ip_configuration: Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
            IpClientSettings {
                ip: ipv4_from_octets(static_ip),
                subnet: Subnet {
                    gateway: ipv4_from_octets(gateway),
                    mask,
                },
                dns: network.dns.map(ipv4_from_octets),
                secondary_dns: None,
            },
        ))),
        ..NetifConfiguration::wifi_default_client()
    };

    Ok(Some(EspNetif::new_with_conf(&conf)?))
}

/// Brings up the station. A failed association is logged and the device
/// keeps controlling the room offline.
fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;

    if let Some(sta_netif) = build_sta_netif(network)? {
        esp_wifi
            .swap_netif_sta(sta_netif)
            .context("failed to apply static IP netif configuration")?;
    }

    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                drop(wifi);
                return Ok(esp_wifi);
            }
            Err(err) => warn!("wifi connect failed on attempt {attempt}: {err:#}"),
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    warn!("all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed; running offline");
    drop(wifi);
    Ok(esp_wifi)
}

impl NvsStore {
    fn open(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)
            .with_context(|| format!("failed to open NVS namespace `{NVS_NAMESPACE}`"))?;
        Ok(Self { nvs })
    }

    /// Missing or unreadable keys fall back to their defaults.
    fn load(&self) -> PersistedConfig {
        let defaults = PersistedConfig::default();
        let u32_or = |key: &str, default: u32| match self.nvs.get_u32(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                warn!("failed to read NVS key `{key}`: {err}");
                default
            }
        };
        let f32_or = |key: &str, default: f32| f32::from_bits(u32_or(key, default.to_bits()));
        let bool_or = |key: &str, default: bool| u32_or(key, u32::from(default)) != 0;
        let minutes_or = |key: &str, default: TimeOfDay| {
            u16::try_from(u32_or(key, u32::from(default.minutes_since_midnight())))
                .ok()
                .and_then(TimeOfDay::from_minutes)
                .unwrap_or(default)
        };

        PersistedConfig {
            on_threshold_c: f32_or("tempOn", defaults.on_threshold_c),
            off_threshold_c: f32_or("tempOff", defaults.off_threshold_c),
            night_led_duty: u32_or("brightness", defaults.night_led_duty),
            main_led_duty: u32_or("mainLedBright", defaults.main_led_duty),
            light_threshold: u16::try_from(u32_or(
                "lightThreshold",
                u32::from(defaults.light_threshold),
            ))
            .unwrap_or(defaults.light_threshold),
            debounce_ms: u32_or("debounceDelay", defaults.debounce_ms),
            night_led_pwm_hz: u32_or("pwmFreq", defaults.night_led_pwm_hz),
            main_led_pwm_hz: u32_or("mainLedPwmFreq", defaults.main_led_pwm_hz),
            master_switch_on: bool_or("masterSwitch", defaults.master_switch_on),
            main_led_on: bool_or("mainLedState", defaults.main_led_on),
            night_window: TimeWindow::new(
                minutes_or("nightStart", defaults.night_window.start),
                minutes_or("nightEnd", defaults.night_window.end),
            ),
        }
    }

    fn set(&mut self, key: &str, value: u32) -> Result<(), StoreError> {
        self.nvs
            .set_u32(key, value)
            .map_err(|err| StoreError(format!("NVS write of `{key}` failed: {err}")))
    }
}

impl ConfigStore for NvsStore {
    fn put(&mut self, entry: PersistedEntry) -> Result<(), StoreError> {
        match entry {
            PersistedEntry::OnThreshold(value) => self.set("tempOn", value.to_bits()),
            PersistedEntry::OffThreshold(value) => self.set("tempOff", value.to_bits()),
            PersistedEntry::NightLedDuty(duty) => self.set("brightness", duty),
            PersistedEntry::MainLedDuty(duty) => self.set("mainLedBright", duty),
            PersistedEntry::LightThreshold(value) => self.set("lightThreshold", value.into()),
            PersistedEntry::DebounceMs(ms) => self.set("debounceDelay", ms),
            PersistedEntry::MasterSwitch(on) => self.set("masterSwitch", on.into()),
            PersistedEntry::MainLed(on) => self.set("mainLedState", on.into()),
            PersistedEntry::NightWindow(window) => {
                self.set("nightStart", window.start.minutes_since_midnight().into())?;
                self.set("nightEnd", window.end.minutes_since_midnight().into())
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn diagnostics(state: &SharedState) -> Diagnostics {
    Diagnostics {
        free_heap_bytes: Some(unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }),
        boot_abnormal: state.boot_abnormal,
    }
}

fn previous_boot_abnormal() -> bool {
    use esp_idf_svc::sys::{
        esp_reset_reason, esp_reset_reason_t_ESP_RST_BROWNOUT, esp_reset_reason_t_ESP_RST_INT_WDT,
        esp_reset_reason_t_ESP_RST_PANIC, esp_reset_reason_t_ESP_RST_TASK_WDT,
        esp_reset_reason_t_ESP_RST_WDT,
    };

    let reason = unsafe { esp_reset_reason() };
    matches!(
        reason,
        esp_reset_reason_t_ESP_RST_PANIC
            | esp_reset_reason_t_ESP_RST_INT_WDT
            | esp_reset_reason_t_ESP_RST_TASK_WDT
            | esp_reset_reason_t_ESP_RST_WDT
            | esp_reset_reason_t_ESP_RST_BROWNOUT
    )
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}

fn synced_time_of_day(timezone: &str) -> Option<TimeOfDay> {
    if Utc::now().timestamp() < MIN_SYNCED_EPOCH_SECS {
        return None;
    }
    now_in_timezone(timezone).map(|now| TimeOfDay::from_chrono(&now))
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
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
