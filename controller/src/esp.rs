use core::convert::TryInto;
use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use dht_sensor::dht11;
use embedded_svc::{
    http::{Headers, Method},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, AnyOutputPin, InputOutput, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals, rmt::RMT},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    mdns::EspMdns,
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use serde::Serialize;

use ac_remote_common::{
    ClimateSensor, Command, CommandOutcome, FormParams, IrHardwareConfig, IrSink, LoadOutcome,
    NetworkConfig, PresetName, PresetStorage, RemoteController, RuntimeConfig, SensorReading,
};

use crate::ir::IrTransmitter;

const NVS_NAMESPACE: &str = "ac_remote";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const NVS_PRESETS_NAMESPACE: &str = "presets";
const MAX_HTTP_BODY: usize = 1024;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const TRANSMIT_POLL_MS: u64 = 50;

type SharedController = Arc<Mutex<RemoteController<NvsPresetStorage>>>;

#[derive(Clone)]
struct SharedState {
    controller: SharedController,
    sensor: Arc<Mutex<Box<dyn ClimateSensor + Send>>>,
}

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
}

/// Presets as NVS blobs, one key per preset name.
struct NvsPresetStorage {
    partition: EspDefaultNvsPartition,
}

struct DhtSensor {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    gpio: i32,
    delay: Ets,
}

/// Used when the DHT pin could not be claimed.
struct OfflineSensor;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });

    ensure_wifi_defaults(&mut runtime);
    runtime.sanitize();

    info!(
        "NVS config loaded: ssid=`{}`, hostname=`{}`, port={}",
        runtime.network.wifi_ssid, runtime.network.hostname, runtime.network.http_port,
    );

    let Peripherals { modem, rmt, .. } = Peripherals::take()?;
    let mut ir_sender = match init_ir_transmitter(rmt, &runtime.ir) {
        Ok(transmitter) => {
            info!(
                "IR transmitter initialized on RMT channel{} / GPIO{} @ {}kHz",
                runtime.ir.rmt_channel, runtime.ir.tx_pin, runtime.ir.carrier_khz
            );
            transmitter
        }
        Err(err) => {
            warn!("failed to initialize IR transmitter, running disabled: {err:#}");
            IrTransmitter::disabled()
        }
    };

    let sensor: Box<dyn ClimateSensor + Send> =
        match DhtSensor::new(runtime.sensor.dht_pin) {
            Ok(sensor) => {
                info!("DHT11 initialized on GPIO{}", runtime.sensor.dht_pin);
                Box::new(sensor)
            }
            Err(err) => {
                warn!("failed to initialize DHT11, sensor reports nulls: {err:#}");
                Box::new(OfflineSensor)
            }
        };

    let wifi = connect_wifi(modem, sys_loop, nvs_partition.clone(), &runtime.network)
        .context("wifi startup failed")?;
    disable_wifi_power_save();

    let mdns = match start_mdns(&runtime.network) {
        Ok(mdns) => {
            info!("mDNS: http://{}.local", runtime.network.hostname);
            Some(mdns)
        }
        Err(err) => {
            warn!("failed to start mDNS: {err:#}");
            None
        }
    };

    let shared_state = SharedState {
        controller: Arc::new(Mutex::new(RemoteController::new(NvsPresetStorage {
            partition: nvs_partition,
        }))),
        sensor: Arc::new(Mutex::new(sensor)),
    };

    let server = create_http_server(shared_state.clone(), runtime.network.http_port)?;
    info!("HTTP server listening on port {}", runtime.network.http_port);

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _mdns = mdns;
    let _server = server;

    loop {
        let frame = lock_controller(&shared_state.controller)?.take_pending_frame();
        if let Some(frame) = frame {
            if let Err(err) = ir_sender.transmit(&frame) {
                warn!("IR transmission failed: {err:#}");
            } else {
                info!("sent {} (total {})", frame.to_hex(), ir_sender.sent_frames());
            }
        }
        thread::sleep(Duration::from_millis(TRANSMIT_POLL_MS));
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
}

fn create_http_server(state: SharedState, port: u16) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        stack_size: 10 * 1024,
        uri_match_wildcard: true,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    {
        let state = state.clone();
        server.fn_handler("/ac", Method::Get, move |req| {
            let payload = lock_controller(&state.controller)?.state_payload();
            write_json(req, &payload)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/sensor", Method::Get, move |req| {
            let reading = state
                .sensor
                .lock()
                .map_err(|_| anyhow!("sensor lock poisoned"))?
                .read();
            write_json(req, &reading.payload())
        })?;
    }

    for command in Command::ALL {
        let state = state.clone();
        server.fn_handler(command.path(), Method::Post, move |mut req| {
            let body = read_request_body(&mut req)?;
            let form = FormParams::parse(&body);
            let result = lock_controller(&state.controller)?.execute(command, &form);

            match result {
                Ok(outcome) => {
                    log_outcome(command, &outcome);
                    req.into_status_response(204)?;
                    Ok(())
                }
                Err(err) => {
                    warn!("{} rejected: {err}", command.path());
                    write_error(req, err.status_code(), &err.to_string())
                }
            }
        })?;
    }

    // Registered last so every route above takes precedence.
    for method in [Method::Get, Method::Post] {
        server.fn_handler::<anyhow::Error, _>("/*", method, |req| {
            req.into_response(404, Some("Not Found"), &[("Content-Type", "text/plain")])?
                .write_all(b"Not found")?;
            Ok(())
        })?;
    }

    Ok(server)
}

fn lock_controller(
    controller: &SharedController,
) -> anyhow::Result<MutexGuard<'_, RemoteController<NvsPresetStorage>>> {
    controller
        .lock()
        .map_err(|_| anyhow!("controller lock poisoned"))
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

fn read_request_body(
    req: &mut esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
) -> anyhow::Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

fn write_json<T: Serialize>(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(200, Some("OK"), &[("Content-Type", "application/json")])?
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
    let payload = serde_json::json!({ "error": message });
    let body = serde_json::to_vec(&payload)?;
    req.into_response(status_code, None, &[("Content-Type", "application/json")])?
        .write_all(&body)?;
    Ok(())
}

fn init_ir_transmitter(rmt: RMT, ir: &IrHardwareConfig) -> anyhow::Result<IrTransmitter> {
    if ir.tx_pin < 0 {
        return Err(anyhow!("invalid tx pin: {}", ir.tx_pin));
    }

    let pin = ir.tx_pin;
    let carrier_khz = ir.carrier_khz;

    match ir.rmt_channel {
        0 => unsafe { IrTransmitter::new(rmt.channel0, AnyOutputPin::new(pin), carrier_khz) },
        1 => unsafe { IrTransmitter::new(rmt.channel1, AnyOutputPin::new(pin), carrier_khz) },
        2 => unsafe { IrTransmitter::new(rmt.channel2, AnyOutputPin::new(pin), carrier_khz) },
        3 => unsafe { IrTransmitter::new(rmt.channel3, AnyOutputPin::new(pin), carrier_khz) },
        #[cfg(any(esp32, esp32s3))]
        4 => unsafe { IrTransmitter::new(rmt.channel4, AnyOutputPin::new(pin), carrier_khz) },
        #[cfg(any(esp32, esp32s3))]
        5 => unsafe { IrTransmitter::new(rmt.channel5, AnyOutputPin::new(pin), carrier_khz) },
        #[cfg(any(esp32, esp32s3))]
        6 => unsafe { IrTransmitter::new(rmt.channel6, AnyOutputPin::new(pin), carrier_khz) },
        #[cfg(any(esp32, esp32s3))]
        7 => unsafe { IrTransmitter::new(rmt.channel7, AnyOutputPin::new(pin), carrier_khz) },
        _ => Err(anyhow!("unsupported RMT channel: {}", ir.rmt_channel)),
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    if network.wifi_ssid.trim().is_empty() {
        return Err(anyhow!(
            "wifi ssid not configured; set WIFI_SSID at build time or runtime_json in NVS"
        ));
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    if let Err(err) = esp_wifi.sta_netif_mut().set_hostname(&network.hostname) {
        warn!("failed to set DHCP hostname `{}`: {err:?}", network.hostname);
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

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
                info!("wifi connected on attempt {attempt}, IP {}", ip_info.ip);
                last_err = None;
                break;
            }
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    if let Some(err) = last_err {
        return Err(anyhow!(
            "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed; last error: {err:#}"
        ));
    }

    drop(wifi);
    Ok(esp_wifi)
}

fn start_mdns(network: &NetworkConfig) -> anyhow::Result<EspMdns> {
    let mut mdns = EspMdns::take()?;
    mdns.set_hostname(&network.hostname)?;
    mdns.set_instance_name("AC remote")?;
    mdns.add_service(None, "_http", "_tcp", network.http_port, &[])?;
    Ok(mdns)
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 2048];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

impl NvsPresetStorage {
    fn open(&self) -> io::Result<EspNvs<NvsDefault>> {
        EspNvs::new(self.partition.clone(), NVS_PRESETS_NAMESPACE, true).map_err(io::Error::other)
    }
}

impl PresetStorage for NvsPresetStorage {
    fn read_slot(&self, name: &PresetName) -> io::Result<Option<Vec<u8>>> {
        let nvs = self.open()?;
        let Some(len) = nvs.blob_len(name.as_str()).map_err(io::Error::other)? else {
            return Ok(None);
        };

        let mut buffer = vec![0_u8; len];
        let stored = nvs
            .get_blob(name.as_str(), &mut buffer)
            .map_err(io::Error::other)?;
        Ok(stored.map(<[u8]>::to_vec))
    }

    fn write_slot(&mut self, name: &PresetName, record: &[u8]) -> io::Result<()> {
        let mut nvs = self.open()?;
        nvs.set_blob(name.as_str(), record)
            .map_err(io::Error::other)?;
        Ok(())
    }
}

impl DhtSensor {
    fn new(gpio: i32) -> anyhow::Result<Self> {
        if gpio < 0 {
            return Err(anyhow!("invalid DHT pin: {gpio}"));
        }

        let mut pin = PinDriver::input_output_od(unsafe { AnyIOPin::new(gpio) })?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;

        Ok(Self {
            pin,
            gpio,
            delay: Ets,
        })
    }
}

impl ClimateSensor for DhtSensor {
    fn read(&mut self) -> SensorReading {
        if let Err(err) = self.pin.set_high() {
            warn!("failed to set DHT11 line high before read: {err:?}");
            return SensorReading::failed();
        }

        match dht11::blocking::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => SensorReading {
                temperature_c: Some(f32::from(reading.temperature)),
                humidity: Some(f32::from(reading.relative_humidity)),
            },
            Err(err) => {
                warn!("failed to read DHT11 on GPIO{}: {err:?}", self.gpio);
                SensorReading::failed()
            }
        }
    }
}

impl ClimateSensor for OfflineSensor {
    fn read(&mut self) -> SensorReading {
        SensorReading::failed()
    }
}
