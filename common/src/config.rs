use serde::{Deserialize, Serialize};

use crate::gree::GREE_CARRIER_KHZ;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub hostname: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            hostname: "remote".to_string(),
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IrHardwareConfig {
    pub tx_pin: i32,
    pub rmt_channel: u8,
    pub carrier_khz: u32,
}

impl Default for IrHardwareConfig {
    fn default() -> Self {
        Self {
            tx_pin: 14,
            rmt_channel: 0,
            carrier_khz: GREE_CARRIER_KHZ,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorConfig {
    pub dht_pin: i32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { dht_pin: 5 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub ir: IrHardwareConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.network.sanitize();
        self.ir.sanitize();
        self.sensor.sanitize();
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        let hostname = self.hostname.trim();
        if hostname.is_empty()
            || !hostname
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-')
        {
            self.hostname = "remote".to_string();
        } else if hostname.len() != self.hostname.len() {
            self.hostname = hostname.to_string();
        }

        if self.http_port == 0 {
            self.http_port = 80;
        }
    }
}

impl IrHardwareConfig {
    pub fn sanitize(&mut self) {
        if self.tx_pin < 0 {
            self.tx_pin = 14;
        }

        if self.rmt_channel > 7 {
            self.rmt_channel = 0;
        }

        self.carrier_khz = self.carrier_khz.clamp(10, 100);
    }
}

impl SensorConfig {
    pub fn sanitize(&mut self) {
        if self.dht_pin < 0 {
            self.dht_pin = 5;
        }
    }
}
