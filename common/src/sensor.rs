use crate::types::SensorPayload;

/// One blocking read. `None` marks a value the sensor failed to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    pub temperature_c: Option<f32>,
    pub humidity: Option<f32>,
}

impl SensorReading {
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn payload(&self) -> SensorPayload {
        SensorPayload {
            temperature: self.temperature_c.filter(|value| value.is_finite()),
            humidity: self.humidity.filter(|value| value.is_finite()),
        }
    }
}

pub trait ClimateSensor {
    fn read(&mut self) -> SensorReading;
}
