use crate::types::{on_off, AcMode, AcStatePayload, FanSpeed, SwingPosition};

pub const MIN_TEMP_C: u8 = 16;
pub const MAX_TEMP_C: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerticalSwing {
    pub auto: bool,
    pub position: SwingPosition,
}

/// Commanded air-conditioner configuration.
///
/// Setters do not validate; callers are expected to have mapped and clamped
/// their input already.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    power: bool,
    mode: AcMode,
    temperature: u8,
    fan: FanSpeed,
    light: bool,
    swing: VerticalSwing,
    x_fan: bool,
    sleep: bool,
    turbo: bool,
    econo: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: true,
            mode: AcMode::Cool,
            temperature: 25,
            fan: FanSpeed::Auto,
            light: true,
            swing: VerticalSwing {
                auto: false,
                position: SwingPosition::LastPos,
            },
            x_fan: false,
            sleep: false,
            turbo: false,
            econo: false,
        }
    }
}

impl DeviceState {
    pub fn power(&self) -> bool {
        self.power
    }

    pub fn set_power(&mut self, on: bool) {
        self.power = on;
    }

    pub fn mode(&self) -> AcMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AcMode) {
        self.mode = mode;
    }

    pub fn temperature(&self) -> u8 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temp_c: u8) {
        self.temperature = temp_c;
    }

    pub fn fan(&self) -> FanSpeed {
        self.fan
    }

    pub fn set_fan(&mut self, fan: FanSpeed) {
        self.fan = fan;
    }

    pub fn light(&self) -> bool {
        self.light
    }

    pub fn set_light(&mut self, on: bool) {
        self.light = on;
    }

    pub fn swing(&self) -> VerticalSwing {
        self.swing
    }

    pub fn set_swing(&mut self, auto: bool, position: SwingPosition) {
        self.swing = VerticalSwing { auto, position };
    }

    pub fn x_fan(&self) -> bool {
        self.x_fan
    }

    pub fn sleep(&self) -> bool {
        self.sleep
    }

    pub fn turbo(&self) -> bool {
        self.turbo
    }

    pub fn econo(&self) -> bool {
        self.econo
    }

    pub fn payload(&self) -> AcStatePayload {
        AcStatePayload {
            power: on_off(self.power),
            mode: self.mode.as_str(),
            temp: self.temperature,
            fan: self.fan.as_str(),
            light: on_off(self.light),
            swing: on_off(self.swing.auto),
        }
    }
}

pub fn clamp_temperature(temp_c: i64) -> u8 {
    // Clamped into a u8 range first, so the cast cannot truncate.
    temp_c.clamp(i64::from(MIN_TEMP_C), i64::from(MAX_TEMP_C)) as u8
}
