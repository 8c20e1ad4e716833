use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcMode {
    Auto,
    Cool,
    Dry,
    Fan,
    Heat,
}

impl AcMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cool => "cool",
            Self::Dry => "dry",
            Self::Fan => "fan",
            Self::Heat => "heat",
        }
    }

    /// Unknown labels select `Auto`, the same fallback the remote applies.
    pub fn from_label(value: &str) -> Self {
        match value {
            "cool" => Self::Cool,
            "dry" => Self::Dry,
            "fan" => Self::Fan,
            "heat" => Self::Heat,
            _ => Self::Auto,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Auto => 0,
            Self::Cool => 1,
            Self::Dry => 2,
            Self::Fan => 3,
            Self::Heat => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    Auto,
    Min,
    Med,
    Max,
}

impl FanSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Min => "min",
            Self::Med => "med",
            Self::Max => "max",
        }
    }

    pub fn from_label(value: &str) -> Self {
        match value {
            "min" => Self::Min,
            "med" => Self::Med,
            "max" => Self::Max,
            _ => Self::Auto,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Auto => 0,
            Self::Min => 1,
            Self::Med => 2,
            Self::Max => 3,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Min,
            2 => Self::Med,
            3 => Self::Max,
            _ => Self::Auto,
        }
    }
}

/// Fixed vertical louvre positions. Codes match the Gree `SwingV` nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingPosition {
    LastPos,
    Up,
    MiddleUp,
    Middle,
    MiddleDown,
    Down,
}

impl SwingPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastPos => "lastpos",
            Self::Up => "up",
            Self::MiddleUp => "middleup",
            Self::Middle => "middle",
            Self::MiddleDown => "middledown",
            Self::Down => "down",
        }
    }

    pub fn from_label(value: &str) -> Self {
        match value {
            "up" => Self::Up,
            "middleup" => Self::MiddleUp,
            "middle" => Self::Middle,
            "middledown" => Self::MiddleDown,
            "down" => Self::Down,
            _ => Self::LastPos,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::LastPos => 0,
            Self::Up => 2,
            Self::MiddleUp => 3,
            Self::Middle => 4,
            Self::MiddleDown => 5,
            Self::Down => 6,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            2 => Self::Up,
            3 => Self::MiddleUp,
            4 => Self::Middle,
            5 => Self::MiddleDown,
            6 => Self::Down,
            _ => Self::LastPos,
        }
    }
}

pub fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Body of `GET /ac`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcStatePayload {
    pub power: &'static str,
    pub mode: &'static str,
    pub temp: u8,
    pub fan: &'static str,
    pub light: &'static str,
    pub swing: &'static str,
}

/// Body of `GET /sensor`. A failed reading serializes as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorPayload {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unknown_labels_fall_back_to_defaults() {
        assert_eq!(FanSpeed::from_label("xyz"), FanSpeed::Auto);
        assert_eq!(FanSpeed::from_label("MAX"), FanSpeed::Auto);
        assert_eq!(SwingPosition::from_label("sideways"), SwingPosition::LastPos);
        assert_eq!(AcMode::from_label(""), AcMode::Auto);
    }

    #[test]
    fn every_mode_has_its_own_label() {
        let labels: Vec<_> = [AcMode::Auto, AcMode::Cool, AcMode::Dry, AcMode::Fan, AcMode::Heat]
            .iter()
            .map(|mode| mode.as_str())
            .collect();
        assert_eq!(labels, vec!["auto", "cool", "dry", "fan", "heat"]);
    }

    #[test]
    fn swing_codes_skip_the_auto_slot() {
        assert_eq!(SwingPosition::from_code(1), SwingPosition::LastPos);
        assert_eq!(SwingPosition::from_code(SwingPosition::Down.code()), SwingPosition::Down);
    }

    #[test]
    fn failed_sensor_values_serialize_as_null() {
        let payload = SensorPayload {
            temperature: None,
            humidity: Some(41.0),
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"temperature":null,"humidity":41.0}"#
        );
    }
}
