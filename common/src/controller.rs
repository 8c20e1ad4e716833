use thiserror::Error;

use crate::{
    form::FormParams,
    gree::GreeFrame,
    preset::{PresetError, PresetName, PresetRecord, PresetStorage, PresetStore},
    scheduler::TransmitScheduler,
    state::{clamp_temperature, DeviceState},
    types::{AcMode, AcStatePayload, FanSpeed, SwingPosition},
};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("missing '{0}' parameter")]
    MissingParameter(&'static str),
    #[error(transparent)]
    Preset(#[from] PresetError),
}

impl CommandError {
    /// HTTP status the handlers answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingParameter(_) | Self::Preset(PresetError::InvalidName(_)) => 400,
            Self::Preset(_) => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Power,
    Temperature,
    Fan,
    Light,
    Swing,
    SwingPosition,
    Mode,
    SavePreset,
    LoadPreset,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Command::Power,
        Command::Temperature,
        Command::Fan,
        Command::Light,
        Command::Swing,
        Command::SwingPosition,
        Command::Mode,
        Command::SavePreset,
        Command::LoadPreset,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Self::Power => "/ac/power",
            Self::Temperature => "/ac/temp",
            Self::Fan => "/ac/fan",
            Self::Light => "/ac/light",
            Self::Swing => "/ac/swing",
            Self::SwingPosition => "/ac/swingPos",
            Self::Mode => "/ac/mode",
            Self::SavePreset => "/ac/savePreset",
            Self::LoadPreset => "/ac/loadPreset",
        }
    }

    /// Form field carrying the command's value.
    pub fn field(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Temperature => "temp",
            Self::Fan => "fan",
            Self::Light => "light",
            Self::Swing => "swing",
            Self::SwingPosition => "pos",
            Self::Mode => "mode",
            Self::SavePreset | Self::LoadPreset => "name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    NotFound,
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    PresetSaved(PresetName),
    PresetLoaded(PresetName, LoadOutcome),
}

/// Owns the device state, its presets and the pending transmission.
pub struct RemoteController<S> {
    state: DeviceState,
    presets: PresetStore<S>,
    scheduler: TransmitScheduler,
}

impl<S: PresetStorage> RemoteController<S> {
    pub fn new(storage: S) -> Self {
        Self::with_state(DeviceState::default(), storage)
    }

    pub fn with_state(state: DeviceState, storage: S) -> Self {
        Self {
            state,
            presets: PresetStore::new(storage),
            scheduler: TransmitScheduler::new(),
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn state_payload(&self) -> AcStatePayload {
        self.state.payload()
    }

    pub fn presets(&self) -> &PresetStore<S> {
        &self.presets
    }

    pub fn presets_mut(&mut self) -> &mut PresetStore<S> {
        &mut self.presets
    }

    /// Looks up the command's field in `form` and applies it.
    pub fn execute(
        &mut self,
        command: Command,
        form: &FormParams,
    ) -> Result<CommandOutcome, CommandError> {
        let value = form
            .get(command.field())
            .ok_or(CommandError::MissingParameter(command.field()))?;

        match command {
            Command::Power => self.set_power(value),
            Command::Temperature => self.set_temperature(value),
            Command::Fan => self.set_fan(value),
            Command::Light => self.set_light(value),
            Command::Swing => self.set_swing(value),
            Command::SwingPosition => self.set_swing_position(value),
            Command::Mode => self.set_mode(value),
            Command::SavePreset => return self.save_preset(value).map(CommandOutcome::PresetSaved),
            Command::LoadPreset => {
                let name = PresetName::parse(value)?;
                let outcome = self.load_preset(&name)?;
                return Ok(CommandOutcome::PresetLoaded(name, outcome));
            }
        }

        Ok(CommandOutcome::Applied)
    }

    pub fn set_power(&mut self, value: &str) {
        self.state.set_power(value == "on");
        self.scheduler.enqueue();
    }

    pub fn set_temperature(&mut self, value: &str) {
        self.state
            .set_temperature(clamp_temperature(parse_leading_int(value)));
        self.scheduler.enqueue();
    }

    pub fn set_fan(&mut self, value: &str) {
        self.state.set_fan(FanSpeed::from_label(value));
        self.scheduler.enqueue();
    }

    pub fn set_light(&mut self, value: &str) {
        self.state.set_light(value == "on");
        self.scheduler.enqueue();
    }

    pub fn set_swing(&mut self, value: &str) {
        self.state.set_swing(value == "on", SwingPosition::LastPos);
        self.scheduler.enqueue();
    }

    pub fn set_swing_position(&mut self, value: &str) {
        self.state.set_swing(false, SwingPosition::from_label(value));
        self.scheduler.enqueue();
    }

    pub fn set_mode(&mut self, value: &str) {
        self.state.set_mode(AcMode::from_label(value));
        self.scheduler.enqueue();
    }

    /// Persists the current state under `value`. Nothing is transmitted.
    pub fn save_preset(&mut self, value: &str) -> Result<PresetName, CommandError> {
        let name = PresetName::parse(value)?;
        self.presets.save(&name, &self.state)?;
        Ok(name)
    }

    /// Applies a stored preset. A transmission is queued whatever the
    /// outcome, matching the remote's behaviour of always re-sending.
    pub fn load_preset(&mut self, name: &PresetName) -> Result<LoadOutcome, CommandError> {
        let outcome = match self.presets.load(name) {
            Ok(Some(record)) => {
                self.apply_record(&record);
                LoadOutcome::Applied
            }
            Ok(None) => LoadOutcome::NotFound,
            Err(PresetError::SizeMismatch { expected, actual }) => {
                LoadOutcome::SizeMismatch { expected, actual }
            }
            Err(err) => return Err(err.into()),
        };

        self.scheduler.enqueue();
        Ok(outcome)
    }

    fn apply_record(&mut self, record: &PresetRecord) {
        self.state.set_power(record.power);
        self.state
            .set_temperature(clamp_temperature(i64::from(record.temperature)));
        self.state.set_fan(record.fan);
        self.state.set_light(record.light);
        self.state
            .set_swing(record.swing_auto, record.swing_position);
    }

    pub fn is_transmit_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Run-loop drain step: encodes the state as it is now, once per batch
    /// of enqueued changes.
    pub fn take_pending_frame(&mut self) -> Option<GreeFrame> {
        self.scheduler
            .take()
            .then(|| GreeFrame::from_state(&self.state))
    }
}

/// Leading optional sign and digits, `0` when there are none.
fn parse_leading_int(value: &str) -> i64 {
    let trimmed = value.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0_i64, |acc, digit| {
            acc.saturating_mul(10)
                .saturating_add(i64::from(digit - b'0'))
        });

    if negative {
        -magnitude
    } else {
        magnitude
    }
}
