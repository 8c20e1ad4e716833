//! Named snapshots of the device state, stored as fixed 6-byte records.
//!
//! Layout: `[power, temp, fan, light, swing_auto, swing_pos]`. There is no
//! version tag or checksum; a record of any other length is rejected.

use std::{
    collections::HashMap,
    fmt, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    state::DeviceState,
    types::{FanSpeed, SwingPosition},
};

pub const PRESET_RECORD_LEN: usize = 6;
pub const MAX_PRESET_NAME_LEN: usize = 15;
pub const PRESETS_DIR: &str = "presets";

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("invalid preset name `{0}` (1-15 chars of A-Z, a-z, 0-9, '_' or '-')")]
    InvalidName(String),
    #[error("preset record is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("preset storage failure: {0}")]
    Storage(#[from] io::Error),
}

/// Allow-listed preset identifier, safe to use as a file name or NVS key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresetName(String);

impl PresetName {
    pub fn parse(raw: &str) -> Result<Self, PresetError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_PRESET_NAME_LEN
            && raw
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(PresetError::InvalidName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persisted subset of [`DeviceState`]. Mode is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetRecord {
    pub power: bool,
    pub temperature: u8,
    pub fan: FanSpeed,
    pub light: bool,
    pub swing_auto: bool,
    pub swing_position: SwingPosition,
}

impl PresetRecord {
    pub fn capture(state: &DeviceState) -> Self {
        let swing = state.swing();
        Self {
            power: state.power(),
            temperature: state.temperature(),
            fan: state.fan(),
            light: state.light(),
            swing_auto: swing.auto,
            swing_position: swing.position,
        }
    }

    pub fn encode(&self) -> [u8; PRESET_RECORD_LEN] {
        [
            u8::from(self.power),
            self.temperature,
            self.fan.code(),
            u8::from(self.light),
            u8::from(self.swing_auto),
            self.swing_position.code(),
        ]
    }

    pub fn decode(raw: &[u8]) -> Result<Self, PresetError> {
        let bytes: &[u8; PRESET_RECORD_LEN] =
            raw.try_into().map_err(|_| PresetError::SizeMismatch {
                expected: PRESET_RECORD_LEN,
                actual: raw.len(),
            })?;

        Ok(Self {
            power: bytes[0] != 0,
            temperature: bytes[1],
            fan: FanSpeed::from_code(bytes[2]),
            light: bytes[3] != 0,
            swing_auto: bytes[4] != 0,
            swing_position: SwingPosition::from_code(bytes[5]),
        })
    }
}

/// Slot storage behind the preset store.
pub trait PresetStorage {
    /// `Ok(None)` when no slot exists for `name`.
    fn read_slot(&self, name: &PresetName) -> io::Result<Option<Vec<u8>>>;

    fn write_slot(&mut self, name: &PresetName, record: &[u8]) -> io::Result<()>;
}

impl<T: PresetStorage + ?Sized> PresetStorage for Box<T> {
    fn read_slot(&self, name: &PresetName) -> io::Result<Option<Vec<u8>>> {
        (**self).read_slot(name)
    }

    fn write_slot(&mut self, name: &PresetName, record: &[u8]) -> io::Result<()> {
        (**self).write_slot(name, record)
    }
}

/// One file per preset under `<root>/presets/`.
#[derive(Debug, Clone)]
pub struct DirStorage {
    dir: PathBuf,
}

impl DirStorage {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join(PRESETS_DIR),
        }
    }

    pub fn slot_path(&self, name: &PresetName) -> PathBuf {
        self.dir.join(name.as_str())
    }
}

impl PresetStorage for DirStorage {
    fn read_slot(&self, name: &PresetName) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.slot_path(name)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_slot(&mut self, name: &PresetName, record: &[u8]) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.slot_path(name), record)
    }
}

/// Volatile slots; contents are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: HashMap<PresetName, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes without going through the record encoder.
    pub fn insert_raw(&mut self, name: PresetName, raw: Vec<u8>) {
        self.slots.insert(name, raw);
    }
}

impl PresetStorage for MemoryStorage {
    fn read_slot(&self, name: &PresetName) -> io::Result<Option<Vec<u8>>> {
        Ok(self.slots.get(name).cloned())
    }

    fn write_slot(&mut self, name: &PresetName, record: &[u8]) -> io::Result<()> {
        self.slots.insert(name.clone(), record.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PresetStore<S> {
    storage: S,
}

impl<S: PresetStorage> PresetStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn save(&mut self, name: &PresetName, state: &DeviceState) -> Result<(), PresetError> {
        let record = PresetRecord::capture(state).encode();
        self.storage.write_slot(name, &record)?;
        Ok(())
    }

    pub fn load(&self, name: &PresetName) -> Result<Option<PresetRecord>, PresetError> {
        match self.storage.read_slot(name)? {
            Some(raw) => PresetRecord::decode(&raw).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(raw: &str) -> PresetName {
        PresetName::parse(raw).unwrap()
    }

    #[test]
    fn rejects_names_outside_allow_list() {
        for raw in ["", "../etc", "a/b", "with space", "sixteen_chars_xx", ".hidden"] {
            assert!(
                matches!(PresetName::parse(raw), Err(PresetError::InvalidName(_))),
                "{raw:?} should be rejected"
            );
        }
        assert_eq!(name("night-mode_2").as_str(), "night-mode_2");
    }

    #[test]
    fn record_layout_is_fixed() {
        let mut state = DeviceState::default();
        state.set_fan(FanSpeed::Med);
        state.set_swing(false, SwingPosition::Up);
        state.set_light(false);

        assert_eq!(PresetRecord::capture(&state).encode(), [1, 25, 2, 0, 0, 2]);
    }

    #[test]
    fn out_of_range_codes_decode_to_defaults() {
        let record = PresetRecord::decode(&[2, 22, 9, 1, 7, 1]).unwrap();
        assert!(record.power);
        assert!(record.swing_auto);
        assert_eq!(record.fan, FanSpeed::Auto);
        assert_eq!(record.swing_position, SwingPosition::LastPos);
    }

    #[test]
    fn wrong_size_is_rejected() {
        let mut storage = MemoryStorage::new();
        storage.insert_raw(name("short"), vec![1, 2, 3]);
        storage.insert_raw(name("long"), vec![0; PRESET_RECORD_LEN + 1]);
        let store = PresetStore::new(storage);

        assert!(matches!(
            store.load(&name("short")),
            Err(PresetError::SizeMismatch {
                expected: PRESET_RECORD_LEN,
                actual: 3
            })
        ));
        assert!(matches!(
            store.load(&name("long")),
            Err(PresetError::SizeMismatch { actual: 7, .. })
        ));
    }

    #[test]
    fn save_then_load() {
        let mut store = PresetStore::new(MemoryStorage::new());
        let mut state = DeviceState::default();
        state.set_temperature(19);
        state.set_power(false);

        store.save(&name("p1"), &state).unwrap();
        assert_eq!(store.load(&name("p1")).unwrap(), Some(PresetRecord::capture(&state)));
        assert_eq!(store.load(&name("p2")).unwrap(), None);
    }

    #[test]
    fn dir_storage_round_trip() {
        let root = std::env::temp_dir().join(format!("ac-remote-presets-{}", std::process::id()));
        let mut store = PresetStore::new(DirStorage::new(&root));

        assert_eq!(store.load(&name("missing")).unwrap(), None);
        store.save(&name("evening"), &DeviceState::default()).unwrap();

        let path = store.storage().slot_path(&name("evening"));
        assert!(path.starts_with(root.join(PRESETS_DIR)));
        assert_eq!(std::fs::read(&path).unwrap().len(), PRESET_RECORD_LEN);
        assert!(store.load(&name("evening")).unwrap().is_some());

        let _ = std::fs::remove_dir_all(root);
    }
}
