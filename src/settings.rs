//SPDX-License-Identifier: MPL-2.0

/*!
Presentation preferences: fullscreen, zoom, sound and music.

Settings are shared between the host thread (script reads and writes them) and pool
workers (which persist them), so each field is an atomic.  On disk they are a flat
`key=value` file.
*/

use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use atomic_float::AtomicF64;

use crate::error::Error;
use crate::value::Value;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Int32,
    Double,
}

/// The fixed table of presentation settings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SettingField {
    Fullscreen,
    Zoom,
    SoundEffects,
    SoundVolume,
    Music,
    MusicVolume,
}

impl SettingField {
    pub const ALL: [SettingField; 6] = [
        SettingField::Fullscreen,
        SettingField::Zoom,
        SettingField::SoundEffects,
        SettingField::SoundVolume,
        SettingField::Music,
        SettingField::MusicVolume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SettingField::Fullscreen => "fullscreen",
            SettingField::Zoom => "zoom",
            SettingField::SoundEffects => "soundEffects",
            SettingField::SoundVolume => "soundVolume",
            SettingField::Music => "music",
            SettingField::MusicVolume => "musicVolume",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            SettingField::Fullscreen | SettingField::SoundEffects | SettingField::Music => FieldKind::Int32,
            SettingField::Zoom | SettingField::SoundVolume | SettingField::MusicVolume => FieldKind::Double,
        }
    }

    /// Case-insensitive lookup.
    pub fn lookup(name: &str) -> Result<SettingField, Error> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::FieldNotFound(name.to_string()))
    }
}

fn coerce_int(value: &Value) -> Result<i32, Error> {
    let from_double = |d: f64| {
        let rounded = d.round();
        if rounded.is_finite() && rounded >= i32::MIN as f64 && rounded <= i32::MAX as f64 {
            Ok(rounded as i32)
        } else {
            Err(Error::invalid_argument(format!("{d} does not fit a 32-bit integer")))
        }
    };
    match value {
        Value::Bool(b) => Ok(*b as i32),
        Value::Int(i) => Ok(*i),
        Value::Double(d) => from_double(*d),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i32>() {
                Ok(i) => Ok(i),
                Err(_) => s
                    .parse::<f64>()
                    .map_err(|_| Error::invalid_argument(format!("{s:?} is not a number")))
                    .and_then(from_double),
            }
        }
        other => Err(Error::invalid_argument(format!("{other:?} is not an integer"))),
    }
}

fn coerce_double(value: &Value) -> Result<f64, Error> {
    match value {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Int(i) => Ok(*i as f64),
        Value::Double(d) => Ok(*d),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::invalid_argument(format!("{s:?} is not a number"))),
        other => Err(Error::invalid_argument(format!("{other:?} is not a number"))),
    }
}

enum Slot<'a> {
    Int(&'a AtomicI32),
    Double(&'a AtomicF64),
}

#[derive(Debug)]
pub struct PresentationSettings {
    fullscreen: AtomicI32,
    zoom: AtomicF64,
    sound_effects: AtomicI32,
    sound_volume: AtomicF64,
    music: AtomicI32,
    music_volume: AtomicF64,
    modified: AtomicBool,
}

impl Default for PresentationSettings {
    fn default() -> Self {
        PresentationSettings {
            fullscreen: AtomicI32::new(1),
            zoom: AtomicF64::new(1.0),
            sound_effects: AtomicI32::new(1),
            sound_volume: AtomicF64::new(1.0),
            music: AtomicI32::new(1),
            music_volume: AtomicF64::new(1.0),
            modified: AtomicBool::new(false),
        }
    }
}

impl PresentationSettings {
    fn slot(&self, field: SettingField) -> Slot<'_> {
        match field {
            SettingField::Fullscreen => Slot::Int(&self.fullscreen),
            SettingField::Zoom => Slot::Double(&self.zoom),
            SettingField::SoundEffects => Slot::Int(&self.sound_effects),
            SettingField::SoundVolume => Slot::Double(&self.sound_volume),
            SettingField::Music => Slot::Int(&self.music),
            SettingField::MusicVolume => Slot::Double(&self.music_volume),
        }
    }

    pub fn field(&self, field: SettingField) -> Value {
        match self.slot(field) {
            Slot::Int(i) => Value::Int(i.load(Ordering::Relaxed)),
            Slot::Double(d) => Value::Double(d.load(Ordering::Relaxed)),
        }
    }

    /// Coerces `value` to the field's type and stores it.  Does not mark settings modified.
    fn store(&self, field: SettingField, value: &Value) -> Result<(), Error> {
        match self.slot(field) {
            Slot::Int(i) => i.store(coerce_int(value)?, Ordering::Relaxed),
            Slot::Double(d) => d.store(coerce_double(value)?, Ordering::Relaxed),
        }
        Ok(())
    }

    /// Reads a setting by case-insensitive name.
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        Ok(self.field(SettingField::lookup(name)?))
    }

    /// Writes a setting by case-insensitive name, coercing `value` to the field's type.
    pub fn set(&self, name: &str, value: &Value) -> Result<(), Error> {
        self.store(SettingField::lookup(name)?, value)?;
        self.modified.store(true, Ordering::Release);
        Ok(())
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::Relaxed) != 0
    }

    /// Whether script changed any setting since load.
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Renders every field as `key=value` lines.
    pub fn to_ini(&self) -> String {
        let mut out = String::new();
        for field in SettingField::ALL {
            match self.field(field) {
                Value::Int(i) => {
                    let _ = writeln!(out, "{}={i}", field.name());
                }
                Value::Double(d) => {
                    let _ = writeln!(out, "{}={d}", field.name());
                }
                _ => {}
            }
        }
        out
    }

    /**
    Parses `key=value` lines over the defaults.

    Blank lines, `;`/`#` comments, section headers and unknown keys are ignored.  A value
    that doesn't parse leaves that field at its default.
    */
    pub fn from_ini(text: &str) -> PresentationSettings {
        let settings = PresentationSettings::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                logwise::warn_sync!("Ignoring malformed settings line {line}", line = logwise::privacy::LogIt(line));
                continue;
            };
            let Ok(field) = SettingField::lookup(key.trim()) else {
                logwise::debuginternal_sync!("Ignoring unknown setting {key}", key = logwise::privacy::LogIt(key));
                continue;
            };
            let value = value.trim();
            let parsed = match field.kind() {
                FieldKind::Int32 => value.parse::<i32>().ok().map(Value::Int),
                FieldKind::Double => value.parse::<f64>().ok().map(Value::Double),
            }
            .is_some_and(|v| settings.store(field, &v).is_ok());
            if !parsed {
                logwise::warn_sync!(
                    "Setting {key} has unusable value {value}; keeping the default",
                    key = logwise::privacy::LogIt(field.name()),
                    value = logwise::privacy::LogIt(value)
                );
            }
        }
        settings
    }

    /// Loads settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<PresentationSettings, Error> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::from_ini(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PresentationSettings::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ini())?;
        logwise::info_sync!("Saved presentation settings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = PresentationSettings::default();
        assert!(s.fullscreen());
        assert_eq!(s.get("zoom").unwrap(), Value::Double(1.0));
        assert_eq!(s.get("music").unwrap(), Value::Int(1));
        assert!(!s.is_modified());
    }

    #[test]
    fn names_are_case_insensitive() {
        let s = PresentationSettings::default();
        s.set("SOUNDVOLUME", &Value::Double(0.25)).unwrap();
        assert_eq!(s.get("soundVolume").unwrap(), Value::Double(0.25));
        assert!(s.is_modified());
    }

    #[test]
    fn values_are_coerced() {
        let s = PresentationSettings::default();
        s.set("fullscreen", &Value::Bool(false)).unwrap();
        assert_eq!(s.get("fullscreen").unwrap(), Value::Int(0));
        s.set("music", &Value::String("0".into())).unwrap();
        assert_eq!(s.get("music").unwrap(), Value::Int(0));
        s.set("zoom", &Value::Int(2)).unwrap();
        assert_eq!(s.get("zoom").unwrap(), Value::Double(2.0));
        s.set("soundEffects", &Value::Double(0.6)).unwrap();
        assert_eq!(s.get("soundEffects").unwrap(), Value::Int(1));
        assert!(matches!(s.set("zoom", &Value::String("big".into())), Err(Error::InvalidArgument(_))));
        assert!(matches!(s.set("zoom", &Value::Empty), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn unknown_names_are_field_not_found() {
        let s = PresentationSettings::default();
        assert!(matches!(s.get("brightness"), Err(Error::FieldNotFound(_))));
        assert!(matches!(s.set("brightness", &Value::Int(1)), Err(Error::FieldNotFound(_))));
        assert!(!s.is_modified());
    }

    #[test]
    fn ini_parsing_is_forgiving() {
        let s = PresentationSettings::from_ini(
            "; comment\n[settings]\n\nfullscreen=0\nzoom = 1.5\nmusic=loud\nvolume=3\n# done\nnonsense\n",
        );
        assert!(!s.fullscreen());
        assert_eq!(s.get("zoom").unwrap(), Value::Double(1.5));
        assert_eq!(s.get("music").unwrap(), Value::Int(1));
        assert!(!s.is_modified());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.ini");
        let s = PresentationSettings::default();
        s.set("musicVolume", &Value::Double(0.5)).unwrap();
        s.set("fullscreen", &Value::Int(0)).unwrap();
        s.save(&path).unwrap();
        let loaded = PresentationSettings::load(&path).unwrap();
        assert_eq!(loaded.get("musicVolume").unwrap(), Value::Double(0.5));
        assert!(!loaded.fullscreen());
    }

    #[test]
    fn missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = PresentationSettings::load(&dir.path().join("absent.ini")).unwrap();
        assert!(loaded.fullscreen());
    }
}
