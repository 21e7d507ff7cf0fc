use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use timer_core::machine::{
    DEFAULT_DISPLAY_HOLD_MS, DEFAULT_INSPECTION_DELAY_MS, DEFAULT_INSPECTION_SECS,
};
use timer_core::MachineConfig;

use crate::i18n::Language;

/// Cube type used when the user has not picked one.
pub const UNKNOWN_CUBE: &str = "???";

pub const DEFAULT_CUBE_TYPES: [&str; 9] = [
    "2x2", "3x3", "4x4", "5x5", "Pyraminx", "Megaminx", "Skewb", "Square-1", "Clock",
];

/// One persisted solve. `id` is assigned by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub cube: String,
    #[serde(deserialize_with = "de_millis")]
    pub ms: u64,
    #[serde(default)]
    pub record: bool,
    #[serde(default)]
    pub timestamp: String,
}

/// Body of `POST /times`: a solve before the backend has assigned an id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewSolve {
    pub cube: String,
    pub ms: u64,
    pub record: bool,
    /// Left out when unknown so the backend stamps the solve itself.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
}

impl From<&SolveEntry> for NewSolve {
    fn from(entry: &SolveEntry) -> Self {
        Self {
            cube: entry.cube.clone(),
            ms: entry.ms,
            record: entry.record,
            timestamp: entry.timestamp.clone(),
        }
    }
}

fn millis_from_f64(value: f64) -> Option<u64> {
    if value.is_finite() && value >= 0.0 {
        Some(value.floor() as u64)
    } else {
        None
    }
}

/// Accepts integer or fractional milliseconds; other clients store
/// sub-millisecond readings.
pub fn de_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    millis_from_f64(raw).ok_or_else(|| D::Error::custom(format!("invalid duration {}", raw)))
}

/// Best time in milliseconds per cube type.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RecordMap(BTreeMap<String, u64>);

impl<'de> Deserialize<'de> for RecordMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(cube, value)| match millis_from_f64(value) {
                Some(ms) => Ok((cube, ms)),
                None => Err(D::Error::custom(format!("invalid record for {}", cube))),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(RecordMap)
    }
}

impl RecordMap {
    pub fn get(&self, cube: &str) -> Option<u64> {
        self.0.get(cube).copied()
    }

    /// True when `ms` would become the record for `cube`.
    pub fn is_improvement(&self, cube: &str, ms: u64) -> bool {
        match self.get(cube) {
            Some(best) => ms < best,
            None => true,
        }
    }

    /// Stores `ms` if it beats the current record. Returns whether it did.
    pub fn improve(&mut self, cube: &str, ms: u64) -> bool {
        if self.is_improvement(cube, ms) {
            self.0.insert(cube.to_string(), ms);
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(cube, ms)| (cube.as_str(), *ms))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(String, u64)> for RecordMap {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        RecordMap(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnabledFeatures {
    pub inspection_timer: bool,
    pub save_unknown_solves: bool,
}

impl Default for EnabledFeatures {
    fn default() -> Self {
        Self {
            inspection_timer: true,
            save_unknown_solves: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub language: String,
    pub enabled_features: EnabledFeatures,
    /// Post-stop display hold in milliseconds.
    pub timer_display_duration: u64,
    /// Inspection countdown length in seconds.
    pub inspection_time: u32,
    /// Hold threshold in milliseconds that separates a tap from a hold.
    pub inspection_delay: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: Language::En.code().to_string(),
            enabled_features: EnabledFeatures::default(),
            timer_display_duration: DEFAULT_DISPLAY_HOLD_MS,
            inspection_time: DEFAULT_INSPECTION_SECS,
            inspection_delay: DEFAULT_INSPECTION_DELAY_MS,
        }
    }
}

impl Settings {
    /// Zero numbers and unknown languages fall back to the defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = Settings::default();
        self.language = Language::from_code(&self.language).code().to_string();
        if self.timer_display_duration == 0 {
            self.timer_display_duration = defaults.timer_display_duration;
        }
        if self.inspection_time == 0 {
            self.inspection_time = defaults.inspection_time;
        }
        if self.inspection_delay == 0 {
            self.inspection_delay = defaults.inspection_delay;
        }
        self
    }

    pub fn language(&self) -> Language {
        Language::from_code(&self.language)
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            inspection_enabled: self.enabled_features.inspection_timer,
            inspection_delay_ms: self.inspection_delay,
            inspection_secs: self.inspection_time,
            display_hold_ms: self.timer_display_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_solve_entry_accepts_fractional_ms() {
        let entry: SolveEntry = serde_json::from_value(json!({
            "id": 4,
            "cube": "3x3",
            "ms": 12345.678,
            "record": true,
            "timestamp": "2024-05-01T10:00:00.000Z"
        }))
        .unwrap();
        assert_eq!(entry.id, Some(4));
        assert_eq!(entry.ms, 12_345);
        assert!(entry.record);
    }

    #[test]
    fn test_solve_entry_rejects_negative_ms() {
        let parsed = serde_json::from_value::<SolveEntry>(json!({"cube": "3x3", "ms": -1}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_new_solve_has_no_id() {
        let body = serde_json::to_value(NewSolve {
            cube: "2x2".into(),
            ms: 950,
            record: false,
            timestamp: "t".into(),
        })
        .unwrap();
        assert_eq!(body, json!({"cube": "2x2", "ms": 950, "record": false, "timestamp": "t"}));
    }

    #[test]
    fn test_record_map_improve() {
        let mut records = RecordMap::default();
        assert!(records.improve("3x3", 20_000));
        assert!(!records.improve("3x3", 20_000));
        assert!(!records.improve("3x3", 25_000));
        assert!(records.improve("3x3", 19_999));
        assert_eq!(records.get("3x3"), Some(19_999));
        assert_eq!(records.get("2x2"), None);
    }

    #[test]
    fn test_record_map_round_trips_as_plain_object() {
        let records: RecordMap = serde_json::from_value(json!({"3x3": 9000.9, "Skewb": 4000})).unwrap();
        assert_eq!(records.get("3x3"), Some(9_000));
        assert_eq!(serde_json::to_value(&records).unwrap(), json!({"3x3": 9000, "Skewb": 4000}));
    }

    #[test]
    fn test_settings_wire_names_and_defaults() {
        let settings: Settings = serde_json::from_value(json!({
            "language": "fa",
            "enabledFeatures": {"inspectionTimer": false}
        }))
        .unwrap();
        assert_eq!(settings.language(), Language::Fa);
        assert!(!settings.enabled_features.inspection_timer);
        assert!(settings.enabled_features.save_unknown_solves);
        assert_eq!(settings.timer_display_duration, 1500);
        assert_eq!(settings.inspection_time, 15);
        assert_eq!(settings.inspection_delay, 200);

        let value = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(value["enabledFeatures"]["saveUnknownSolves"], json!(true));
        assert_eq!(value["timerDisplayDuration"], json!(1500));
    }

    #[test]
    fn test_settings_normalized() {
        let settings = Settings {
            language: "de".into(),
            timer_display_duration: 0,
            inspection_time: 0,
            inspection_delay: 0,
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_machine_config_from_settings() {
        let settings = Settings {
            inspection_time: 8,
            inspection_delay: 350,
            timer_display_duration: 2000,
            ..Settings::default()
        };
        let config = settings.machine_config();
        assert!(config.inspection_enabled);
        assert_eq!(config.inspection_secs, 8);
        assert_eq!(config.inspection_delay_ms, 350);
        assert_eq!(config.display_hold_ms, 2000);
    }
}
