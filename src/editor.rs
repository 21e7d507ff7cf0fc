//! Rows of the settings screen and how each one is adjusted.

use crate::i18n::Translator;
use crate::model::Settings;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SettingsField {
    Language,
    InspectionTimer,
    SaveUnknownSolves,
    DisplayDuration,
    InspectionTime,
    InspectionDelay,
}

impl SettingsField {
    pub const ALL: [SettingsField; 6] = [
        SettingsField::Language,
        SettingsField::InspectionTimer,
        SettingsField::SaveUnknownSolves,
        SettingsField::DisplayDuration,
        SettingsField::InspectionTime,
        SettingsField::InspectionDelay,
    ];

    pub fn label_key(self) -> &'static str {
        match self {
            SettingsField::Language => "language",
            SettingsField::InspectionTimer => "inspection-timer",
            SettingsField::SaveUnknownSolves => "save-unknown-solves",
            SettingsField::DisplayDuration => "timer-display-duration",
            SettingsField::InspectionTime => "inspection-time",
            SettingsField::InspectionDelay => "inspection-delay",
        }
    }

    pub fn value_text(self, settings: &Settings, tr: &Translator) -> String {
        let on_off = |on: bool| tr.tr(if on { "on" } else { "off" }).into_owned();
        match self {
            SettingsField::Language => settings.language().native_name().to_string(),
            SettingsField::InspectionTimer => on_off(settings.enabled_features.inspection_timer),
            SettingsField::SaveUnknownSolves => on_off(settings.enabled_features.save_unknown_solves),
            SettingsField::DisplayDuration => settings.timer_display_duration.to_string(),
            SettingsField::InspectionTime => settings.inspection_time.to_string(),
            SettingsField::InspectionDelay => settings.inspection_delay.to_string(),
        }
    }

    /// Steps the value up (`up = true`) or down. Toggles ignore the direction.
    pub fn adjust(self, settings: &mut Settings, up: bool) {
        match self {
            SettingsField::Language => {
                settings.language = settings.language().next().code().to_string();
            }
            SettingsField::InspectionTimer => {
                let features = &mut settings.enabled_features;
                features.inspection_timer = !features.inspection_timer;
            }
            SettingsField::SaveUnknownSolves => {
                let features = &mut settings.enabled_features;
                features.save_unknown_solves = !features.save_unknown_solves;
            }
            SettingsField::DisplayDuration => {
                settings.timer_display_duration = step(settings.timer_display_duration, 100, 100, up);
            }
            SettingsField::InspectionTime => {
                let secs = step(u64::from(settings.inspection_time), 1, 1, up);
                settings.inspection_time = u32::try_from(secs).unwrap_or(u32::MAX);
            }
            SettingsField::InspectionDelay => {
                settings.inspection_delay = step(settings.inspection_delay, 50, 50, up);
            }
        }
    }
}

fn step(value: u64, by: u64, min: u64, up: bool) -> u64 {
    if up {
        value.saturating_add(by)
    } else {
        value.saturating_sub(by).max(min)
    }
}
