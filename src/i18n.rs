//! Localization: embedded language packs and key lookup.

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "i18n/"]
struct Localizations;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Language {
    En,
    Fa,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Fa];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fa => "fa",
        }
    }

    /// Unknown codes fall back to English.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "fa" => Language::Fa,
            _ => Language::En,
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Fa => "فارسی",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Language::En => Language::Fa,
            Language::Fa => Language::En,
        }
    }
}

type Pack = HashMap<String, String>;

static PACKS: Lazy<HashMap<Language, Pack>> = Lazy::new(|| {
    Language::ALL
        .iter()
        .map(|&language| (language, load_pack(language)))
        .collect()
});

fn load_pack(language: Language) -> Pack {
    let name = format!("{}.json", language.code());
    match Localizations::get(&name) {
        Some(file) => match serde_json::from_slice(&file.data) {
            Ok(pack) => pack,
            Err(e) => {
                log::error!("Failed to parse language pack {}: {}", name, e);
                Pack::new()
            }
        },
        None => {
            log::error!("Language pack {} is not embedded", name);
            Pack::new()
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Translator {
    language: Language,
}

impl Translator {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// Looks `key` up in the active pack, falling back to the key itself.
    pub fn tr<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match PACKS.get(&self.language).and_then(|pack| pack.get(key)) {
            Some(text) => Cow::Borrowed(text.as_str()),
            None => Cow::Borrowed(key),
        }
    }

    /// Display name of a cube type; user-defined names are shown as typed.
    pub fn cube_name<'a>(&self, cube: &'a str) -> Cow<'a, str> {
        let key = format!("cube-{}", cube);
        match PACKS.get(&self.language).and_then(|pack| pack.get(&key)) {
            Some(text) => Cow::Borrowed(text.as_str()),
            None => Cow::Borrowed(cube),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("fa"), Language::Fa);
        assert_eq!(Language::from_code(" FA "), Language::Fa);
        assert_eq!(Language::from_code("en"), Language::En);
        assert_eq!(Language::from_code("de"), Language::En);
        assert_eq!(Language::En.next(), Language::Fa);
        assert_eq!(Language::Fa.next().code(), "en");
    }

    #[test]
    fn test_lookup_and_fallback() {
        let en = Translator::new(Language::En);
        assert_eq!(en.tr("tap-to-start"), "Tap or Hold to start");
        assert_eq!(en.tr("no-such-key"), "no-such-key");

        let fa = Translator::new(Language::Fa);
        assert_ne!(fa.tr("tap-to-start"), "tap-to-start");
        assert_eq!(fa.tr("no-such-key"), "no-such-key");
    }

    #[test]
    fn test_cube_names() {
        let en = Translator::new(Language::En);
        assert_eq!(en.cube_name("3x3"), "3x3");
        let fa = Translator::new(Language::Fa);
        assert_eq!(fa.cube_name("3x3"), "۳×۳");
        assert_eq!(fa.cube_name("Pyraminx"), "پیرامینکس");
        assert_eq!(fa.cube_name("My Mirror Cube"), "My Mirror Cube");
        assert_eq!(fa.cube_name("???"), "???");
    }

    #[test]
    fn test_packs_cover_the_same_keys() {
        let en = &PACKS[&Language::En];
        let fa = &PACKS[&Language::Fa];
        assert!(!en.is_empty());
        for key in en.keys() {
            assert!(fa.contains_key(key), "fa pack is missing {}", key);
        }
    }
}
