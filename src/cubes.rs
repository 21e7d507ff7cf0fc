use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{DEFAULT_CUBE_TYPES, UNKNOWN_CUBE};

/// Validation failures, rejected before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CubeNameError {
    #[error("cube name is empty")]
    Empty,

    #[error("cube {0} already exists")]
    Duplicate(String),

    #[error("cube {0} not found")]
    NotFound(String),
}

impl CubeNameError {
    /// Translation key for the inline message.
    pub fn key(&self) -> &'static str {
        match self {
            CubeNameError::Empty => "enter-new-name",
            CubeNameError::Duplicate(_) => "name-already-exists",
            CubeNameError::NotFound(_) => "cube-not-found",
        }
    }
}

/// Ordered cube type identifiers without duplicates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CubeTypeList {
    names: Vec<String>,
}

impl From<Vec<String>> for CubeTypeList {
    fn from(raw: Vec<String>) -> Self {
        let mut list = CubeTypeList { names: Vec::with_capacity(raw.len()) };
        for name in raw {
            if !list.contains(&name) {
                list.names.push(name);
            }
        }
        list
    }
}

impl From<CubeTypeList> for Vec<String> {
    fn from(list: CubeTypeList) -> Self {
        list.names
    }
}

impl Default for CubeTypeList {
    fn default() -> Self {
        DEFAULT_CUBE_TYPES
            .iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>()
            .into()
    }
}

impl CubeTypeList {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Trims `raw` and checks it can be added. The unknown sentinel is
    /// always taken.
    pub fn validate_new(&self, raw: &str) -> Result<String, CubeNameError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(CubeNameError::Empty);
        }
        if name == UNKNOWN_CUBE || self.contains(name) {
            return Err(CubeNameError::Duplicate(name.to_string()));
        }
        Ok(name.to_string())
    }

    pub fn validate_rename(&self, old: &str, raw_new: &str) -> Result<String, CubeNameError> {
        if old.is_empty() {
            return Err(CubeNameError::Empty);
        }
        if !self.contains(old) {
            return Err(CubeNameError::NotFound(old.to_string()));
        }
        self.validate_new(raw_new)
    }

    pub fn add(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.names.len();
        self.names.retain(|n| n != name);
        self.names.len() != before
    }

    /// Renames in place, keeping the position.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if self.contains(new) {
            return false;
        }
        match self.position(old) {
            Some(index) => {
                self.names[index] = new.to_string();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&str]) -> CubeTypeList {
        names.iter().map(|n| n.to_string()).collect::<Vec<_>>().into()
    }

    #[test]
    fn test_defaults() {
        let cubes = CubeTypeList::default();
        assert_eq!(cubes.len(), 9);
        assert_eq!(cubes.get(0), Some("2x2"));
        assert_eq!(cubes.get(8), Some("Clock"));
    }

    #[test]
    fn test_duplicates_are_dropped_on_load() {
        let cubes: CubeTypeList = serde_json::from_str(r#"["3x3","2x2","3x3"]"#).unwrap();
        assert_eq!(cubes.names(), &["3x3".to_string(), "2x2".to_string()]);
        assert_eq!(serde_json::to_string(&cubes).unwrap(), r#"["3x3","2x2"]"#);
    }

    #[test]
    fn test_validate_new() {
        let cubes = list(&["3x3"]);
        assert_eq!(cubes.validate_new("  Mirror  "), Ok("Mirror".to_string()));
        assert_eq!(cubes.validate_new("   "), Err(CubeNameError::Empty));
        assert_eq!(cubes.validate_new(" 3x3"), Err(CubeNameError::Duplicate("3x3".into())));
        assert_eq!(CubeNameError::Empty.key(), "enter-new-name");
    }

    #[test]
    fn test_validate_rename() {
        let cubes = list(&["3x3", "4x4"]);
        assert_eq!(cubes.validate_rename("3x3", "3x3 OH"), Ok("3x3 OH".to_string()));
        assert_eq!(cubes.validate_rename("3x3", "4x4"), Err(CubeNameError::Duplicate("4x4".into())));
        assert_eq!(cubes.validate_rename("7x7", "8x8"), Err(CubeNameError::NotFound("7x7".into())));
        assert_eq!(cubes.validate_rename("", "8x8"), Err(CubeNameError::Empty));
        assert_eq!(cubes.validate_rename("3x3", ""), Err(CubeNameError::Empty));
    }

    #[test]
    fn test_unknown_sentinel_is_reserved() {
        let cubes = list(&["3x3"]);
        assert_eq!(cubes.validate_new(" ??? "), Err(CubeNameError::Duplicate("???".into())));
        assert_eq!(cubes.validate_rename("3x3", "???"), Err(CubeNameError::Duplicate("???".into())));
        assert_eq!(cubes.validate_new("???x"), Ok("???x".to_string()));
    }

    #[test]
    fn test_add_remove_rename() {
        let mut cubes = list(&["2x2", "3x3", "4x4"]);
        assert!(cubes.add("Skewb"));
        assert!(!cubes.add("Skewb"));
        assert!(cubes.rename("3x3", "3x3 BLD"));
        assert_eq!(cubes.position("3x3 BLD"), Some(1));
        assert!(!cubes.rename("2x2", "4x4"));
        assert!(cubes.remove("2x2"));
        assert!(!cubes.remove("2x2"));
        assert_eq!(cubes.names().len(), 3);
    }
}
