//! Named waypoint lookup
//!
//! Ids are trimmed and matched case-insensitively. When two entries share an
//! id the first one wins and the duplicate is logged.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::Vec3;
use crate::runtime::error::ScenarioError;

/// One named waypoint as stored in a waypoint file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointEntry {
    /// Waypoint id
    pub id: String,
    /// World position
    pub position: Vec3,
}

/// Waypoint id → world position
#[derive(Debug, Default)]
pub struct WaypointDirectory {
    points: RwLock<HashMap<String, Vec3>>,
}

impl WaypointDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from entries, keeping the first of any duplicate id
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = WaypointEntry>,
    {
        let directory = Self::new();
        for entry in entries {
            directory.insert(&entry.id, entry.position);
        }
        directory
    }

    /// Load a JSON array of [`WaypointEntry`]
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let data = fs::read(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<WaypointEntry> = serde_json::from_slice(&data)?;
        Ok(Self::from_entries(entries))
    }

    /// Add a waypoint. Returns false if the id was blank or already taken.
    pub fn insert(&self, id: &str, position: Vec3) -> bool {
        let Some(key) = waypoint_key(id) else {
            tracing::warn!("skipping waypoint with blank id");
            return false;
        };

        let mut points = self.points.write();
        if points.contains_key(&key) {
            tracing::warn!(id = %key, "duplicate waypoint id, keeping first entry");
            return false;
        }
        points.insert(key, position);
        true
    }

    /// Position of waypoint `id`, if known
    pub fn resolve(&self, id: &str) -> Option<Vec3> {
        let key = waypoint_key(id)?;
        let points = self.points.read();
        let found = points.get(&key).copied();
        if found.is_none() {
            let mut available: Vec<_> = points.keys().cloned().collect();
            available.sort();
            tracing::warn!(id = %key, ?available, "waypoint not found");
        }
        found
    }

    /// Number of known waypoints
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// Whether no waypoints are registered
    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }
}

fn waypoint_key(id: &str) -> Option<String> {
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_lookup_is_trimmed_and_case_insensitive() {
        let waypoints = WaypointDirectory::new();
        waypoints.insert("Table", Vec3::new(1.0, 0.0, 0.0));

        assert_eq!(waypoints.resolve(" table "), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(waypoints.resolve("TABLE"), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(waypoints.resolve("door"), None);
        assert_eq!(waypoints.resolve(""), None);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let waypoints = WaypointDirectory::from_entries([
            WaypointEntry {
                id: "door".into(),
                position: Vec3::new(1.0, 0.0, 0.0),
            },
            WaypointEntry {
                id: "DOOR".into(),
                position: Vec3::new(9.0, 0.0, 0.0),
            },
        ]);

        assert_eq!(waypoints.len(), 1);
        assert_eq!(waypoints.resolve("door"), Some(Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "shelf", "position": {{"x": 2.0, "y": 0.5, "z": -1.0}}}}]"#
        )
        .unwrap();

        let waypoints = WaypointDirectory::load(file.path()).unwrap();
        assert_eq!(waypoints.resolve("shelf"), Some(Vec3::new(2.0, 0.5, -1.0)));
    }
}
