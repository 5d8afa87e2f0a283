use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::domain::{ChannelId, TeamId};

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("could not read destinations file `{path}`: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not parse destinations file `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("could not write destinations file `{path}`: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Per-team audit channel mapping, backed by one JSON object on disk
/// (`{"T123": "C456", ...}`).
///
/// The file is read once at startup and rewritten on every accepted change;
/// a missing file just means nothing is configured yet. Writes go through a
/// sibling temp file and a rename, so a crash mid-write leaves the previous
/// mapping intact.
#[derive(Debug)]
pub struct DestinationStore {
    path: PathBuf,
    destinations: Mutex<BTreeMap<TeamId, ChannelId>>,
}

impl DestinationStore {
    /// Opens the mapping file. Creates the parent directory here so later
    /// writes never trip over a missing one.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DestinationError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|source| DestinationError::Write { path: path.clone(), source })?;
            }
        }

        let destinations = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|source| DestinationError::Parse { path: path.clone(), source })?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(DestinationError::Read { path: path.clone(), source }),
        };

        Ok(Self { path, destinations: Mutex::new(destinations) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, team: &TeamId) -> Option<ChannelId> {
        let destinations = match self.destinations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        destinations.get(team).cloned()
    }

    /// Upserts one team's destination and persists the whole mapping. The
    /// in-memory view only changes once the file write has landed, so a
    /// failed write keeps the prior destination.
    pub fn set(&self, team: TeamId, channel: ChannelId) -> Result<(), DestinationError> {
        let mut destinations = match self.destinations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut candidate = destinations.clone();
        candidate.insert(team, channel);
        self.persist(&candidate)?;
        *destinations = candidate;
        Ok(())
    }

    pub fn snapshot(&self) -> BTreeMap<TeamId, ChannelId> {
        let destinations = match self.destinations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        destinations.clone()
    }

    pub fn len(&self) -> usize {
        let destinations = match self.destinations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, destinations: &BTreeMap<TeamId, ChannelId>) -> Result<(), DestinationError> {
        let mut rendered = serde_json::to_string_pretty(destinations)
            .map_err(|source| DestinationError::Parse { path: self.path.clone(), source })?;
        rendered.push('\n');

        let staging = self.path.with_extension("tmp");
        fs::write(&staging, rendered)
            .map_err(|source| DestinationError::Write { path: staging.clone(), source })?;
        fs::rename(&staging, &self.path)
            .map_err(|source| DestinationError::Write { path: self.path.clone(), source })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::domain::{ChannelId, TeamId};

    use super::{DestinationError, DestinationStore};

    fn team(id: &str) -> TeamId {
        TeamId(id.to_string())
    }

    fn channel(id: &str) -> ChannelId {
        ChannelId(id.to_string())
    }

    #[test]
    fn missing_file_means_unconfigured() {
        let dir = TempDir::new().expect("tempdir");
        let store =
            DestinationStore::open(dir.path().join("logging_destinations.json")).expect("open");

        assert!(store.is_empty());
        assert!(store.get(&team("T-1")).is_none());
    }

    #[test]
    fn set_persists_and_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("logging_destinations.json");

        let store = DestinationStore::open(&path).expect("open");
        store.set(team("T-1"), channel("C-LOGS")).expect("set");
        assert_eq!(store.get(&team("T-1")), Some(channel("C-LOGS")));

        let reopened = DestinationStore::open(&path).expect("reopen");
        assert_eq!(reopened.get(&team("T-1")), Some(channel("C-LOGS")));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn set_overwrites_the_previous_destination() {
        let dir = TempDir::new().expect("tempdir");
        let store = DestinationStore::open(dir.path().join("map.json")).expect("open");

        store.set(team("T-1"), channel("C-OLD")).expect("first set");
        store.set(team("T-1"), channel("C-NEW")).expect("second set");

        assert_eq!(store.get(&team("T-1")), Some(channel("C-NEW")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_format_is_a_plain_team_to_channel_object() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("map.json");
        let store = DestinationStore::open(&path).expect("open");
        store.set(team("T-1"), channel("C-LOGS")).expect("set");

        let raw = std::fs::read_to_string(&path).expect("file exists after set");
        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(parsed["T-1"], "C-LOGS");
    }

    #[test]
    fn corrupt_file_is_a_parse_error_not_a_silent_reset() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("map.json");
        std::fs::write(&path, "not json").expect("seed corrupt file");

        let error = DestinationStore::open(&path).expect_err("corrupt file must fail");
        assert!(matches!(error, DestinationError::Parse { .. }));
    }

    #[test]
    fn missing_parent_directories_are_created_on_open() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested/data/map.json");

        let store = DestinationStore::open(&path).expect("open creates parents");
        store.set(team("T-9"), channel("C-9")).expect("set into nested dir");
        assert!(path.exists());
    }
}
