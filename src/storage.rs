use crate::model::{now_millis, Note};
use directories::ProjectDirs;
use log::{debug, info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File stem of the persisted collection.
pub const STORAGE_KEY: &str = "cybernotes_data";
pub const PROJECT_DIR: &str = ".cybernotes";

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("i/o error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("stored notes at {path:?} are malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("serializing notes: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("replacing {path:?}: {source}")]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },
    #[error("could not locate a data directory")]
    NoDataDir,
}

impl StorageError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, StorageError::Malformed { .. })
    }
}

/// Whole-collection persistence: every save replaces what was there.
pub trait Persistence {
    fn load(&self) -> Result<Vec<Note>, StorageError>;
    fn save(&mut self, notes: &[Note]) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Project,
    Global,
    Custom,
}

impl StoreScope {
    pub fn label(&self) -> &'static str {
        match self {
            StoreScope::Project => "project",
            StoreScope::Global => "global",
            StoreScope::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub dir: PathBuf,
    pub scope: StoreScope,
}

impl StoreLocation {
    pub fn custom(dir: impl Into<PathBuf>) -> Self {
        StoreLocation {
            dir: dir.into(),
            scope: StoreScope::Custom,
        }
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", STORAGE_KEY))
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join("cybernotes.log")
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(location: &StoreLocation) -> Self {
        JsonFileStorage {
            path: location.data_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves a malformed blob aside so the next load starts empty.
    /// Returns where the old data went, if there was any.
    pub fn quarantine(&self) -> Result<Option<PathBuf>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let target = self
            .path
            .with_extension(format!("json.corrupt-{}", now_millis()));
        fs::rename(&self.path, &target).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        warn!("quarantined {:?} to {:?}", self.path, target);
        Ok(Some(target))
    }
}

impl Persistence for JsonFileStorage {
    fn load(&self) -> Result<Vec<Note>, StorageError> {
        if !self.path.exists() {
            debug!("no stored notes at {:?}, starting empty", self.path);
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        let notes: Vec<Note> =
            serde_json::from_str(&data).map_err(|source| StorageError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        info!("loaded {} notes from {:?}", notes.len(), self.path);
        Ok(notes)
    }

    fn save(&mut self, notes: &[Note]) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        let serialized = serde_json::to_string(notes)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        tmp.write_all(serialized.as_bytes())
            .map_err(|source| StorageError::Io {
                path: tmp.path().to_path_buf(),
                source,
            })?;
        tmp.persist(&self.path)
            .map_err(|source| StorageError::Persist {
                path: self.path.clone(),
                source,
            })?;
        debug!("saved {} notes to {:?}", notes.len(), self.path);
        Ok(())
    }
}

pub fn init_project_store(cwd: &Path) -> Result<StoreLocation, StorageError> {
    let location = StoreLocation {
        dir: cwd.join(PROJECT_DIR),
        scope: StoreScope::Project,
    };
    let mut storage = JsonFileStorage::new(&location);
    if !storage.path().exists() {
        storage.save(&[])?;
    }
    Ok(location)
}

/// Explicit overrides win, then the nearest project store, then the
/// per-user data directory.
pub fn locate_store(start: &Path, override_dir: Option<&Path>) -> Result<StoreLocation, StorageError> {
    if let Some(dir) = override_dir {
        return Ok(StoreLocation::custom(dir));
    }
    if let Some(dir) = find_project_store(start) {
        return Ok(StoreLocation {
            dir,
            scope: StoreScope::Project,
        });
    }
    Ok(StoreLocation {
        dir: global_data_dir()?,
        scope: StoreScope::Global,
    })
}

fn find_project_store(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(PROJECT_DIR);
        if candidate.is_dir() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

fn global_data_dir() -> Result<PathBuf, StorageError> {
    let dirs = ProjectDirs::from("", "", "cybernotes").ok_or(StorageError::NoDataDir)?;
    Ok(dirs.data_dir().to_path_buf())
}
