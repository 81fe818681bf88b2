use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::Path,
};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{error::StoreError, model::PaperRecord};

/// Deduplicated papers keyed by id. Keys are kept sorted so the saved file
/// is stable between runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperStore {
    papers: BTreeMap<String, PaperRecord>,
}

/// What a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub refreshed: usize,
}

impl PaperStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the store at `path`. A missing, unreadable or corrupt file
    /// yields an empty store; individual records that no longer parse are
    /// skipped.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                if path.exists() {
                    warn!(path = %path.display(), error = %e, "store unreadable, starting empty");
                } else {
                    debug!(path = %path.display(), "no store yet, starting empty");
                }
                return Self::default();
            }
        };
        let entries = match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "store corrupt, starting empty");
                return Self::default();
            }
        };

        let mut papers = BTreeMap::new();
        for (id, value) in entries {
            match serde_json::from_value::<PaperRecord>(value) {
                Ok(record) => {
                    papers.insert(id, record);
                }
                Err(e) => warn!(path = %path.display(), %id, error = %e, "dropping unreadable record"),
            }
        }
        PaperStore { papers }
    }

    /// Inserts or overwrites each fetched record at its id. Later records win,
    /// and nothing already stored is removed.
    pub fn merge<I>(mut self, fetched: I) -> (Self, MergeStats)
    where
        I: IntoIterator<Item = PaperRecord>,
    {
        let mut stats = MergeStats::default();
        for record in fetched {
            match self.papers.insert(record.id.clone(), record) {
                Some(_) => stats.refreshed += 1,
                None => stats.added += 1,
            }
        }
        (self, stats)
    }

    /// Writes the store as pretty JSON, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut json = serde_json::to_vec_pretty(&self.papers)?;
        json.push(b'\n');
        write_atomic(path, &json)
    }

    pub fn get(&self, id: &str) -> Option<&PaperRecord> {
        self.papers.get(id)
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.papers.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &PaperRecord> {
        self.papers.values()
    }
}

impl FromIterator<PaperRecord> for PaperStore {
    fn from_iter<T: IntoIterator<Item = PaperRecord>>(iter: T) -> Self {
        PaperStore::new().merge(iter).0
    }
}

/// Writes `bytes` to a temp file beside `path` and renames it into place, so
/// readers see either the old content or the new, never a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(write_err)?;
            parent
        }
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent).map_err(write_err)?;
    temp.write_all(bytes).map_err(write_err)?;
    if let Some(permissions) = target_permissions(path) {
        temp.as_file().set_permissions(permissions).map_err(write_err)?;
    }
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

// temp files are created owner-only; keep the mode of the file being
// replaced, or make new files world-readable so they can be served.
fn target_permissions(path: &Path) -> Option<fs::Permissions> {
    match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => default_permissions(),
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}
