//! File-backed credential source.
//!
//! The file holds `entity id -> {service -> {"key", "secret"}}` as JSON, or as
//! TOML when the file name ends in `.toml`. It is re-read lazily: each lookup
//! stats the file and only re-parses it when the modification time changed.
//! Lookups never wait for a reload in progress; they read the last snapshot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::SystemTime;

use arc_swap::ArcSwap;

use super::{CredentialMap, CredentialSource, SourceMatch, lookup_in};
use crate::ProxyResult;
use crate::error::ProxyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }

    fn parse(self, text: &str) -> Result<CredentialMap, String> {
        match self {
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

#[derive(Debug)]
struct Snapshot {
    modified: Option<SystemTime>,
    credentials: CredentialMap,
}

/// Credential source backed by a JSON or TOML file.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    format: Format,
    snapshot: ArcSwap<Snapshot>,
    reload_lock: Mutex<()>,
    loads: AtomicU64,
}

impl FileSource {
    /// Opens and parses the file. Unlike later reloads, a failure here is an
    /// error.
    pub fn open(path: impl Into<PathBuf>) -> ProxyResult<Self> {
        let path = path.into();
        let format = Format::for_path(&path);

        let modified = modified_time(&path).map_err(|e| {
            ProxyError::configuration(format!(
                "Cannot stat consumer file {}: {e}",
                path.display()
            ))
        })?;
        let credentials = read(&path, format).map_err(|e| {
            ProxyError::configuration(format!(
                "Cannot load consumer file {}: {e}",
                path.display()
            ))
        })?;

        tracing::info!(path = %path.display(), entities = credentials.len(), "Loaded consumer file");

        Ok(Self {
            name: format!("file:{}", path.display()),
            path,
            format,
            snapshot: ArcSwap::from_pointee(Snapshot {
                modified,
                credentials,
            }),
            reload_lock: Mutex::new(()),
            loads: AtomicU64::new(1),
        })
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How many times the file has been read and parsed, the initial load
    /// included.
    #[must_use]
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Re-reads the file if its modification time changed since the last read.
    ///
    /// A missing or unparseable file keeps the previous credentials. Returns
    /// without reloading when another caller is already reloading.
    pub fn refresh(&self) {
        let modified = match modified_time(&self.path) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot stat consumer file");
                return;
            }
        };
        if self.snapshot.load().modified == modified {
            return;
        }

        let _guard = match self.reload_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };

        let current = self.snapshot.load_full();
        if current.modified == modified {
            return;
        }

        self.loads.fetch_add(1, Ordering::Relaxed);
        let credentials = match read(&self.path, self.format) {
            Ok(credentials) => {
                tracing::info!(
                    path = %self.path.display(),
                    entities = credentials.len(),
                    "Reloaded consumer file"
                );
                credentials
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Could not load consumer info");
                current.credentials.clone()
            }
        };

        self.snapshot.store(Arc::new(Snapshot {
            modified,
            credentials,
        }));
    }
}

impl CredentialSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, social_service: &str, entity_id: &str) -> Option<SourceMatch> {
        self.refresh();
        lookup_in(&self.snapshot.load().credentials, social_service, entity_id)
    }
}

fn modified_time(path: &Path) -> std::io::Result<Option<SystemTime>> {
    let metadata = std::fs::metadata(path)?;
    Ok(metadata.modified().ok())
}

fn read(path: &Path, format: Format) -> Result<CredentialMap, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    format.parse(&text)
}
