use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::attachments::{AttachmentStore, DEFAULT_SWEEP_GRACE};
use crate::db::{Database, DEFAULT_BUSY_TIMEOUT_MS};
use crate::error::{NotesError, NotesResult};
use crate::filter::DEFAULT_LIMIT;
use crate::notes::NoteRepository;
use crate::thumbnail::{ImageThumbnailer, DEFAULT_THUMBNAIL_QUALITY, DEFAULT_THUMBNAIL_WIDTH};

/// Environment variable that overrides the profile directory.
pub const PROFILE_ENV: &str = "NOTES_PROFILE";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file name, relative to the profile directory.
    pub database: String,
    /// Upload directory, relative to the profile directory.
    pub uploads_dir: String,
    pub busy_timeout_ms: u64,
    pub page_size: i64,
    pub thumbnail_width: u32,
    pub thumbnail_quality: u8,
    /// Upload files younger than this are left alone by `gc`.
    pub sweep_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "notes.db".to_string(),
            uploads_dir: "uploads".to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            page_size: DEFAULT_LIMIT,
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            thumbnail_quality: DEFAULT_THUMBNAIL_QUALITY,
            sweep_grace_secs: DEFAULT_SWEEP_GRACE.as_secs(),
        }
    }
}

/// A loaded configuration bound to its profile directory.
#[derive(Debug, Clone)]
pub struct Profile {
    pub dir: PathBuf,
    pub config: Config,
}

impl Profile {
    /// Resolve the profile directory: explicit override, then `NOTES_PROFILE`,
    /// then the platform data directory, then the working directory.
    pub fn resolve_dir(explicit: Option<&Path>) -> PathBuf {
        if let Some(dir) = explicit {
            return dir.to_path_buf();
        }
        if let Some(dir) = std::env::var_os(PROFILE_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join("notes"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load `config.toml` from `dir`, writing the defaults there when absent.
    pub fn load(dir: impl Into<PathBuf>) -> NotesResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let path = dir.join(CONFIG_FILE);

        let config = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            toml::from_str(&raw)
                .map_err(|e| NotesError::Config(format!("{}: {e}", path.display())))?
        } else {
            let config = Config::default();
            let raw = toml::to_string_pretty(&config)
                .map_err(|e| NotesError::Config(e.to_string()))?;
            if let Err(e) = fs::write(&path, raw) {
                tracing::warn!(path = %path.display(), error = %e, "could not write default config");
            }
            config
        };

        Ok(Self { dir, config })
    }

    pub fn database_path(&self) -> PathBuf {
        self.dir.join(&self.config.database)
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.dir.join(&self.config.uploads_dir)
    }

    pub fn attachment_store(&self) -> AttachmentStore {
        let thumbnailer =
            ImageThumbnailer::new(self.config.thumbnail_width, self.config.thumbnail_quality);
        AttachmentStore::new(self.uploads_path(), Arc::new(thumbnailer))
            .with_sweep_grace(Duration::from_secs(self.config.sweep_grace_secs))
    }

    /// Open a repository with its own connection. Call once per worker.
    pub fn open_repository(&self) -> NotesResult<NoteRepository> {
        let db = Database::open_with_timeout(self.database_path(), self.config.busy_timeout_ms)?;
        Ok(NoteRepository::new(db, self.attachment_store()))
    }
}
