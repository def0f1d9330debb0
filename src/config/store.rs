use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::error::Result;
use crate::config::types::PipelineConfig;

/// Live pipeline configuration, optionally backed by a JSON file.
///
/// Every accepted change bumps a revision counter; the processor compares
/// revisions between frames instead of locking on every pixel pass.
pub struct ConfigStore {
    path: Option<PathBuf>,
    data: Mutex<PipelineConfig>,
    revision: AtomicU64,
}

impl ConfigStore {
    /// Open a store backed by `path`, loading it if the file exists.
    ///
    /// A corrupt or invalid file is logged and replaced by defaults so the
    /// camera keeps working.
    pub fn open(path: PathBuf) -> Self {
        let data = Self::load(&path).unwrap_or_else(|e| {
            warn!("Failed to load pipeline config from {}: {e}", path.display());
            PipelineConfig::default()
        });
        Self {
            path: Some(path),
            data: Mutex::new(data),
            revision: AtomicU64::new(0),
        }
    }

    /// A store with no file behind it.
    pub fn in_memory(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            path: None,
            data: Mutex::new(config),
            revision: AtomicU64::new(0),
        })
    }

    /// Load and validate a config file, returning defaults on a missing file.
    pub fn load(path: &Path) -> Result<PipelineConfig> {
        if !path.exists() {
            return Ok(PipelineConfig::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the current config to disk atomically (write .tmp then rename).
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            debug!("in-memory config store, nothing to save");
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&*self.data.lock())?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self) -> PipelineConfig {
        self.data.lock().clone()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// The config and its revision, if the revision differs from `seen`.
    pub fn changed_since(&self, seen: u64) -> Option<(u64, PipelineConfig)> {
        let data = self.data.lock();
        let revision = self.revision.load(Ordering::Acquire);
        (revision != seen).then(|| (revision, data.clone()))
    }

    /// Apply `f` to a copy of the config and commit it if it validates.
    pub fn update(&self, f: impl FnOnce(&mut PipelineConfig)) -> Result<PipelineConfig> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        f(&mut next);
        next.validate()?;
        if next != *data {
            *data = next.clone();
            self.revision.fetch_add(1, Ordering::AcqRel);
            debug!("pipeline config updated: {next:?}");
        }
        Ok(next)
    }

    pub fn replace(&self, config: PipelineConfig) -> Result<()> {
        self.update(|current| *current = config).map(|_| ())
    }

    /// Restore every option to its default.
    pub fn reset(&self) {
        let mut data = self.data.lock();
        *data = PipelineConfig::default();
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            path: None,
            data: Mutex::new(PipelineConfig::default()),
            revision: AtomicU64::new(0),
        }
    }
}
