//! Entry point for opening table files

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{OpenOptions, ViewerConfig};
use crate::error::{Result, ViewerError};
use crate::session::{Registry, ViewerSession};
use crate::util::cancel::CancelToken;
use crate::util::file_validation::validate_file_for_opening;

/// Owns the configuration and enforces one session per file
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    config: ViewerConfig,
    registry: Registry,
}

impl Viewer {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            registry: Arc::default(),
        }
    }

    /// Viewer using `~/.config/tabula/config.yaml`
    pub fn from_user_config() -> Self {
        Self::new(ViewerConfig::load())
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Open `path` with options derived from the configuration
    pub fn open(&self, path: impl AsRef<Path>) -> Result<ViewerSession> {
        let options = self.config.open_options()?;
        self.open_with(path, options, &CancelToken::new())
    }

    /// Open `path`, scanning it once to build the row index
    ///
    /// Fails with `AlreadyOpen` while another session holds the same file.
    pub fn open_with(
        &self,
        path: impl AsRef<Path>,
        options: OpenOptions,
        cancel: &CancelToken,
    ) -> Result<ViewerSession> {
        let path = path.as_ref();
        validate_file_for_opening(path).map_err(|reason| ViewerError::CannotOpen {
            path: path.to_path_buf(),
            reason,
        })?;
        options.validate()?;

        let canonical = std::fs::canonicalize(path).map_err(|e| ViewerError::io(path, e))?;
        if !self.registry.lock().insert(canonical.clone()) {
            return Err(ViewerError::AlreadyOpen(canonical));
        }

        ViewerSession::open(canonical.clone(), options, cancel, Arc::clone(&self.registry))
            .map_err(|e| {
                self.registry.lock().remove(&canonical);
                e
            })
    }

    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        std::fs::canonicalize(path)
            .map(|p| self.registry.lock().contains(&p))
            .unwrap_or(false)
    }

    pub fn open_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.registry.lock().iter().cloned().collect();
        paths.sort();
        paths
    }
}
