use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::InjectError;

pub const MODEL_FILE_PATTERN: &str = r"^[1-9]\d*_model\.json$";

static MODEL_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(MODEL_FILE_PATTERN).unwrap());

/// A discovered model file and its bytes.
#[derive(Debug, Clone)]
pub struct ModelFile {
    pub path: PathBuf,
    /// Path relative to the app directory.
    pub relative: PathBuf,
    pub raw: Vec<u8>,
}

/// Where model files come from.
pub trait ModelFileSource {
    /// List every model file. Failing here aborts the run; entries below
    /// the root that cannot be read are skipped.
    fn discover(&self) -> Result<Vec<PathBuf>, InjectError>;

    /// Read one file. Failing here only skips that file.
    fn load(&self, path: &Path) -> Result<ModelFile, InjectError>;
}

/// Recursive walk of an app directory on disk.
pub struct FsModelSource {
    root: PathBuf,
}

impl FsModelSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsModelSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModelFileSource for FsModelSource {
    fn discover(&self) -> Result<Vec<PathBuf>, InjectError> {
        if !self.root.is_dir() {
            return Err(InjectError::RootUnreadable {
                path: self.root.clone(),
                reason: "not a directory".into(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(InjectError::RootUnreadable {
                        path: self.root.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("skipping unreadable entry: {}", e);
                    continue;
                }
            };
            // follows symlinked files; symlinked directories are not walked
            if !entry.path().is_file() {
                continue;
            }
            let matches = entry
                .file_name()
                .to_str()
                .map(is_model_file_name)
                .unwrap_or(false);
            if matches {
                debug!("found {}", entry.path().display());
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();
        info!("Found {} model file(s) under {}", files.len(), self.root.display());
        Ok(files)
    }

    fn load(&self, path: &Path) -> Result<ModelFile, InjectError> {
        let raw = std::fs::read(path).map_err(|source| InjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let relative = path.strip_prefix(&self.root).unwrap_or(path).to_path_buf();
        Ok(ModelFile {
            path: path.to_path_buf(),
            relative,
            raw,
        })
    }
}

/// `7_model.json` yes, `07_model.json` and `model.json` no.
pub fn is_model_file_name(name: &str) -> bool {
    MODEL_FILE_RE.is_match(name)
}

/// Default collection for a file: its parent directory, lower-cased with
/// `_` turned into `-`, or `"root"` for files directly in the app directory.
pub fn collection_from_path(relative: &Path) -> String {
    relative
        .parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .map(|name| name.to_lowercase().replace('_', "-"))
        .unwrap_or_else(|| "root".to_string())
}
