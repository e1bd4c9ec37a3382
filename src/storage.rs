//SPDX-License-Identifier: MPL-2.0

/*!
Where the shell keeps its files, and the local-storage blob.

Everything lives under one data root, by default the platform's local data directory
joined with the application name (e.g. `~/.local/share/SIC-1`).
*/

use std::path::{Path, PathBuf};

use crate::error::Error;

const LOCAL_STORAGE_FILE: &str = "cloud.txt";
const SETTINGS_FILE: &str = "settings.ini";
const BROWSER_DATA_DIR: &str = "internal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataPaths { root: root.into() }
    }

    /// `<local data dir>/<app_name>`.
    pub fn for_app(app_name: &str) -> Result<DataPaths, Error> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| Error::failed("cannot determine the local data directory"))?;
        Ok(DataPaths::new(base.join(app_name)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The mirrored local-storage blob.
    pub fn local_storage_file(&self) -> PathBuf {
        self.root.join(LOCAL_STORAGE_FILE)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    /// User data folder for the embedded browser engine.
    pub fn browser_data_dir(&self) -> PathBuf {
        self.root.join(BROWSER_DATA_DIR)
    }
}

/// Reads the local-storage blob; a missing or empty file is no data.
pub fn load_local_storage(path: &Path) -> Result<Option<String>, Error> {
    match std::fs::read_to_string(path) {
        Ok(data) if data.is_empty() => Ok(None),
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_local_storage(path: &Path, data: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    logwise::debuginternal_sync!("Saved {bytes} bytes of local storage", bytes = data.len());
    Ok(())
}
