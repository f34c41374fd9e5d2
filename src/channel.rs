//! Telemetry transport.
//!
//! Every channel exports over OTLP. A channel with a storage folder also
//! spools each log record to `<folder>/<role>.telemetry.jsonl`, so records
//! survive a collector outage on disk.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    role::ServiceRole,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryChannel {
    storage_folder: Option<PathBuf>,
}

impl TelemetryChannel {
    pub fn with_storage_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            storage_folder: Some(folder.into()),
        }
    }

    pub fn storage_folder(&self) -> Option<&Path> {
        self.storage_folder.as_deref()
    }

    /// Spool file used by `role`, if this channel buffers to disk.
    pub fn spool_path(&self, role: ServiceRole) -> Option<PathBuf> {
        self.storage_folder
            .as_ref()
            .map(|folder| folder.join(format!("{}.telemetry.jsonl", role.role_name())))
    }

    /// Creates the storage folder if needed and opens the spool for appending.
    pub fn open_spool(&self, role: ServiceRole) -> Result<Option<File>> {
        let (Some(folder), Some(path)) = (self.storage_folder(), self.spool_path(role)) else {
            return Ok(None);
        };

        fs::create_dir_all(folder).map_err(|source| Error::Storage {
            path: folder.to_path_buf(),
            source,
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| Error::Storage { path, source })?;

        Ok(Some(file))
    }
}
