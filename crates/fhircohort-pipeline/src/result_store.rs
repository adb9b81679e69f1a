//! Per-patient result files under the output root.

use std::fs;
use std::path::{Path, PathBuf};

use fhircohort_core::fhir_reference::reference_file_stem;
use fhircohort_core::{ResourceEntry, ResourceKind};
use tracing::{debug, warn};

use crate::config::FileNaming;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
    naming: FileNaming,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>, naming: FileNaming) -> Self {
        Self {
            root: root.into(),
            naming,
        }
    }

    pub fn dir(&self, kind: ResourceKind) -> PathBuf {
        self.root.join(kind.relative_dir())
    }

    /// Numeric or patient-derived part of the file name.
    pub fn discriminator(&self, patient: &str, completion_index: usize) -> String {
        match self.naming {
            FileNaming::PatientId => reference_file_stem(patient),
            FileNaming::CompletionOrder => completion_index.to_string(),
        }
    }

    /// Create the kind's directory and drop result files of earlier runs.
    pub fn prepare(&self, kind: ResourceKind) -> Result<usize> {
        let dir = self.dir(kind);
        fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        let stale = self.files(kind)?;
        for path in &stale {
            fs::remove_file(path).map_err(|e| PipelineError::io(path, e))?;
        }
        if !stale.is_empty() {
            debug!(kind = %kind, removed = stale.len(), "removed stale result files");
        }
        Ok(stale.len())
    }

    pub fn write(
        &self,
        kind: ResourceKind,
        discriminator: &str,
        entries: &[ResourceEntry],
    ) -> Result<PathBuf> {
        let path = self.dir(kind).join(kind.file_name(discriminator));
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
        Ok(path)
    }

    /// Result files of a kind, sorted by name. A missing directory has none.
    pub fn files(&self, kind: ResourceKind) -> Result<Vec<PathBuf>> {
        let dir = self.dir(kind);
        let listing = match fs::read_dir(&dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %dir.display(), "no result directory, nothing to scan");
                return Ok(Vec::new());
            }
            Err(e) => return Err(PipelineError::io(&dir, e)),
        };
        let mut files = Vec::new();
        for item in listing {
            let path = item.map_err(|e| PipelineError::io(&dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn read(&self, path: &Path) -> Result<Vec<ResourceEntry>> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| PipelineError::MalformedResultFile {
            path: path.to_path_buf(),
            source,
        })
    }
}
