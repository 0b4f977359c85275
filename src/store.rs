//! Mappings persisted per recorded flow, in a single JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{FieldMapping, Flow};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    mappings: BTreeMap<String, FieldMapping>,
}

/// File-backed mapping store keyed by [`Flow::fingerprint`].
pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mapping saved for `flow`, if any. A missing file is an empty store.
    pub fn load(&self, flow: &Flow) -> Result<Option<FieldMapping>> {
        Ok(self.read()?.mappings.remove(&flow.fingerprint()))
    }

    pub fn save(&self, flow: &Flow, mapping: &FieldMapping) -> Result<()> {
        let mut file = self.read()?;
        file.mappings.insert(flow.fingerprint(), mapping.clone());
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&file)?)?;
        tracing::debug!(path = %self.path.display(), fields = mapping.len(), "mapping saved");
        Ok(())
    }

    fn read(&self) -> Result<StoreFile> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Store(format!("{} is not a mapping store: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(e.into()),
        }
    }
}
