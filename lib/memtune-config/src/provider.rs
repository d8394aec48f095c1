use std::path::Path;

use figment::{
    providers::Format,
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};

/// Configuration file contents, parsed when the snapshot is taken.
///
/// A missing or unreadable file is an error, where `figment`'s own file providers would silently yield nothing.
pub struct FileSnapshot {
    data: Map<Profile, Dict>,
    metadata: Metadata,
}

impl FileSnapshot {
    /// Reads and parses the file at `path` in the format `F`.
    pub fn read<F: Format>(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::from(format!("failed to read {} file '{}': {}", F::NAME, path.display(), e)))?;
        let data = F::string(&contents).data()?;

        Ok(Self {
            data,
            metadata: Metadata::from(format!("{} file", F::NAME), path),
        })
    }
}

impl Provider for FileSnapshot {
    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        Ok(self.data.clone())
    }
}
