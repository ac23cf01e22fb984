// Asset store handoff
//
// The coordinator hands a finished container file to an `AssetStore` and
// deletes the staging copy only after ingestion is confirmed. The bundled
// `LibraryStore` copies into a flat library directory; embedders substitute
// their own store (photo library, upload queue) behind the same trait.

use std::path::{Path, PathBuf};

/// Error type for asset store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Ingest failed: {0}")]
    Ingest(String),
}

/// Proof that the store accepted the file
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub stored_path: PathBuf,
    /// Probed media duration, 0.0 when the store could not determine it
    pub duration_secs: f64,
}

/// Durable destination for finished recordings
pub trait AssetStore: Send + Sync {
    fn ingest(&self, path: &Path) -> Result<IngestReceipt, StoreError>;
}

/// Store that copies finished containers into a library directory
pub struct LibraryStore {
    library_dir: PathBuf,
}

impl LibraryStore {
    pub fn new(library_dir: PathBuf) -> Self {
        Self { library_dir }
    }
}

impl AssetStore for LibraryStore {
    fn ingest(&self, path: &Path) -> Result<IngestReceipt, StoreError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| StoreError::Ingest(format!("No file name in {:?}", path)))?;

        std::fs::create_dir_all(&self.library_dir)
            .map_err(|e| StoreError::Ingest(format!("Failed to create library dir: {}", e)))?;

        let stored_path = self.library_dir.join(file_name);
        std::fs::copy(path, &stored_path)
            .map_err(|e| StoreError::Ingest(format!("Failed to copy into library: {}", e)))?;

        let duration_secs = match probe_duration(&stored_path) {
            Ok(secs) => secs,
            Err(e) => {
                log::warn!("Could not probe duration of {:?}: {}", stored_path, e);
                0.0
            }
        };

        log::info!(
            "Ingested {:?} into library ({:.1}s)",
            stored_path,
            duration_secs
        );

        Ok(IngestReceipt {
            stored_path,
            duration_secs,
        })
    }
}

/// Read media duration using a GStreamer Discoverer
fn probe_duration(path: &Path) -> anyhow::Result<f64> {
    gstreamer::init().map_err(|e| anyhow::anyhow!("GStreamer init failed: {}", e))?;

    let discoverer = gstreamer_pbutils::Discoverer::new(gstreamer::ClockTime::from_seconds(10))
        .map_err(|e| anyhow::anyhow!("Failed to create discoverer: {}", e))?;

    let uri = format!("file:///{}", path.to_string_lossy().replace('\\', "/"));
    let info = discoverer
        .discover_uri(&uri)
        .map_err(|e| anyhow::anyhow!("Discovery failed: {}", e))?;

    let duration = info
        .duration()
        .ok_or_else(|| anyhow::anyhow!("No duration found"))?;

    Ok(duration.nseconds() as f64 / 1_000_000_000.0)
}
