use crate::types::{CslcError, CslcResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Store for ancillary reference files (burst database, blackout dates,
/// frame geometries). Each source is downloaded at most once per process
/// and cached on disk; if the primary source cannot be retrieved the
/// bundled local copy is used instead, with a warning. That fallback is
/// the only permitted soft-failure path for reference data.
pub struct AncillaryStore {
    cache_dir: PathBuf,
    /// Resolved path per source URL, so repeated loads are at-most-once
    /// even under concurrent callers
    resolved: Mutex<HashMap<String, PathBuf>>,
    timeout: Duration,
}

impl AncillaryStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            resolved: Mutex::new(HashMap::new()),
            timeout: Duration::from_secs(30),
        }
    }

    /// Store rooted at the platform cache directory
    pub fn with_default_cache_dir() -> CslcResult<Self> {
        let base = dirs::cache_dir().ok_or_else(|| {
            CslcError::InvalidFormat("no platform cache directory available".to_string())
        })?;
        Ok(Self::new(base.join("frameline")))
    }

    /// Retrieve an ancillary file, downloading it into the cache on
    /// first use and falling back to `bundled_copy` if the download
    /// fails
    pub fn fetch(&self, source_url: &str, bundled_copy: &Path) -> CslcResult<PathBuf> {
        let mut resolved = self
            .resolved
            .lock()
            .map_err(|_| CslcError::Consistency("ancillary store lock poisoned".to_string()))?;

        if let Some(path) = resolved.get(source_url) {
            log::debug!("Ancillary file already resolved: {}", path.display());
            return Ok(path.clone());
        }

        let path = match self.download(source_url) {
            Ok(path) => path,
            Err(e) => {
                log::warn!(
                    "Failed to retrieve ancillary file from {}: {}. \
                     Falling back to bundled copy {}",
                    source_url,
                    e,
                    bundled_copy.display()
                );
                if !bundled_copy.exists() {
                    return Err(CslcError::InvalidFormat(format!(
                        "no bundled ancillary copy at {}",
                        bundled_copy.display()
                    )));
                }
                bundled_copy.to_path_buf()
            }
        };

        resolved.insert(source_url.to_string(), path.clone());
        Ok(path)
    }

    fn download(&self, source_url: &str) -> CslcResult<PathBuf> {
        let filename = source_url.rsplit('/').next().unwrap_or("ancillary.json");
        let target = self.cache_dir.join(filename);

        if target.exists() {
            log::info!("Using cached ancillary file: {}", target.display());
            return Ok(target);
        }

        log::info!("Downloading ancillary file: {}", source_url);
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| CslcError::Catalog(format!("Failed to create HTTP client: {}", e)))?;

        let response = client
            .get(source_url)
            .send()
            .map_err(|e| CslcError::Catalog(format!("Download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CslcError::Catalog(format!(
                "Download failed with status {}",
                response.status()
            )));
        }

        let content = response
            .bytes()
            .map_err(|e| CslcError::Catalog(format!("Failed to read response body: {}", e)))?;

        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::write(&target, &content)?;
        log::info!(
            "Cached ancillary file ({} bytes): {}",
            content.len(),
            target.display()
        );
        Ok(target)
    }
}
