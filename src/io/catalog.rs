use crate::types::{CslcError, CslcGranule, CslcResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// The persisted catalog/state-store boundary: records which granules
/// have been downloaded or submitted, and which compressed products
/// exist. The production implementation lives in the surrounding
/// orchestration; this crate consumes the interface only.
pub trait StateStore {
    /// Granule records seen by a previous run but not yet submitted
    fn unsubmitted_granules(&self) -> CslcResult<Vec<CslcGranule>>;

    /// Existence probe for a compressed CSLC product id
    fn contains_compressed(&self, compressed_id: &str) -> CslcResult<bool>;

    /// Record that a granule's batch was handed to the job system
    fn mark_submitted(&self, unique_id: &str, job_id: &str) -> CslcResult<()>;
}

/// In-memory state store used by tests and local dry runs
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    compressed: BTreeSet<String>,
    unsubmitted: Vec<CslcGranule>,
    submitted: BTreeMap<String, String>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_compressed(&self, compressed_id: &str) {
        self.lock().compressed.insert(compressed_id.to_string());
    }

    pub fn add_unsubmitted(&self, granule: CslcGranule) {
        self.lock().unsubmitted.push(granule);
    }

    pub fn submitted_job(&self, unique_id: &str) -> Option<String> {
        self.lock().submitted.get(unique_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // Test-only store; a poisoned lock means a test already panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StateStore for MemoryStateStore {
    fn unsubmitted_granules(&self) -> CslcResult<Vec<CslcGranule>> {
        Ok(self.lock().unsubmitted.clone())
    }

    fn contains_compressed(&self, compressed_id: &str) -> CslcResult<bool> {
        Ok(self.lock().compressed.contains(compressed_id))
    }

    fn mark_submitted(&self, unique_id: &str, job_id: &str) -> CslcResult<()> {
        let mut state = self.lock();
        if state.submitted.contains_key(unique_id) {
            return Err(CslcError::Consistency(format!(
                "granule {} was already submitted",
                unique_id
            )));
        }
        state
            .submitted
            .insert(unique_id.to_string(), job_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_probe() {
        let store = MemoryStateStore::new();
        assert!(!store.contains_compressed("t042_088905_iw1_432").unwrap());
        store.add_compressed("t042_088905_iw1_432");
        assert!(store.contains_compressed("t042_088905_iw1_432").unwrap());
    }

    #[test]
    fn test_double_submission_is_rejected() {
        let store = MemoryStateStore::new();
        store.mark_submitted("f831_a432_T042-088905-IW1", "job-1").unwrap();
        assert_eq!(
            store.submitted_job("f831_a432_T042-088905-IW1").as_deref(),
            Some("job-1")
        );
        assert!(store
            .mark_submitted("f831_a432_T042-088905-IW1", "job-2")
            .is_err());
    }
}
