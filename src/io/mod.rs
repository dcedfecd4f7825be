//! I/O modules for reference data, the granule catalog, and persisted state

pub mod ancillary;
pub mod blackout;
pub mod burst_db;
pub mod catalog;
pub mod cmr;
pub mod geometry;

pub use ancillary::AncillaryStore;
pub use catalog::{MemoryStateStore, StateStore};
pub use cmr::{CmrClient, CmrGranuleRecord, CmrQuery, GranuleSearch};
