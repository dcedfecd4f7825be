//! Core burst/frame/acquisition-cycle indexing and dependency resolution

pub mod acquisition;
pub mod batch;
pub mod blackout_filter;
pub mod compressed;
pub mod cycle;
pub mod pattern;

// Re-export main types
pub use acquisition::{DecorateOptions, NativeIdParts};
pub use batch::{DownloadBatch, EligibleBatch};
pub use pattern::PatternTrie;
