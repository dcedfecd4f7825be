//! Frameline: A Fast, Modular Sentinel-1 CSLC Burst-to-Frame Indexing Engine
//!
//! This library ingests Sentinel-1 CSLC burst metadata and decides which
//! bursts belong to which fixed geographic frame, where an acquisition
//! sits in the mission timeline and in the repeating K-cycle, and whether
//! the compressed dependency products it needs already exist.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BlackoutIndex, BlackoutWindow, BoundingBox, BurstDatabase, CslcError, CslcGranule,
    CslcResult, FrameId, FrameRecord, ProcessingMode, ReferenceContext, TemporalRange,
};

pub use io::{AncillaryStore, CmrClient, CmrQuery, GranuleSearch, StateStore};

pub use core::{DecorateOptions, DownloadBatch, EligibleBatch, PatternTrie};
