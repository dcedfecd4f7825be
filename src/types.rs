use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Frame identifier (positive integer from the historical burst database)
pub type FrameId = u32;

/// Seconds per sensing day, used for acquisition-cycle arithmetic
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Sentinel-1 nominal repeat-pass interval in days
pub const SENSING_REPEAT_DAYS: i64 = 12;

/// Fractional-day window around the half-day boundary inside which an
/// acquisition cannot be assigned a day index unambiguously
pub const AMBIGUITY_FRACTION_LOW: f64 = 0.493;
pub const AMBIGUITY_FRACTION_HIGH: f64 = 0.507;

/// Historical record for one frame: which bursts compose it and when it
/// was sensed over the mission baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_id: FrameId,
    /// Canonical burst identifiers (upper-case, dash-separated)
    pub burst_ids: BTreeSet<String>,
    /// Historical sensing datetimes, sorted ascending
    pub sensing_datetimes: Vec<DateTime<Utc>>,
    /// Day index of each sensing datetime relative to the first one.
    /// Same length as `sensing_datetimes`; non-decreasing, may have gaps.
    pub day_indices: Vec<i64>,
}

impl FrameRecord {
    /// The frame epoch: first historical sensing time
    pub fn epoch(&self) -> DateTime<Utc> {
        self.sensing_datetimes[0]
    }

    /// Last historical sensing time
    pub fn last_sensing(&self) -> DateTime<Utc> {
        self.sensing_datetimes[self.sensing_datetimes.len() - 1]
    }

    /// Whether a day index falls inside the recorded historical range
    pub fn is_within_historical(&self, day_index: i64) -> bool {
        day_index <= self.day_indices[self.day_indices.len() - 1]
    }

    /// Number of bursts that make up a complete acquisition of this frame
    pub fn burst_count(&self) -> usize {
        self.burst_ids.len()
    }
}

/// The static historical mapping of frames to bursts and sensing times,
/// loaded once and read-only for the lifetime of the process
#[derive(Debug, Clone, Default)]
pub struct BurstDatabase {
    pub frames: HashMap<FrameId, FrameRecord>,
    /// Burst id to the one or two frames it belongs to, in insertion
    /// order from the source database (first entry is the primary frame)
    pub burst_to_frames: HashMap<String, Vec<FrameId>>,
}

impl BurstDatabase {
    /// Look up a frame, failing loudly if it is not eligible for this
    /// product type at all
    pub fn frame(&self, frame_id: FrameId) -> CslcResult<&FrameRecord> {
        self.frames.get(&frame_id).ok_or_else(|| {
            CslcError::Database(format!(
                "frame {} is not present in the historical burst database",
                frame_id
            ))
        })
    }

    pub fn frames_for_burst(&self, burst_id: &str) -> Option<&Vec<FrameId>> {
        self.burst_to_frames.get(burst_id)
    }
}

/// One blackout window for a frame, held both as day indices (used for
/// membership tests) and as datetimes (used for diagnostics only)
#[derive(Debug, Clone)]
pub struct BlackoutWindow {
    pub start_index: i64,
    pub end_index: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Per-frame blackout windows. A frame absent from the map has no
/// blackout windows (fail-open).
#[derive(Debug, Clone, Default)]
pub struct BlackoutIndex {
    pub windows: HashMap<FrameId, Vec<BlackoutWindow>>,
}

impl BlackoutIndex {
    pub fn window_count(&self, frame_id: FrameId) -> usize {
        self.windows.get(&frame_id).map(|w| w.len()).unwrap_or(0)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Process-wide reference data, constructed explicitly once and passed by
/// reference into every component
#[derive(Debug, Clone, Default)]
pub struct ReferenceContext {
    pub burst_db: BurstDatabase,
    pub blackout: BlackoutIndex,
    pub geo_bounds: HashMap<FrameId, BoundingBox>,
}

impl ReferenceContext {
    pub fn new(
        burst_db: BurstDatabase,
        blackout: BlackoutIndex,
        geo_bounds: HashMap<FrameId, BoundingBox>,
    ) -> Self {
        Self {
            burst_db,
            blackout,
            geo_bounds,
        }
    }
}

/// Inclusive temporal query window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TemporalRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Widen the window by `days` on both ends
    pub fn expanded_by_days(&self, days: i64) -> Self {
        Self {
            start: self.start - chrono::Duration::days(days),
            end: self.end + chrono::Duration::days(days),
        }
    }
}

/// Processing mode, selecting the query-window construction and the
/// dual-frame duplication policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Live forward processing of newly produced granules
    Forward,
    /// Bulk processing of the historical archive
    Historical,
    /// Re-running a previously processed time range
    Reprocessing,
}

impl ProcessingMode {
    /// Only forward processing extends a shared burst into a second
    /// record for its secondary frame; historical and reprocessing runs
    /// are already frame-scoped by their query windows.
    pub fn duplicates_secondary_frame(&self) -> bool {
        matches!(self, ProcessingMode::Forward)
    }

    /// The catalog query window for one scan in this mode. Forward
    /// processing slides a lookback window up to `now`; historical and
    /// reprocessing runs must be given their range explicitly.
    pub fn query_window(
        &self,
        requested: Option<TemporalRange>,
        now: DateTime<Utc>,
        default_lookback: chrono::Duration,
    ) -> CslcResult<TemporalRange> {
        match self {
            ProcessingMode::Forward => Ok(requested
                .unwrap_or_else(|| TemporalRange::new(now - default_lookback, now))),
            ProcessingMode::Historical | ProcessingMode::Reprocessing => {
                requested.ok_or_else(|| {
                    CslcError::InvalidFormat(format!(
                        "{} processing requires an explicit time range",
                        self
                    ))
                })
            }
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::Forward => write!(f, "forward"),
            ProcessingMode::Historical => write!(f, "historical"),
            ProcessingMode::Reprocessing => write!(f, "reprocessing"),
        }
    }
}

impl std::str::FromStr for ProcessingMode {
    type Err = CslcError;

    fn from_str(s: &str) -> CslcResult<Self> {
        match s.to_lowercase().as_str() {
            "forward" => Ok(ProcessingMode::Forward),
            "historical" => Ok(ProcessingMode::Historical),
            "reprocessing" => Ok(ProcessingMode::Reprocessing),
            other => Err(CslcError::InvalidFormat(format!(
                "unknown processing mode: {}",
                other
            ))),
        }
    }
}

/// A CSLC burst granule as it flows through the filter and grouping
/// pipeline. Created from a catalog query result, decorated with frame
/// and cycle fields, then grouped into a download batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CslcGranule {
    /// Native identifier as produced by the catalog
    pub granule_id: String,
    /// Canonical burst id parsed from the native identifier
    pub burst_id: String,
    /// Acquisition sensing time parsed from the native identifier
    pub acquisition_ts: DateTime<Utc>,
    pub revision_id: u32,
    pub production_datetime: Option<DateTime<Utc>>,
    pub related_urls: Vec<String>,
    pub bounding_box: Option<BoundingBox>,
    /// When this record was first seen by a catalog query
    pub discovered_at: DateTime<Utc>,

    // Derived during decoration
    pub frame_id: Option<FrameId>,
    pub acquisition_cycle: Option<i64>,
    pub download_batch_id: Option<String>,
    pub unique_id: Option<String>,
}

impl CslcGranule {
    /// Batch key for a decorated granule; decoration must have happened
    pub fn batch_key(&self) -> CslcResult<&str> {
        self.download_batch_id.as_deref().ok_or_else(|| {
            CslcError::Consistency(format!(
                "granule {} reached grouping without a download batch id",
                self.granule_id
            ))
        })
    }
}

/// Error types for CSLC frame indexing
#[derive(Debug, thiserror::Error)]
pub enum CslcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Reference database error: {0}")]
    Database(String),

    #[error("Ambiguous acquisition time: {0}")]
    AmbiguousDayIndex(String),

    #[error("Catalog query error: {0}")]
    Catalog(String),

    #[error("Internal consistency error: {0}")]
    Consistency(String),
}

/// Result type for CSLC frame indexing operations
pub type CslcResult<T> = Result<T, CslcError>;
