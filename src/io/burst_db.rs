use crate::core::acquisition::{day_index, normalize_burst_id};
use crate::types::{BurstDatabase, CslcError, CslcResult, FrameId, FrameRecord};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// One frame entry of the historical burst database JSON
#[derive(Debug, Deserialize)]
struct FrameEntry {
    burst_id_list: Vec<String>,
    sensing_time_list: Vec<String>,
}

/// Load the historical burst database from a JSON file.
///
/// The source document is an object keyed by frame-id string, each value
/// carrying a burst-id list and a sensing-datetime list. The result is
/// immutable for the lifetime of the process.
pub fn load_burst_database<P: AsRef<Path>>(path: P) -> CslcResult<BurstDatabase> {
    log::info!(
        "Loading historical burst database from: {}",
        path.as_ref().display()
    );
    let content = std::fs::read_to_string(&path)?;
    parse_burst_database(&content)
}

/// Parse the historical burst database from JSON text.
///
/// For each frame: burst ids are normalized to the canonical format,
/// sensing datetimes are sorted ascending, and a day index is computed
/// for every sensing datetime relative to the frame's first one. These
/// indices are computed exactly once here and never recomputed for
/// historical entries.
///
/// A burst mapping to more than two frames is corrupted reference data
/// and fails the whole load.
pub fn parse_burst_database(json_text: &str) -> CslcResult<BurstDatabase> {
    let raw: HashMap<String, FrameEntry> = serde_json::from_str(json_text)?;

    // Source databases are keyed ascending by frame id; iterate that way
    // so burst-to-frame insertion order (primary vs. secondary frame) is
    // reproducible.
    let mut frame_ids: Vec<FrameId> = Vec::with_capacity(raw.len());
    for key in raw.keys() {
        let frame_id: FrameId = key.parse().map_err(|_| {
            CslcError::InvalidFormat(format!("non-numeric frame id in burst database: {}", key))
        })?;
        frame_ids.push(frame_id);
    }
    frame_ids.sort_unstable();

    let mut db = BurstDatabase::default();

    for frame_id in frame_ids {
        let entry = &raw[&frame_id.to_string()];

        if entry.burst_id_list.is_empty() || entry.sensing_time_list.is_empty() {
            return Err(CslcError::Database(format!(
                "frame {} has an empty burst or sensing-time list",
                frame_id
            )));
        }

        let mut sensing_datetimes: Vec<DateTime<Utc>> = Vec::with_capacity(
            entry.sensing_time_list.len(),
        );
        for raw_ts in &entry.sensing_time_list {
            sensing_datetimes.push(parse_sensing_time(raw_ts)?);
        }
        sensing_datetimes.sort_unstable();

        let epoch = sensing_datetimes[0];
        let mut day_indices = Vec::with_capacity(sensing_datetimes.len());
        for ts in &sensing_datetimes {
            // Ambiguity in the reference data itself is fatal for the load
            day_indices.push(day_index(*ts, epoch)?);
        }

        let mut burst_ids = BTreeSet::new();
        for raw_id in &entry.burst_id_list {
            let burst_id = normalize_burst_id(raw_id);
            let members = db.burst_to_frames.entry(burst_id.clone()).or_default();
            if !members.contains(&frame_id) {
                members.push(frame_id);
            }
            if members.len() > 2 {
                return Err(CslcError::Database(format!(
                    "burst {} maps to more than two frames: {:?}",
                    burst_id, members
                )));
            }
            burst_ids.insert(burst_id);
        }

        db.frames.insert(
            frame_id,
            FrameRecord {
                frame_id,
                burst_ids,
                sensing_datetimes,
                day_indices,
            },
        );
    }

    log::info!(
        "Loaded burst database: {} frames, {} distinct bursts",
        db.frames.len(),
        db.burst_to_frames.len()
    );

    Ok(db)
}

/// Parse an ISO-8601 sensing time, with or without fractional seconds or
/// a trailing Z
pub fn parse_sensing_time(raw: &str) -> CslcResult<DateTime<Utc>> {
    let trimmed = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            CslcError::InvalidFormat(format!("bad sensing time {}: {}", raw, e))
        })
}
