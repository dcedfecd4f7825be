use crate::core::acquisition::day_index;
use crate::io::burst_db::parse_sensing_time;
use crate::types::{
    BlackoutIndex, BlackoutWindow, BurstDatabase, CslcError, CslcResult, FrameId,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Blackout-dates JSON: `{"blackout_dates": {"<frame-id>": [[start, end], ...]}}`.
/// An empty list means the frame has no blackout windows.
#[derive(Debug, Deserialize)]
struct BlackoutFile {
    blackout_dates: HashMap<String, Vec<[String; 2]>>,
}

/// Load the blackout-dates table and convert it to per-frame day-index
/// ranges against each frame's epoch
pub fn load_blackout_index<P: AsRef<Path>>(
    path: P,
    db: &BurstDatabase,
) -> CslcResult<BlackoutIndex> {
    log::info!("Loading blackout dates from: {}", path.as_ref().display());
    let content = std::fs::read_to_string(&path)?;
    parse_blackout_index(&content, db)
}

/// Parse the blackout table from JSON text and build the day-index
/// ranges. The original datetimes are kept alongside for diagnostics;
/// membership tests use the day indices only.
pub fn parse_blackout_index(json_text: &str, db: &BurstDatabase) -> CslcResult<BlackoutIndex> {
    let file: BlackoutFile = serde_json::from_str(json_text)?;
    let mut index = BlackoutIndex::default();

    for (raw_frame_id, ranges) in &file.blackout_dates {
        let frame_id: FrameId = raw_frame_id.parse().map_err(|_| {
            CslcError::InvalidFormat(format!(
                "non-numeric frame id in blackout table: {}",
                raw_frame_id
            ))
        })?;
        let frame = db.frame(frame_id)?;
        let epoch = frame.epoch();

        let mut windows = Vec::with_capacity(ranges.len());
        for [raw_start, raw_end] in ranges {
            let start = parse_sensing_time(raw_start)?;
            let end = parse_sensing_time(raw_end)?;
            windows.push(BlackoutWindow {
                start_index: day_index(start, epoch)?,
                end_index: day_index(end, epoch)?,
                start,
                end,
            });
        }

        log::debug!(
            "Frame {}: {} blackout window(s)",
            frame_id,
            windows.len()
        );
        index.windows.insert(frame_id, windows);
    }

    log::info!(
        "Loaded blackout windows for {} frame(s)",
        index.windows.len()
    );
    Ok(index)
}

/// Whether `ts` falls inside a blackout window of `frame_id`. A frame
/// absent from the table is never blacked out. Both window endpoints are
/// inclusive. Returns the first matching window for diagnostics.
pub fn is_blacked_out<'a>(
    index: &'a BlackoutIndex,
    db: &BurstDatabase,
    frame_id: FrameId,
    ts: DateTime<Utc>,
) -> CslcResult<Option<&'a BlackoutWindow>> {
    let windows = match index.windows.get(&frame_id) {
        Some(windows) => windows,
        None => return Ok(None),
    };

    let frame = db.frame(frame_id)?;
    let index_of_ts = day_index(ts, frame.epoch())?;

    Ok(windows
        .iter()
        .find(|w| w.start_index <= index_of_ts && index_of_ts <= w.end_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::burst_db::parse_burst_database;
    use chrono::TimeZone;

    fn fixture_db() -> BurstDatabase {
        parse_burst_database(
            r#"{
                "831": {
                    "burst_id_list": ["t042_088905_iw1"],
                    "sensing_time_list": ["2016-07-01T16:51:00", "2016-07-13T16:51:00"]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_blackout_window_day_indices() {
        let db = fixture_db();
        let index = parse_blackout_index(
            r#"{"blackout_dates": {"831": [["2016-07-13T16:51:00", "2016-08-06T16:51:00"]]}}"#,
            &db,
        )
        .unwrap();
        let window = &index.windows[&831][0];
        assert_eq!(window.start_index, 12);
        assert_eq!(window.end_index, 36);
    }

    #[test]
    fn test_blackout_end_is_inclusive() {
        let db = fixture_db();
        let index = parse_blackout_index(
            r#"{"blackout_dates": {"831": [["2016-07-13T16:51:00", "2016-08-06T16:51:00"]]}}"#,
            &db,
        )
        .unwrap();

        // Exactly at the end index: blacked out
        let at_end = Utc.with_ymd_and_hms(2016, 8, 6, 16, 51, 0).unwrap();
        assert!(is_blacked_out(&index, &db, 831, at_end).unwrap().is_some());

        // One day index beyond: not blacked out
        let past_end = Utc.with_ymd_and_hms(2016, 8, 7, 16, 51, 0).unwrap();
        assert!(is_blacked_out(&index, &db, 831, past_end).unwrap().is_none());
    }

    #[test]
    fn test_absent_frame_is_fail_open() {
        let db = fixture_db();
        let index = parse_blackout_index(r#"{"blackout_dates": {}}"#, &db).unwrap();
        let ts = Utc.with_ymd_and_hms(2016, 7, 13, 16, 51, 0).unwrap();
        assert!(is_blacked_out(&index, &db, 831, ts).unwrap().is_none());
    }

    #[test]
    fn test_empty_window_list_allowed() {
        let db = fixture_db();
        let index =
            parse_blackout_index(r#"{"blackout_dates": {"831": []}}"#, &db).unwrap();
        assert_eq!(index.window_count(831), 0);
        let ts = Utc.with_ymd_and_hms(2016, 7, 13, 16, 51, 0).unwrap();
        assert!(is_blacked_out(&index, &db, 831, ts).unwrap().is_none());
    }
}
