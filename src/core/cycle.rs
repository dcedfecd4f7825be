use crate::core::acquisition::day_index;
use crate::core::compressed::group_by_day_index;
use crate::io::cmr::{to_cslc_granules, CmrQuery, GranuleSearch};
use crate::types::{
    BurstDatabase, CslcGranule, CslcResult, FrameId, FrameRecord, TemporalRange,
};
use chrono::{DateTime, Utc};

/// Every day index of `frame` strictly before `day_index`.
///
/// Inside the historical baseline this is a direct lookup. Past the
/// baseline, the catalog is queried from just after the frame's last
/// recorded sensing time through the calendar date `day_index` implies,
/// and complete acquisitions found there extend the historical list.
pub fn previous_day_indices(
    day_index_of_interest: i64,
    frame_id: FrameId,
    db: &BurstDatabase,
    searcher: &dyn GranuleSearch,
) -> CslcResult<Vec<i64>> {
    let frame = db.frame(frame_id)?;

    if frame.is_within_historical(day_index_of_interest) {
        return Ok(historical_before(frame, day_index_of_interest));
    }

    let discovered = discover_extension_indices(day_index_of_interest, frame, searcher)?;
    let mut indices = frame.day_indices.clone();
    indices.extend(discovered);
    Ok(indices)
}

/// Position of a day index inside the repeating K-cycle, in [0, k-1].
/// 0 means "start of cycle".
///
/// A day index recorded in the baseline takes its 1-based position in
/// the historical list modulo k. Past the baseline the position is
/// `(historical + discovered + 1) % k`; the extra 1 relative to the
/// historical formula skips the cycle under consideration.
pub fn k_cycle_position(
    day_index_of_interest: i64,
    frame_id: FrameId,
    db: &BurstDatabase,
    k: usize,
    searcher: &dyn GranuleSearch,
) -> CslcResult<usize> {
    let frame = db.frame(frame_id)?;

    if let Some(position) = frame
        .day_indices
        .iter()
        .position(|&index| index == day_index_of_interest)
    {
        return Ok((position + 1) % k);
    }

    let discovered = discover_extension_indices(day_index_of_interest, frame, searcher)?;
    Ok((frame.day_indices.len() + discovered.len() + 1) % k)
}

/// K-cycle position for a timestamp; the day index is derived from the
/// frame epoch first
pub fn k_cycle_position_for_timestamp(
    ts: DateTime<Utc>,
    frame_id: FrameId,
    db: &BurstDatabase,
    k: usize,
    searcher: &dyn GranuleSearch,
) -> CslcResult<usize> {
    let frame = db.frame(frame_id)?;
    let index = day_index(ts, frame.epoch())?;
    k_cycle_position(index, frame_id, db, k, searcher)
}

fn historical_before(frame: &FrameRecord, day_index_of_interest: i64) -> Vec<i64> {
    frame
        .day_indices
        .iter()
        .copied()
        .filter(|&index| index < day_index_of_interest)
        .collect()
}

/// The temporal window used to extend a frame's day-index list past the
/// historical baseline: 30 minutes after the last recorded sensing time
/// through the calendar date the day index implies
pub fn extension_window(frame: &FrameRecord, day_index_of_interest: i64) -> TemporalRange {
    TemporalRange::new(
        frame.last_sensing() + chrono::Duration::minutes(30),
        frame.epoch() + chrono::Duration::days(day_index_of_interest),
    )
}

fn discover_extension_indices(
    day_index_of_interest: i64,
    frame: &FrameRecord,
    searcher: &dyn GranuleSearch,
) -> CslcResult<Vec<i64>> {
    let window = extension_window(frame, day_index_of_interest);
    let query = CmrQuery::for_frame(frame, Some(window));
    let records = searcher.search(&query)?;
    let granules = to_cslc_granules(records, Utc::now());

    let discovered = reduce_extension_results(&granules, frame, day_index_of_interest)?;
    log::info!(
        "Frame {}: extended day-index list with {} complete acquisition(s) past the baseline",
        frame.frame_id,
        discovered.len()
    );
    Ok(discovered)
}

/// Reduce extension query results to the sorted day indices of complete
/// acquisitions strictly before the day index of interest. Pure function
/// of the query result, so resolver behavior is testable without a
/// network boundary.
pub fn reduce_extension_results(
    granules: &[CslcGranule],
    frame: &FrameRecord,
    day_index_of_interest: i64,
) -> CslcResult<Vec<i64>> {
    let (complete_days, _) = group_by_day_index(granules, frame)?;
    Ok(complete_days
        .into_keys()
        .filter(|&index| index < day_index_of_interest)
        .collect())
}
