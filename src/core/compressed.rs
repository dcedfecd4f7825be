use crate::core::acquisition::day_index;
use crate::io::catalog::StateStore;
use crate::types::{CslcError, CslcGranule, CslcResult, FrameRecord};
use std::collections::{BTreeMap, BTreeSet};

/// Group granules by the day index of their acquisition relative to the
/// frame epoch, returning only day indices whose burst set covers the
/// frame's full burst set. An incomplete acquisition cannot anchor a
/// cycle.
///
/// When the same burst appears more than once on a day (reacquisition
/// or reprocessing), the lexicographically greatest native id wins as a
/// proxy for the most recent production.
pub fn group_by_day_index(
    granules: &[CslcGranule],
    frame: &FrameRecord,
) -> CslcResult<(BTreeMap<i64, BTreeSet<String>>, BTreeMap<i64, Vec<CslcGranule>>)> {
    // Revision de-duplication: (day, burst) -> granule with greatest id
    let mut latest: BTreeMap<(i64, String), CslcGranule> = BTreeMap::new();
    for granule in granules {
        let index = day_index(granule.acquisition_ts, frame.epoch())?;
        let key = (index, granule.burst_id.clone());
        match latest.get(&key) {
            Some(existing) if existing.granule_id >= granule.granule_id => {}
            _ => {
                latest.insert(key, granule.clone());
            }
        }
    }

    let mut burst_sets: BTreeMap<i64, BTreeSet<String>> = BTreeMap::new();
    let mut granule_groups: BTreeMap<i64, Vec<CslcGranule>> = BTreeMap::new();
    for ((index, burst_id), granule) in latest {
        burst_sets.entry(index).or_default().insert(burst_id);
        granule_groups.entry(index).or_default().push(granule);
    }

    // Drop incomplete days
    let complete: Vec<i64> = burst_sets
        .iter()
        .filter(|(_, bursts)| bursts.is_superset(&frame.burst_ids))
        .map(|(&index, _)| index)
        .collect();
    for index in burst_sets.keys().copied().collect::<Vec<_>>() {
        if !complete.contains(&index) {
            log::debug!(
                "Frame {}: day index {} has an incomplete burst set, discarding",
                frame.frame_id,
                index
            );
            burst_sets.remove(&index);
            granule_groups.remove(&index);
        }
    }

    Ok((burst_sets, granule_groups))
}

/// Expected native id of the compressed CSLC product `offset` K-cycles
/// back: the day index at the end of the last complete K-cycle, shifted
/// back `offset` whole cycles, combined with the lower-cased burst id.
pub fn compressed_cslc_id(
    previous_day_indices: &[i64],
    offset: usize,
    k: usize,
    burst_id: &str,
) -> CslcResult<String> {
    if k == 0 {
        return Err(CslcError::Consistency("k must be positive".to_string()));
    }
    let last_multiple = k * (previous_day_indices.len() / k);
    let position = last_multiple
        .checked_sub(1 + offset * k)
        .ok_or_else(|| {
            CslcError::Consistency(format!(
                "offset {} reaches before the first K-cycle ({} previous indices, k={})",
                offset,
                previous_day_indices.len(),
                k
            ))
        })?;
    let target_index = previous_day_indices[position];
    Ok(format!(
        "{}_{}",
        burst_id.to_lowercase().replace('-', "_"),
        target_index
    ))
}

/// Whether every compressed dependency product for this frame and
/// day-index history exists in the persisted catalog.
///
/// M counts the cycle under consideration, so `m - 1` compressed
/// products are probed per burst, spaced K cycles apart. During the
/// first reprocessing cycles the history is shallower than `k * (m-1)`;
/// the effective M is reduced so those cycles do not spuriously fail.
/// A missing dependency is a negative result, not an error; the caller
/// retries later.
pub fn dependencies_satisfied(
    previous_day_indices: &[i64],
    frame: &FrameRecord,
    k: usize,
    m: usize,
    store: &dyn StateStore,
) -> CslcResult<bool> {
    if k == 0 || m == 0 {
        return Err(CslcError::Consistency(
            "k and m must be positive".to_string(),
        ));
    }

    let mut effective_m = m;
    if previous_day_indices.len() < k * (m - 1) {
        effective_m = previous_day_indices.len() / k + 1;
        log::info!(
            "Frame {}: only {} previous day indices, reducing M from {} to {}",
            frame.frame_id,
            previous_day_indices.len(),
            m,
            effective_m
        );
    }

    for offset in 0..effective_m.saturating_sub(1) {
        for burst_id in &frame.burst_ids {
            let compressed_id =
                compressed_cslc_id(previous_day_indices, offset, k, burst_id)?;
            if !store.contains_compressed(&compressed_id)? {
                log::info!(
                    "Frame {}: compressed dependency {} not yet in the catalog",
                    frame.frame_id,
                    compressed_id
                );
                return Ok(false);
            }
        }
    }

    Ok(true)
}
