use crate::types::{
    BurstDatabase, CslcError, CslcGranule, CslcResult, FrameId, TemporalRange,
    SENSING_REPEAT_DAYS,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Days the K-1 lookback window is widened on each end to absorb
/// sensing-time jitter around the nominal repeat interval
const LOOKBACK_MARGIN_DAYS: i64 = 5;

/// One logical download batch: every burst granule of one frame and one
/// acquisition cycle
#[derive(Debug, Clone)]
pub struct DownloadBatch {
    pub batch_id: String,
    pub frame_id: FrameId,
    pub acquisition_cycle: i64,
    /// Members keyed by unique id
    pub granules: Vec<CslcGranule>,
}

impl DownloadBatch {
    /// Acquisition time of the batch (all members share a cycle; the
    /// earliest sensing time stands in for the batch)
    pub fn acquisition_ts(&self) -> DateTime<Utc> {
        self.granules
            .iter()
            .map(|g| g.acquisition_ts)
            .min()
            .expect("a batch always has at least one member")
    }

    fn oldest_discovery(&self) -> DateTime<Utc> {
        self.granules
            .iter()
            .map(|g| g.discovered_at)
            .min()
            .expect("a batch always has at least one member")
    }
}

/// A batch cleared for download, along with the temporal window a
/// follow-up query must cover so the K-cycle dependency chain is
/// materialized alongside it
#[derive(Debug, Clone)]
pub struct EligibleBatch {
    pub batch: DownloadBatch,
    pub lookback: TemporalRange,
}

/// Merge newly queried granules with previously-seen-but-unsubmitted
/// ones and return the batches eligible for download.
///
/// Granules merge by download batch id, then by unique id inside each
/// batch; a freshly queried copy replaces a stale unsubmitted one with
/// the same unique id. A batch becomes eligible when it is complete
/// (member count equals the frame's burst count) or when its oldest
/// member has waited longer than `grace` (stale-but-incomplete batches
/// are flushed anyway). A batch can never hold more members than the
/// frame has bursts; that is corrupted bookkeeping and fails loudly.
pub fn group_for_download(
    new_granules: Vec<CslcGranule>,
    unsubmitted: Vec<CslcGranule>,
    db: &BurstDatabase,
    k: usize,
    grace: chrono::Duration,
    now: DateTime<Utc>,
) -> CslcResult<Vec<EligibleBatch>> {
    let mut merged: BTreeMap<String, BTreeMap<String, CslcGranule>> = BTreeMap::new();

    // Unsubmitted first so new copies overwrite stale ones
    for granule in unsubmitted.into_iter().chain(new_granules) {
        let batch_id = granule.batch_key()?.to_string();
        let unique_id = granule.unique_id.clone().ok_or_else(|| {
            CslcError::Consistency(format!(
                "granule {} reached grouping without a unique id",
                granule.granule_id
            ))
        })?;
        merged.entry(batch_id).or_default().insert(unique_id, granule);
    }

    let mut eligible = Vec::new();
    for (batch_id, members) in merged {
        let granules: Vec<CslcGranule> = members.into_values().collect();
        let first = &granules[0];
        let frame_id = first.frame_id.ok_or_else(|| {
            CslcError::Consistency(format!("batch {} has no frame id", batch_id))
        })?;
        let acquisition_cycle = first.acquisition_cycle.ok_or_else(|| {
            CslcError::Consistency(format!("batch {} has no acquisition cycle", batch_id))
        })?;

        let max_bursts = db.frame(frame_id)?.burst_count();
        if granules.len() > max_bursts {
            return Err(CslcError::Consistency(format!(
                "batch {} holds {} granules but frame {} has only {} bursts",
                batch_id,
                granules.len(),
                frame_id,
                max_bursts
            )));
        }

        let batch = DownloadBatch {
            batch_id: batch_id.clone(),
            frame_id,
            acquisition_cycle,
            granules,
        };

        let complete = batch.granules.len() == max_bursts;
        let stale = now - batch.oldest_discovery() > grace;
        if complete || stale {
            if stale && !complete {
                log::warn!(
                    "Batch {} flushed incomplete after grace period ({}/{} bursts)",
                    batch_id,
                    batch.granules.len(),
                    max_bursts
                );
            }
            let lookback = lookback_window(&batch, k);
            eligible.push(EligibleBatch { batch, lookback });
        } else {
            log::debug!(
                "Batch {} not yet eligible ({}/{} bursts, within grace period)",
                batch_id,
                batch.granules.len(),
                max_bursts
            );
        }
    }

    log::info!("{} batch(es) eligible for download", eligible.len());
    Ok(eligible)
}

/// Temporal window for the secondary fetch that materializes the K-1
/// prior acquisitions of the batch's frame: shifted back one repeat
/// interval per prior cycle plus margin, then widened by the margin on
/// both ends
pub fn lookback_window(batch: &DownloadBatch, k: usize) -> TemporalRange {
    let acquisition = batch.acquisition_ts();
    let span_days = SENSING_REPEAT_DAYS * (k as i64 - 1) + LOOKBACK_MARGIN_DAYS;
    TemporalRange::new(acquisition - chrono::Duration::days(span_days), acquisition)
        .expanded_by_days(LOOKBACK_MARGIN_DAYS)
}
