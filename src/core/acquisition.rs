use crate::types::{
    BurstDatabase, CslcError, CslcGranule, CslcResult, FrameId, ProcessingMode,
    AMBIGUITY_FRACTION_HIGH, AMBIGUITY_FRACTION_LOW, SECONDS_PER_DAY,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

/// Compute the acquisition day index of `ts` relative to `epoch`, along
/// with the signed whole-second delta for callers that need sub-day
/// precision (query-window construction).
///
/// An acquisition whose fractional day lands strictly inside the
/// half-day ambiguity window cannot be assigned to either neighboring
/// index; downstream grouping depends on exact day-index equality across
/// bursts captured moments apart, so this is a fatal error rather than a
/// silent round.
pub fn day_index_with_seconds(
    ts: DateTime<Utc>,
    epoch: DateTime<Utc>,
) -> CslcResult<(i64, i64)> {
    let seconds = (ts - epoch).num_seconds();
    let raw = seconds as f64 / SECONDS_PER_DAY;
    let fraction = (raw - raw.floor()).abs();

    if fraction > AMBIGUITY_FRACTION_LOW && fraction < AMBIGUITY_FRACTION_HIGH {
        return Err(CslcError::AmbiguousDayIndex(format!(
            "acquisition {} is too close to the half-day boundary of epoch {} \
             (fractional day {:.4})",
            ts, epoch, fraction
        )));
    }

    Ok((raw.round() as i64, seconds))
}

/// Day index only; see `day_index_with_seconds`
pub fn day_index(ts: DateTime<Utc>, epoch: DateTime<Utc>) -> CslcResult<i64> {
    day_index_with_seconds(ts, epoch).map(|(index, _)| index)
}

/// Normalize a burst identifier to the canonical upper-case,
/// dash-separated form used throughout the database (e.g. "T042-088905-IW1")
pub fn normalize_burst_id(raw: &str) -> String {
    raw.to_uppercase().replace('_', "-")
}

/// Fields parsed out of a CSLC native identifier
#[derive(Debug, Clone)]
pub struct NativeIdParts {
    pub burst_id: String,
    pub acquisition_ts: DateTime<Utc>,
    pub satellite: String,
    pub polarization: String,
}

/// Parse a CSLC native identifier of the form
/// `OPERA_L2_CSLC-S1_T042-088905-IW1_20231201T013640Z_20231202T064535Z_S1A_VV_v1.0`
pub fn parse_native_id(native_id: &str) -> CslcResult<NativeIdParts> {
    let pattern = Regex::new(
        r"^OPERA_L2_CSLC-S1_(?P<burst>[Tt]\d{3}[-_]\d{6}[-_][Ii][Ww]\d)_(?P<acq>\d{8}T\d{6})Z_\d{8}T\d{6}Z_(?P<sat>S1[A-D])_(?P<pol>VV|VH|HH|HV)_v[\d.]+$",
    )
    .map_err(|e| CslcError::InvalidFormat(format!("Failed to compile native-id regex: {}", e)))?;

    let captures = pattern.captures(native_id).ok_or_else(|| {
        CslcError::InvalidFormat(format!(
            "native id does not match the CSLC granule format: {}",
            native_id
        ))
    })?;

    let acquisition_ts = NaiveDateTime::parse_from_str(&captures["acq"], "%Y%m%dT%H%M%S")
        .map_err(|e| {
            CslcError::InvalidFormat(format!(
                "bad acquisition timestamp in native id {}: {}",
                native_id, e
            ))
        })?
        .and_utc();

    Ok(NativeIdParts {
        burst_id: normalize_burst_id(&captures["burst"]),
        acquisition_ts,
        satellite: captures["sat"].to_string(),
        polarization: captures["pol"].to_string(),
    })
}

/// Options governing decoration of a granule stream
#[derive(Debug, Clone, Copy)]
pub struct DecorateOptions {
    pub mode: ProcessingMode,
    /// Suppress the secondary-frame copy for dual-frame bursts even in
    /// a mode that would otherwise produce it
    pub no_duplicate: bool,
    /// Pin decoration to one frame when the caller already knows which
    /// frame a targeted query was for
    pub force_frame_id: Option<FrameId>,
}

impl DecorateOptions {
    pub fn forward() -> Self {
        Self {
            mode: ProcessingMode::Forward,
            no_duplicate: false,
            force_frame_id: None,
        }
    }
}

/// Decorate one granule with frame id, acquisition cycle, batch id and
/// unique id. A burst shared by two frames gets one record per frame
/// (each frame has its own day-zero reference, so the two records carry
/// different acquisition cycles); the original record is deep-copied,
/// never mutated in place.
///
/// The caller must have established that the burst id is known to the
/// database; an unknown burst here is an internal error.
pub fn decorate_granule(
    granule: &CslcGranule,
    db: &BurstDatabase,
    opts: &DecorateOptions,
) -> CslcResult<Vec<CslcGranule>> {
    let member_frames = db.frames_for_burst(&granule.burst_id).ok_or_else(|| {
        CslcError::Consistency(format!(
            "burst {} reached decoration without a frame membership",
            granule.burst_id
        ))
    })?;

    let frame_ids: Vec<FrameId> = match opts.force_frame_id {
        Some(forced) => {
            if !member_frames.contains(&forced) {
                return Err(CslcError::Database(format!(
                    "burst {} does not belong to forced frame {}",
                    granule.burst_id, forced
                )));
            }
            vec![forced]
        }
        None => member_frames.clone(),
    };

    let duplicate = frame_ids.len() == 2
        && opts.mode.duplicates_secondary_frame()
        && !opts.no_duplicate
        && opts.force_frame_id.is_none();

    let mut decorated = Vec::with_capacity(if duplicate { 2 } else { 1 });
    let target_frames: &[FrameId] = if duplicate {
        &frame_ids
    } else {
        &frame_ids[..1]
    };

    for &frame_id in target_frames {
        let frame = db.frame(frame_id)?;
        let cycle = day_index(granule.acquisition_ts, frame.epoch())?;

        let mut copy = granule.clone();
        copy.frame_id = Some(frame_id);
        copy.acquisition_cycle = Some(cycle);
        let batch_id = format!("f{}_a{}", frame_id, cycle);
        copy.unique_id = Some(format!("{}_{}", batch_id, copy.burst_id));
        copy.download_batch_id = Some(batch_id);
        decorated.push(copy);
    }

    Ok(decorated)
}
