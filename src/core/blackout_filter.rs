use crate::core::acquisition::{decorate_granule, DecorateOptions};
use crate::io::blackout::is_blacked_out;
use crate::types::{CslcGranule, CslcResult, ReferenceContext};

/// Filter a granule stream against the reference data: drop bursts the
/// historical database does not know, decorate the survivors with frame
/// and cycle fields (duplicating dual-frame bursts when the mode calls
/// for it), then apply the polarization and blackout filters.
///
/// The order is load-bearing: unknown-burst filtering must precede
/// decoration so two-frame duplication only ever sees legitimate bursts,
/// and the polarization/blackout checks run on decorated records.
pub fn filter_granules(
    granules: Vec<CslcGranule>,
    ctx: &ReferenceContext,
    opts: &DecorateOptions,
    vv_only: bool,
) -> CslcResult<Vec<CslcGranule>> {
    let input_count = granules.len();

    // 1. Unknown bursts are not DISP-relevant; excluded, not an error
    let mut known = Vec::with_capacity(granules.len());
    for granule in granules {
        if ctx.burst_db.frames_for_burst(&granule.burst_id).is_some() {
            known.push(granule);
        } else {
            log::info!(
                "Skipping granule {}: burst {} has no frame membership",
                granule.granule_id,
                granule.burst_id
            );
        }
    }

    // 2. Decorate, possibly fanning a shared burst out to both frames
    let mut decorated = Vec::with_capacity(known.len());
    for granule in &known {
        decorated.extend(decorate_granule(granule, &ctx.burst_db, opts)?);
    }

    // 3. Polarization filter on the native identifier
    if vv_only {
        decorated.retain(|granule| {
            let keep = granule.granule_id.contains("_VV_");
            if !keep {
                log::debug!("Skipping non-VV granule {}", granule.granule_id);
            }
            keep
        });
    }

    // 4. Blackout filter per decorated frame
    let mut surviving = Vec::with_capacity(decorated.len());
    for granule in decorated {
        let frame_id = match granule.frame_id {
            Some(frame_id) => frame_id,
            None => {
                return Err(crate::types::CslcError::Consistency(format!(
                    "granule {} left decoration without a frame id",
                    granule.granule_id
                )))
            }
        };
        match is_blacked_out(&ctx.blackout, &ctx.burst_db, frame_id, granule.acquisition_ts)? {
            Some(window) => {
                log::info!(
                    "Skipping granule {}: frame {} is blacked out {} to {}",
                    granule.granule_id,
                    frame_id,
                    window.start,
                    window.end
                );
            }
            None => surviving.push(granule),
        }
    }

    log::info!(
        "Granule filter: {} in, {} out",
        input_count,
        surviving.len()
    );
    Ok(surviving)
}
