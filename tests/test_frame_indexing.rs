use chrono::{TimeZone, Utc};
use frameline::core::acquisition::{day_index, day_index_with_seconds};
use frameline::core::blackout_filter::filter_granules;
use frameline::core::DecorateOptions;
use frameline::io::blackout::parse_blackout_index;
use frameline::io::burst_db::parse_burst_database;
use frameline::{CslcError, CslcGranule, ProcessingMode, ReferenceContext, TemporalRange};

/// Frame 831 holds one burst; frame 832 holds that burst plus another,
/// and 832's first sensing time is earlier than 831's.
const DUAL_FRAME_DB: &str = r#"{
    "831": {
        "burst_id_list": ["t042_088905_iw1"],
        "sensing_time_list": ["2016-07-13T16:51:06", "2016-07-25T16:51:07"]
    },
    "832": {
        "burst_id_list": ["t042_088905_iw1", "t042_088906_iw1"],
        "sensing_time_list": ["2016-07-01T16:51:30", "2016-07-13T16:51:31"]
    }
}"#;

fn fixture_ctx() -> ReferenceContext {
    let _ = env_logger::builder().is_test(true).try_init();
    let db = parse_burst_database(DUAL_FRAME_DB).unwrap();
    let blackout = parse_blackout_index(r#"{"blackout_dates": {}}"#, &db).unwrap();
    ReferenceContext::new(db, blackout, Default::default())
}

fn shared_burst_granule(ts: chrono::DateTime<Utc>) -> CslcGranule {
    let native_id = format!(
        "OPERA_L2_CSLC-S1_T042-088905-IW1_{}Z_20160714T000000Z_S1A_VV_v1.0",
        ts.format("%Y%m%dT%H%M%S")
    );
    CslcGranule {
        granule_id: native_id,
        burst_id: "T042-088905-IW1".to_string(),
        acquisition_ts: ts,
        revision_id: 1,
        production_datetime: None,
        related_urls: vec![],
        bounding_box: None,
        discovered_at: ts,
        frame_id: None,
        acquisition_cycle: None,
        download_batch_id: None,
        unique_id: None,
    }
}

#[test]
fn test_shared_burst_decorates_into_both_frames() {
    let ctx = fixture_ctx();

    // 12 days after frame 832's epoch
    let ts = Utc.with_ymd_and_hms(2016, 7, 13, 16, 51, 30).unwrap();
    let out = filter_granules(
        vec![shared_burst_granule(ts)],
        &ctx,
        &DecorateOptions::forward(),
        false,
    )
    .unwrap();

    assert_eq!(out.len(), 2, "one record per member frame");

    let by_frame = |frame_id| {
        out.iter()
            .find(|g| g.frame_id == Some(frame_id))
            .unwrap_or_else(|| panic!("no record for frame {}", frame_id))
    };

    // Each frame measures the cycle from its own epoch
    let for_831 = by_frame(831);
    let for_832 = by_frame(832);
    assert_eq!(for_831.acquisition_cycle, Some(0));
    assert_eq!(for_832.acquisition_cycle, Some(12));
    assert_ne!(for_831.acquisition_cycle, for_832.acquisition_cycle);

    assert_eq!(for_831.download_batch_id.as_deref(), Some("f831_a0"));
    assert_eq!(for_832.download_batch_id.as_deref(), Some("f832_a12"));
    assert_eq!(
        for_832.unique_id.as_deref(),
        Some("f832_a12_T042-088905-IW1")
    );
}

#[test]
fn test_no_duplicate_never_yields_more_than_one_record() {
    let ctx = fixture_ctx();
    let ts = Utc.with_ymd_and_hms(2016, 7, 13, 16, 51, 30).unwrap();
    let opts = DecorateOptions {
        no_duplicate: true,
        ..DecorateOptions::forward()
    };

    let once = filter_granules(vec![shared_burst_granule(ts)], &ctx, &opts, false).unwrap();
    assert_eq!(once.len(), 1);

    // Decorating the already-decorated record again is idempotent
    let twice = filter_granules(once, &ctx, &opts, false).unwrap();
    assert_eq!(twice.len(), 1);
    assert_eq!(twice[0].frame_id, Some(831));
}

#[test]
fn test_force_frame_id_pins_decoration() {
    let ctx = fixture_ctx();
    let ts = Utc.with_ymd_and_hms(2016, 7, 13, 16, 51, 30).unwrap();
    let opts = DecorateOptions {
        force_frame_id: Some(832),
        ..DecorateOptions::forward()
    };

    // A frame-scoped query must not reintroduce the shared-burst fan-out
    let out = filter_granules(vec![shared_burst_granule(ts)], &ctx, &opts, false).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].frame_id, Some(832));
    assert_eq!(out[0].acquisition_cycle, Some(12));
}

#[test]
fn test_day_index_round_trips_historical_entries() {
    let ctx = fixture_ctx();
    for frame in ctx.burst_db.frames.values() {
        for (ts, expected) in frame
            .sensing_datetimes
            .iter()
            .zip(&frame.day_indices)
        {
            assert_eq!(
                day_index(*ts, frame.epoch()).unwrap(),
                *expected,
                "frame {} entry {}",
                frame.frame_id,
                ts
            );
        }
    }
}

#[test]
fn test_ambiguity_guard_boundaries() {
    let epoch = Utc.with_ymd_and_hms(2016, 7, 1, 0, 0, 0).unwrap();

    // Anything more than ~0.01 day from the half-day boundary is safe
    for hours in [0u32, 3, 6, 9, 23] {
        let ts = Utc.with_ymd_and_hms(2016, 7, 13, hours, 0, 0).unwrap();
        assert!(
            day_index(ts, epoch).is_ok(),
            "{}h from epoch should be unambiguous",
            hours
        );
    }

    // Engineered to land inside the (0.493, 0.507) fractional window
    for minutes_past_half in [-8i64, 0, 8] {
        let ts = Utc.with_ymd_and_hms(2016, 7, 13, 12, 0, 0).unwrap()
            + chrono::Duration::minutes(minutes_past_half);
        let err = day_index(ts, epoch).unwrap_err();
        assert!(matches!(err, CslcError::AmbiguousDayIndex(_)));
    }

    // The guard is strict: exactly 0.493 / 0.507 do not trip it
    let seconds_low = (0.493 * 86_400.0) as i64; // 42595.2 truncates below the bound
    let ts_low = epoch + chrono::Duration::days(12) + chrono::Duration::seconds(seconds_low);
    assert!(day_index(ts_low, epoch).is_ok());
}

#[test]
fn test_mode_query_windows() {
    let now = Utc.with_ymd_and_hms(2023, 12, 10, 0, 0, 0).unwrap();
    let lookback = chrono::Duration::minutes(60);

    // Forward mode slides a window up to now when none is requested
    let window = ProcessingMode::Forward
        .query_window(None, now, lookback)
        .unwrap();
    assert_eq!(window.start, now - lookback);
    assert_eq!(window.end, now);

    // Historical and reprocessing runs must be given their range
    assert!(ProcessingMode::Historical
        .query_window(None, now, lookback)
        .is_err());
    let requested = TemporalRange::new(now - chrono::Duration::days(30), now);
    let window = ProcessingMode::Reprocessing
        .query_window(Some(requested), now, lookback)
        .unwrap();
    assert_eq!(window, requested);

    // Window expansion is symmetric
    let expanded = requested.expanded_by_days(5);
    assert_eq!(expanded.start, requested.start - chrono::Duration::days(5));
    assert_eq!(expanded.end, requested.end + chrono::Duration::days(5));

    // Modes round-trip through their string form
    assert_eq!(
        "historical".parse::<ProcessingMode>().unwrap(),
        ProcessingMode::Historical
    );
    assert!("batch".parse::<ProcessingMode>().is_err());
}

#[test]
fn test_signed_second_delta_for_query_windows() {
    let epoch = Utc.with_ymd_and_hms(2016, 7, 13, 16, 51, 6).unwrap();
    let ts = Utc.with_ymd_and_hms(2016, 7, 25, 16, 51, 7).unwrap();
    let (index, seconds) = day_index_with_seconds(ts, epoch).unwrap();
    assert_eq!(index, 12);
    assert_eq!(seconds, 12 * 86_400 + 1);
}
