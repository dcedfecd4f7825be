use crate::core::acquisition::parse_native_id;
use crate::core::pattern::PatternTrie;
use crate::types::{
    BoundingBox, CslcError, CslcGranule, CslcResult, FrameId, FrameRecord, TemporalRange,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Native-id prefix shared by every CSLC burst granule
pub const CSLC_NATIVE_ID_PREFIX: &str = "OPERA_L2_CSLC-S1_";

/// Bounded fan-out for catalog queries across independent frames, per
/// rate-limit guidance from the external service
pub const CMR_POOL_SIZE: usize = 3;

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const PAGE_SIZE: usize = 2000;

/// CMR `temporal` parameter for a query window
fn temporal_param(range: TemporalRange) -> String {
    format!(
        "{},{}",
        range.start.format("%Y-%m-%dT%H:%M:%SZ"),
        range.end.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

/// A catalog query for CSLC burst granules
#[derive(Debug, Clone)]
pub struct CmrQuery {
    /// Wildcard native-id patterns, OR-combined by the catalog
    pub native_id_patterns: Vec<String>,
    pub temporal: Option<TemporalRange>,
    /// Frame the query is scoped to, when known (diagnostics and
    /// force-frame decoration downstream)
    pub frame_id: Option<FrameId>,
}

impl CmrQuery {
    /// Query for every burst of one frame, built through the pattern
    /// trie so overlapping identifiers collapse into one pattern
    pub fn for_frame(frame: &FrameRecord, temporal: Option<TemporalRange>) -> Self {
        let mut trie = PatternTrie::new();
        for burst_id in &frame.burst_ids {
            trie.insert(burst_id);
        }
        Self {
            native_id_patterns: trie.wildcard_patterns(CSLC_NATIVE_ID_PREFIX),
            temporal,
            frame_id: Some(frame.frame_id),
        }
    }
}

/// One granule record returned by the catalog
#[derive(Debug, Clone)]
pub struct CmrGranuleRecord {
    pub granule_id: String,
    pub revision_id: u32,
    pub production_datetime: Option<DateTime<Utc>>,
    pub related_urls: Vec<String>,
    pub bounding_box: Option<BoundingBox>,
}

/// The external granule-catalog boundary. The live implementation talks
/// to CMR; tests substitute scripted results.
pub trait GranuleSearch: Sync {
    fn search(&self, query: &CmrQuery) -> CslcResult<Vec<CmrGranuleRecord>>;
}

/// Blocking CMR client with paging and bounded retry
pub struct CmrClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl CmrClient {
    pub fn new(base_url: &str) -> CslcResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CslcError::Catalog(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Issue one page request, retrying transient failures with
    /// exponential backoff. Client errors other than throttling are not
    /// retryable and propagate immediately.
    fn fetch_page(
        &self,
        query: &CmrQuery,
        search_after: Option<&str>,
    ) -> CslcResult<(UmmSearchResponse, Option<String>)> {
        let url = format!("{}/search/granules.umm_json", self.base_url);
        let mut params: Vec<(String, String)> = vec![
            ("page_size".to_string(), PAGE_SIZE.to_string()),
            ("options[native-id][pattern]".to_string(), "true".to_string()),
        ];
        for pattern in &query.native_id_patterns {
            params.push(("native-id[]".to_string(), pattern.clone()));
        }
        if let Some(temporal) = query.temporal {
            params.push(("temporal".to_string(), temporal_param(temporal)));
        }

        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self.client.get(&url).query(&params);
            if let Some(token) = search_after {
                request = request.header("CMR-Search-After", token);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let next_token = response
                            .headers()
                            .get("CMR-Search-After")
                            .and_then(|v| v.to_str().ok())
                            .map(|v| v.to_string());
                        let body: UmmSearchResponse = response.json().map_err(|e| {
                            CslcError::Catalog(format!("Bad catalog response: {}", e))
                        })?;
                        return Ok((body, next_token));
                    }

                    // Throttling and server errors are transient;
                    // any other client error is the caller's problem
                    if status.is_client_error() && status.as_u16() != 429 {
                        return Err(CslcError::Catalog(format!(
                            "Catalog query rejected with status {}",
                            status
                        )));
                    }
                    last_error = format!("status {}", status);
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < MAX_ATTEMPTS {
                log::warn!(
                    "Catalog request failed (attempt {}/{}): {}, retrying in {:?}",
                    attempt,
                    MAX_ATTEMPTS,
                    last_error,
                    backoff
                );
                std::thread::sleep(backoff);
                backoff *= 2;
            }
        }

        Err(CslcError::Catalog(format!(
            "Catalog query failed after {} attempts: {}",
            MAX_ATTEMPTS, last_error
        )))
    }
}

impl GranuleSearch for CmrClient {
    fn search(&self, query: &CmrQuery) -> CslcResult<Vec<CmrGranuleRecord>> {
        log::info!(
            "Querying catalog: {} pattern(s), frame {:?}, temporal {:?}",
            query.native_id_patterns.len(),
            query.frame_id,
            query.temporal
        );

        let mut records = Vec::new();
        let mut search_after: Option<String> = None;

        loop {
            let (page, next_token) = self.fetch_page(query, search_after.as_deref())?;
            let page_len = page.items.len();
            for item in page.items {
                records.push(item.into_record());
            }
            log::debug!("Catalog page returned {} granule(s)", page_len);

            // An absent continuation token or a short page ends paging
            match next_token {
                Some(token) if page_len == PAGE_SIZE => search_after = Some(token),
                _ => break,
            }
        }

        log::info!("Catalog query returned {} granule(s) total", records.len());
        Ok(records)
    }
}

/// Run one query per frame on a bounded worker pool
pub fn search_frames(
    searcher: &dyn GranuleSearch,
    queries: &[CmrQuery],
) -> CslcResult<HashMap<FrameId, Vec<CmrGranuleRecord>>> {
    use rayon::prelude::*;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(CMR_POOL_SIZE)
        .build()
        .map_err(|e| CslcError::Catalog(format!("Failed to build query pool: {}", e)))?;

    let results: Vec<CslcResult<(FrameId, Vec<CmrGranuleRecord>)>> = pool.install(|| {
        queries
            .par_iter()
            .map(|query| {
                let frame_id = query.frame_id.ok_or_else(|| {
                    CslcError::Consistency(
                        "frame fan-out requires frame-scoped queries".to_string(),
                    )
                })?;
                Ok((frame_id, searcher.search(query)?))
            })
            .collect()
    });

    let mut by_frame = HashMap::with_capacity(queries.len());
    for result in results {
        let (frame_id, records) = result?;
        by_frame.insert(frame_id, records);
    }
    Ok(by_frame)
}

/// Convert raw catalog records into pipeline granules, skipping records
/// whose native id does not parse. A malformed id in a single record
/// must not abort the batch scan.
pub fn to_cslc_granules(
    records: Vec<CmrGranuleRecord>,
    discovered_at: DateTime<Utc>,
) -> Vec<CslcGranule> {
    let mut granules = Vec::with_capacity(records.len());
    for record in records {
        match parse_native_id(&record.granule_id) {
            Ok(parts) => granules.push(CslcGranule {
                granule_id: record.granule_id,
                burst_id: parts.burst_id,
                acquisition_ts: parts.acquisition_ts,
                revision_id: record.revision_id,
                production_datetime: record.production_datetime,
                related_urls: record.related_urls,
                bounding_box: record.bounding_box,
                discovered_at,
                frame_id: None,
                acquisition_cycle: None,
                download_batch_id: None,
                unique_id: None,
            }),
            Err(e) => {
                log::warn!("Skipping unparseable catalog record {}: {}", record.granule_id, e);
            }
        }
    }
    granules
}

// Trimmed umm_json response shapes; only the fields this pipeline reads

#[derive(Debug, Deserialize)]
struct UmmSearchResponse {
    #[serde(default)]
    items: Vec<UmmItem>,
}

#[derive(Debug, Deserialize)]
struct UmmItem {
    meta: UmmMeta,
    umm: UmmGranule,
}

#[derive(Debug, Deserialize)]
struct UmmMeta {
    #[serde(rename = "revision-id")]
    revision_id: u32,
}

#[derive(Debug, Deserialize)]
struct UmmGranule {
    #[serde(rename = "GranuleUR")]
    granule_ur: String,
    #[serde(rename = "DataGranule", default)]
    data_granule: Option<UmmDataGranule>,
    #[serde(rename = "RelatedUrls", default)]
    related_urls: Vec<UmmRelatedUrl>,
    #[serde(rename = "SpatialExtent", default)]
    spatial_extent: Option<UmmSpatialExtent>,
}

#[derive(Debug, Deserialize)]
struct UmmDataGranule {
    #[serde(rename = "ProductionDateTime")]
    production_datetime: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UmmRelatedUrl {
    #[serde(rename = "URL")]
    url: String,
}

#[derive(Debug, Deserialize)]
struct UmmSpatialExtent {
    #[serde(rename = "HorizontalSpatialDomain")]
    horizontal: Option<UmmHorizontalDomain>,
}

#[derive(Debug, Deserialize)]
struct UmmHorizontalDomain {
    #[serde(rename = "Geometry")]
    geometry: Option<UmmGeometry>,
}

#[derive(Debug, Deserialize)]
struct UmmGeometry {
    #[serde(rename = "BoundingRectangles", default)]
    bounding_rectangles: Vec<UmmBoundingRectangle>,
}

#[derive(Debug, Deserialize)]
struct UmmBoundingRectangle {
    #[serde(rename = "WestBoundingCoordinate")]
    west: f64,
    #[serde(rename = "EastBoundingCoordinate")]
    east: f64,
    #[serde(rename = "SouthBoundingCoordinate")]
    south: f64,
    #[serde(rename = "NorthBoundingCoordinate")]
    north: f64,
}

impl UmmItem {
    fn into_record(self) -> CmrGranuleRecord {
        let bounding_box = self
            .umm
            .spatial_extent
            .and_then(|extent| extent.horizontal)
            .and_then(|horizontal| horizontal.geometry)
            .and_then(|geometry| geometry.bounding_rectangles.into_iter().next())
            .map(|rect| BoundingBox {
                min_lon: rect.west,
                max_lon: rect.east,
                min_lat: rect.south,
                max_lat: rect.north,
            });

        CmrGranuleRecord {
            granule_id: self.umm.granule_ur,
            revision_id: self.meta.revision_id,
            production_datetime: self.umm.data_granule.and_then(|d| d.production_datetime),
            related_urls: self.umm.related_urls.into_iter().map(|u| u.url).collect(),
            bounding_box,
        }
    }
}
