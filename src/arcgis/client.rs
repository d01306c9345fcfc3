//! HTTP client for one ArcGIS FeatureServer/MapServer layer.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use geo_types::Polygon;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::metadata::{LayerInfo, DEFAULT_OID_FIELD, OID_FIELD_CANDIDATES};
use super::query::{decode_page, FeaturePage, PageRequest, PageWalk};
use crate::geometry;

/// How many directory levels above the query endpoint to search for a
/// document reporting `currentVersion`.
const VERSION_WALK_DEPTH: usize = 6;

/// How many consecutive empty pages end a pagination walk.
const ZERO_REPLY_BUDGET: u32 = 6;

/// Client for a single layer's `query` endpoint.
pub struct ArcGisClient {
    client: Client,
    /// The `.../query` endpoint requests are POSTed to.
    query_url: Url,
    /// The layer resource itself, one segment up, for metadata.
    layer_url: Url,
    /// OID field used for `orderByFields`.
    oid_field: String,
    /// Candidate attribute names for OID extraction, most likely first.
    oid_candidates: Vec<String>,
    order_by_oid: bool,
}

impl ArcGisClient {
    /// Build a client for a layer URL, with or without a trailing `/query`.
    ///
    /// Any query string on the URL is dropped.
    pub fn new(url: &str) -> Result<Self> {
        let base = url.split('?').next().unwrap_or(url).trim_end_matches('/');
        let parsed =
            Url::parse(base).with_context(|| format!("Invalid server URL: {}", url))?;

        let (query_url, layer_url) = if parsed.path().ends_with("/query") {
            let mut layer = parsed.clone();
            layer
                .path_segments_mut()
                .map_err(|_| anyhow!("Server URL cannot be a base: {}", url))?
                .pop();
            (parsed, layer)
        } else {
            let mut query = parsed.clone();
            query
                .path_segments_mut()
                .map_err(|_| anyhow!("Server URL cannot be a base: {}", url))?
                .push("query");
            (query, parsed)
        };

        let client = Client::builder()
            .user_agent("surveyor/0.1 (pagination probe)")
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            query_url,
            layer_url,
            oid_field: DEFAULT_OID_FIELD.to_string(),
            oid_candidates: OID_FIELD_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            order_by_oid: false,
        })
    }

    /// Order query results by `<oid field> DESC` so repeated queries have a
    /// nominal expected ordering.
    pub fn with_order_by_oid(mut self) -> Self {
        self.order_by_oid = true;
        self
    }

    pub fn host(&self) -> &str {
        self.query_url.host_str().unwrap_or("unknown")
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    pub fn oid_field(&self) -> &str {
        &self.oid_field
    }

    /// Adopt the layer's declared OID field, trying it first during extraction.
    pub fn set_oid_field(&mut self, name: &str) {
        self.oid_field = name.to_string();
        if !self.oid_candidates.iter().any(|c| c == name) {
            self.oid_candidates.insert(0, name.to_string());
        }
    }

    async fn fetch_pjson(&self, url: &Url) -> Result<Value> {
        let response = self
            .client
            .get(url.clone())
            .query(&[("f", "pjson")])
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned error status", url))?;

        let doc = response
            .json::<Value>()
            .await
            .with_context(|| format!("Malformed JSON from {}", url))?;
        Ok(doc)
    }

    /// Walk up the service URL one segment at a time until a document
    /// reporting `currentVersion` is found.
    pub async fn server_version(&self) -> Option<f64> {
        let mut url = self.query_url.clone();
        for _ in 0..VERSION_WALK_DEPTH {
            {
                let mut segments = url.path_segments_mut().ok()?;
                segments.pop();
            }
            match self.fetch_pjson(&url).await {
                Ok(doc) => {
                    if let Some(version) = doc.get("currentVersion").and_then(Value::as_f64) {
                        return Some(version);
                    }
                }
                Err(e) => warn!("Metadata fetch failed for {}: {:#}", url, e),
            }
        }
        None
    }

    /// Fetch the layer resource document (extent, fields, version).
    pub async fn layer_info(&self) -> Option<LayerInfo> {
        match self.fetch_pjson(&self.layer_url).await {
            Ok(doc) => match serde_json::from_value::<LayerInfo>(doc) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("Unreadable layer document from {}: {}", self.layer_url, e);
                    None
                }
            },
            Err(e) => {
                warn!("Layer metadata fetch failed for {}: {:#}", self.layer_url, e);
                None
            }
        }
    }

    /// Issue one paginated query for the polygon and decode the OIDs.
    ///
    /// A response without a `features` key is logged together with the query
    /// that produced it and treated as an empty page.
    pub async fn query_page(
        &self,
        polygon: &Polygon<f64>,
        request: PageRequest,
    ) -> Result<FeaturePage> {
        let geometry_json = geometry::to_esri_json(polygon).to_string();
        let mut form: Vec<(&str, String)> = vec![
            ("geometry", geometry_json.clone()),
            ("geometryType", "esriGeometryPolygon".to_string()),
            ("outFields", "*".to_string()),
            ("returnGeometry", "true".to_string()),
            ("resultOffset", request.offset.to_string()),
            ("resultRecordCount", request.count.to_string()),
            ("f", "pjson".to_string()),
        ];
        if self.order_by_oid {
            form.push(("orderByFields", format!("{} DESC", self.oid_field)));
        }

        let response = self
            .client
            .post(self.query_url.clone())
            .form(&form)
            .send()
            .await
            .with_context(|| format!("POST {}", self.query_url))?;

        let body = response
            .text()
            .await
            .with_context(|| format!("Reading response body from {}", self.query_url))?;
        let doc: Value = serde_json::from_str(&body)
            .with_context(|| format!("Malformed JSON from {}: {}", self.query_url, body))?;

        match decode_page(&doc, &self.oid_candidates)? {
            Some(page) => Ok(page),
            None => {
                warn!(
                    "Response without features from {}:\n{}\n^^ query geometry={} offset={} count={}",
                    self.query_url, body, geometry_json, request.offset, request.count
                );
                Ok(FeaturePage::default())
            }
        }
    }

    /// Page through everything under the polygon with random page sizes.
    ///
    /// Each round requests between 4 and 10 records; joined together the page
    /// size should not matter. An empty page spends one unit of the zero-reply
    /// budget, a non-empty page restores it, and the offset advances by the
    /// number of features actually received.
    pub async fn query_all_pages<R: Rng>(
        &self,
        rng: &mut R,
        polygon: &Polygon<f64>,
    ) -> Result<PageWalk> {
        let mut walk = PageWalk::default();
        let mut offset = 0usize;
        let mut zero_budget = ZERO_REPLY_BUDGET;

        while zero_budget > 0 {
            let request = PageRequest {
                offset,
                count: rng.random_range(4..=10),
            };
            let page = self.query_page(polygon, request).await?;

            if page.is_empty() {
                zero_budget -= 1;
                if page.exceeded_transfer_limit == Some(true) {
                    debug!(
                        "Empty page with exceededTransferLimit set at offset {}",
                        offset
                    );
                }
            } else {
                zero_budget = ZERO_REPLY_BUDGET;
            }

            offset += page.len();
            walk.push(request, page.oids);
        }

        Ok(walk)
    }
}
