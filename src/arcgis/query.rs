//! Paginated feature queries and response decoding.

use hashbrown::HashSet;
use serde_json::Value;
use thiserror::Error;

/// A feature's object ID.
pub type Oid = i64;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("feature has no recognizable object-ID attribute: {0}")]
    MissingOid(String),
    #[error("`features` is not an array")]
    MalformedFeatures,
}

/// One `(resultOffset, resultRecordCount)` pair issued during a page walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub count: usize,
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct FeaturePage {
    /// OIDs in the order the server returned them.
    pub oids: Vec<Oid>,
    /// `exceededTransferLimit` flag, when the server reports it.
    pub exceeded_transfer_limit: Option<bool>,
}

impl FeaturePage {
    pub fn len(&self) -> usize {
        self.oids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oids.is_empty()
    }
}

/// Full record of one pagination walk over a geometry.
///
/// Every page issued is recorded, including empty ones, so the report can
/// show the exact request sequence the server saw.
#[derive(Debug, Default)]
pub struct PageWalk {
    pub requests: Vec<PageRequest>,
    pub pages: Vec<Vec<Oid>>,
}

impl PageWalk {
    pub fn push(&mut self, request: PageRequest, oids: Vec<Oid>) {
        self.requests.push(request);
        self.pages.push(oids);
    }

    /// The pages joined back into one sequence.
    pub fn flattened(&self) -> Vec<Oid> {
        self.pages.iter().flatten().copied().collect()
    }

    /// The set of all OIDs seen across the walk.
    pub fn unique_oids(&self) -> HashSet<Oid> {
        self.pages.iter().flatten().copied().collect()
    }
}

/// Extract the object ID from a single feature document.
///
/// Attributes usually live under `attributes`, but some servers return them
/// flat on the feature itself. The candidate names are tried in order.
pub fn read_oid(feature: &Value, candidates: &[String]) -> Result<Oid, DecodeError> {
    let attributes = feature.get("attributes").unwrap_or(feature);
    for name in candidates {
        if let Some(oid) = attributes.get(name.as_str()).and_then(Value::as_i64) {
            return Ok(oid);
        }
    }
    Err(DecodeError::MissingOid(feature.to_string()))
}

/// Decode a raw `query` response document into a page of OIDs.
///
/// Returns `Ok(None)` when the document carries no `features` key at all
/// (server-side errors come back that way); the caller decides how loudly
/// to complain.
pub fn decode_page(doc: &Value, candidates: &[String]) -> Result<Option<FeaturePage>, DecodeError> {
    let Some(features) = doc.get("features") else {
        return Ok(None);
    };
    let features = features.as_array().ok_or(DecodeError::MalformedFeatures)?;

    let mut oids = Vec::with_capacity(features.len());
    for feature in features {
        oids.push(read_oid(feature, candidates)?);
    }

    Ok(Some(FeaturePage {
        oids,
        exceeded_transfer_limit: doc.get("exceededTransferLimit").and_then(Value::as_bool),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidates() -> Vec<String> {
        crate::arcgis::metadata::OID_FIELD_CANDIDATES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_read_oid_from_attributes() {
        let feature = json!({ "attributes": { "objectid": 17, "name": "somewhere" } });
        assert_eq!(read_oid(&feature, &candidates()).unwrap(), 17);
    }

    #[test]
    fn test_read_oid_from_flat_feature() {
        let feature = json!({ "OBJECTID": 3 });
        assert_eq!(read_oid(&feature, &candidates()).unwrap(), 3);
    }

    #[test]
    fn test_read_oid_prefers_first_candidate() {
        let mut names = candidates();
        names.insert(0, "FID".to_string());
        let feature = json!({ "attributes": { "FID": 1, "objectid": 2 } });
        assert_eq!(read_oid(&feature, &names).unwrap(), 1);
    }

    #[test]
    fn test_read_oid_missing() {
        let feature = json!({ "attributes": { "name": "nameless" } });
        assert!(read_oid(&feature, &candidates()).is_err());
    }

    #[test]
    fn test_decode_page() {
        let doc = json!({
            "features": [
                { "attributes": { "objectid": 5 } },
                { "attributes": { "objectid": 4 } },
                { "attributes": { "objectid": 3 } }
            ],
            "exceededTransferLimit": true
        });

        let page = decode_page(&doc, &candidates()).unwrap().expect("page");
        assert_eq!(page.oids, vec![5, 4, 3]);
        assert_eq!(page.exceeded_transfer_limit, Some(true));
    }

    #[test]
    fn test_decode_page_without_features_key() {
        let doc = json!({ "error": { "code": 400, "message": "Invalid geometry" } });
        assert!(decode_page(&doc, &candidates()).unwrap().is_none());
    }

    #[test]
    fn test_page_walk_accounting() {
        let mut walk = PageWalk::default();
        walk.push(PageRequest { offset: 0, count: 4 }, vec![9, 8, 7, 6]);
        walk.push(PageRequest { offset: 4, count: 5 }, vec![5, 6]);
        walk.push(PageRequest { offset: 6, count: 4 }, vec![]);

        assert_eq!(walk.flattened(), vec![9, 8, 7, 6, 5, 6]);
        // 6 came back twice, so the set is one smaller than the sequence
        assert_eq!(walk.unique_oids().len(), 5);
    }
}
