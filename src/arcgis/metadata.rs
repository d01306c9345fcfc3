//! Layer and service metadata documents.

use serde::Deserialize;

use crate::geometry::Extent;

/// Candidate names for the object-ID attribute, tried in order.
pub const OID_FIELD_CANDIDATES: &[&str] = &[
    "objectid", "OBJECTID", "ObjectID", "oid", "OID", "rowid",
];

/// Assumed OID field when the layer does not declare one.
pub const DEFAULT_OID_FIELD: &str = "objectid";

/// Layer resource document (`<layer-url>?f=pjson`), reduced to the parts we read.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerInfo {
    #[serde(rename = "currentVersion")]
    pub current_version: Option<f64>,
    pub extent: Option<LayerExtent>,
    #[serde(default)]
    pub fields: Vec<LayerField>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LayerExtent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl From<LayerExtent> for Extent {
    fn from(e: LayerExtent) -> Self {
        Extent {
            xmin: e.xmin,
            ymin: e.ymin,
            xmax: e.xmax,
            ymax: e.ymax,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerField {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub alias: Option<String>,
}

impl LayerInfo {
    /// Name of the field typed `esriFieldTypeOID`, if the layer declares one.
    pub fn oid_field(&self) -> Option<String> {
        self.fields
            .iter()
            .find(|f| {
                f.field_type
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case("esriFieldTypeOID"))
            })
            .and_then(|f| f.name.clone().or_else(|| f.alias.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_field_from_layer_doc() {
        let doc = r#"{
            "currentVersion": 11.2,
            "extent": { "xmin": -114.0, "ymin": 31.0, "xmax": -109.0, "ymax": 37.0 },
            "fields": [
                { "name": "shape", "type": "esriFieldTypeGeometry" },
                { "name": "FID", "type": "esriFieldTypeOID", "alias": "FID" },
                { "name": "pop2000", "type": "esriFieldTypeInteger" }
            ]
        }"#;

        let info: LayerInfo = serde_json::from_str(doc).expect("parse layer doc");
        assert_eq!(info.current_version, Some(11.2));
        assert_eq!(info.oid_field(), Some("FID".to_string()));

        let extent: Extent = info.extent.expect("extent").into();
        assert_eq!(extent.xmin, -114.0);
        assert_eq!(extent.ymax, 37.0);
    }

    #[test]
    fn test_oid_field_type_match_is_case_insensitive() {
        let doc = r#"{ "fields": [ { "name": "rowid", "type": "ESRIFIELDTYPEOID" } ] }"#;
        let info: LayerInfo = serde_json::from_str(doc).expect("parse layer doc");
        assert_eq!(info.oid_field(), Some("rowid".to_string()));
    }

    #[test]
    fn test_layer_doc_without_fields() {
        let doc = r#"{ "currentVersion": 10.91 }"#;
        let info: LayerInfo = serde_json::from_str(doc).expect("parse layer doc");
        assert!(info.fields.is_empty());
        assert_eq!(info.oid_field(), None);
        assert!(info.extent.is_none());
    }
}
