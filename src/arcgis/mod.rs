//! Read-only consumption of the ArcGIS FeatureServer/MapServer REST API.

pub mod client;
pub mod metadata;
pub mod query;

pub use client::ArcGisClient;
pub use metadata::{LayerField, LayerInfo};
pub use query::{FeaturePage, Oid, PageRequest, PageWalk};
