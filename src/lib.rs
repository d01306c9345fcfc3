//! Surveyor - pagination-stability probing for ArcGIS feature services
//!
//! This library provides shared types and modules for the stability and probe binaries.

pub mod arcgis;
pub mod config;
pub mod geometry;
pub mod report;

pub use arcgis::{ArcGisClient, FeaturePage, Oid, PageRequest, PageWalk};
pub use geometry::Extent;
