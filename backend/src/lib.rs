//! # cwms-data
//!
//! Paginated retrieval core for a hydrologic time-series and location database.
//!
//! Callers ask for pages of time-series readings, the time-series and location catalogs,
//! and reference listings (offices, categories, groups). Large results are walked with
//! opaque page cursors; each page is fetched with a bounded, deterministically ordered
//! query so resuming never duplicates or skips a row.
//!
//! ## Architecture
//!
//! - [`api`]: Data Transfer Objects returned to callers
//! - [`db`]: Repository traits, backends, configuration and the retrieval facade
//! - [`models`]: Time parsing and time window normalization
//! - [`paging`]: Page cursors, bounded query plans and joined-row folding
//! - [`params`]: Query parameter resolution, including deprecated names
//!

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;

pub mod db;
pub mod models;
pub mod paging;
pub mod params;
