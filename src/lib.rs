//! Data-availability layer for a content-managed school website.
//!
//! The site renders from a hosted table service that is often reached over
//! poor rural connectivity, so every read path is built to degrade: durable
//! local caching with stale-while-revalidate refresh, bounded retry with
//! transient/terminal classification, and a bootstrap fan-out that isolates
//! per-collection failures instead of blanking the page.

pub mod ai;
pub mod app;
pub mod cache;
pub mod config;
pub mod data;
pub mod remote;
pub mod retry;
pub mod router;
pub mod session;
