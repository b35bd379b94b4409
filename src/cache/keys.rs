//! Versioned cache keys.
//!
//! The version suffix changes whenever the cached shape changes, so stale
//! entries from an older deploy simply miss instead of deserializing wrong.

pub const CONFIG: &str = "school_config_v1";
pub const POSTS_HOME: &str = "posts_home_v1";
pub const MENU: &str = "menu_items_v1";
pub const STAFF: &str = "staff_list_v1";
pub const DOC_CATS: &str = "doc_categories_v1";

/// Prefix for the per-day visit counter guard; the local date is appended.
pub const VISIT_GUARD_PREFIX: &str = "site_visit_";

/// The largest entry we ever write. Evicted first when the store is full.
pub const LARGE_FOOTPRINT_KEY: &str = POSTS_HOME;
