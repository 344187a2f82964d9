//! Catalog tools: docs, clusters, items, and status reports.
//!
//! Each async function declares the tables it reads and runs its query through
//! [`SyncCache::run`](crate::sync::SyncCache::run), so stale tables are refreshed from
//! the remote before the local read.

pub mod docs;
pub mod health;
pub mod items;

pub use docs::{get_doc_by_id, get_docs_by_cluster, search_docs, ClusterOrDoc, ClusterSummary, Doc};
pub use health::{get_sync_status, health_check, HealthReport, HealthStatus};
pub use items::{
    get_item_analytics, get_item_with_children, search_items, Item, ItemAnalytics,
    ItemWithChildren,
};
