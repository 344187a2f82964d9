pub mod docs_by_cluster;
pub mod get_doc;
pub mod get_item;
pub mod search_docs;
pub mod search_items;

use docs_by_cluster::DocsByClusterParams;
use get_doc::GetDocParams;
use get_item::GetItemParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_docs::SearchDocsParams;
use search_items::SearchItemsParams;
use serde::Serialize;
use std::sync::Arc;

use smartsync::catalog;
use smartsync::sync::{SyncCache, SyncError};

/// The smartsync MCP tool handler. Every tool reads through the shared [`SyncCache`],
/// which refreshes the tables the tool declares before running its local query.
#[derive(Clone)]
pub struct SmartSyncTools {
    tool_router: ToolRouter<Self>,
    cache: Arc<SyncCache>,
}

fn respond<T: Serialize>(result: Result<T, SyncError>) -> Result<String, String> {
    let value = result.map_err(|e| e.to_string())?;
    serde_json::to_string(&value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_router]
impl SmartSyncTools {
    pub fn new(cache: Arc<SyncCache>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            cache,
        }
    }

    #[tool(description = "Search active documentation by title, summary, and keywords. Results are ordered by quality, then relevance.")]
    async fn search_docs(
        &self,
        Parameters(params): Parameters<SearchDocsParams>,
    ) -> Result<String, String> {
        if params.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        tracing::info!(query = %params.query, "search_docs called");
        respond(
            catalog::search_docs(
                &self.cache,
                &params.query,
                params.limit.unwrap_or(10),
                params.category.as_deref(),
                params.difficulty.as_deref(),
            )
            .await,
        )
    }

    #[tool(description = "Get one active doc by id. Returns null when it does not exist.")]
    async fn get_doc_by_id(
        &self,
        Parameters(params): Parameters<GetDocParams>,
    ) -> Result<String, String> {
        respond(catalog::get_doc_by_id(&self.cache, params.id).await)
    }

    #[tool(description = "List the docs of a cluster, or list all clusters (with doc statistics) when no cluster is given.")]
    async fn get_docs_by_cluster(
        &self,
        Parameters(params): Parameters<DocsByClusterParams>,
    ) -> Result<String, String> {
        respond(
            catalog::get_docs_by_cluster(
                &self.cache,
                params.cluster.as_deref(),
                params.include_stats.unwrap_or(true),
                params.limit.unwrap_or(20),
            )
            .await,
        )
    }

    #[tool(description = "Search work items by text, status, and priority. Most urgent and newest first.")]
    async fn search_items(
        &self,
        Parameters(params): Parameters<SearchItemsParams>,
    ) -> Result<String, String> {
        respond(
            catalog::search_items(
                &self.cache,
                params.query.as_deref(),
                params.status.as_deref(),
                params.priority.as_deref(),
                params.limit.unwrap_or(10),
            )
            .await,
        )
    }

    #[tool(description = "Get a work item with its child items and context entries. Returns null when it does not exist.")]
    async fn get_item_with_children(
        &self,
        Parameters(params): Parameters<GetItemParams>,
    ) -> Result<String, String> {
        respond(catalog::get_item_with_children(&self.cache, params.id).await)
    }

    #[tool(description = "Work item analytics: counts by status and priority, and the five active items with the most child items and their completion rate.")]
    async fn get_item_analytics(&self) -> Result<String, String> {
        respond(catalog::get_item_analytics(&self.cache).await)
    }

    #[tool(description = "Sync status: per-table freshness, query and sync statistics, local record counts, and recent sync attempts.")]
    async fn get_sync_status(&self) -> Result<String, String> {
        respond(catalog::get_sync_status(&self.cache).await)
    }

    #[tool(description = "Check catalog health (low-scoring docs, items without children, empty clusters, stale tables) and suggest fixes.")]
    async fn health_check(&self) -> Result<String, String> {
        respond(catalog::health_check(&self.cache).await)
    }
}

#[tool_handler]
impl ServerHandler for SmartSyncTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "smartsync serves a local SQLite catalog kept in sync with a remote libSQL \
                 database. Use search_docs and get_docs_by_cluster for documentation, \
                 search_items and get_item_with_children for work items, and \
                 get_sync_status to see how fresh each table is."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
