use super::node::ClusterNode;
use crate::protocol::types::ProtocolStatsSnapshot;

use axum::Router;
use axum::extract::{Extension, Json};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const ENDPOINT_STATUS: &str = "/status";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub members: Vec<String>,
    pub types: Vec<String>,
    pub local_entries: usize,
    pub pending_calls: usize,
    pub retained_results: usize,
    pub stats: ProtocolStatsSnapshot,
}

impl StatusResponse {
    pub fn of(node: &ClusterNode) -> Self {
        let ctx = node.context();
        Self {
            node_id: node.local_id().0.clone(),
            members: ctx.directory.sorted_ids().into_iter().map(|id| id.0).collect(),
            types: ctx.registry.list_types(),
            local_entries: ctx.store.len(),
            pending_calls: node.protocol().pending_count(),
            retained_results: node.protocol().retained_count(),
            stats: node.stats(),
        }
    }
}

pub fn status_routes(node: Arc<ClusterNode>) -> Router {
    Router::new()
        .route(ENDPOINT_STATUS, get(handle_status))
        .layer(Extension(node))
}

pub async fn handle_status(Extension(node): Extension<Arc<ClusterNode>>) -> Json<StatusResponse> {
    Json(StatusResponse::of(&node))
}
