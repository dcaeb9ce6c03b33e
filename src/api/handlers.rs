//! API Handlers
//!
//! HTTP request handlers for the admin endpoints. Each one is a thin shell
//! over a [`CacheClient`] operation; values travel as JSON.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{CacheClient, InvalidationRequest};
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, DeleteResponse, GetResponse, HasResponse, HealthResponse, InvalidateResponse,
    MessageResponse, SetRequest, SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cache client; clones share the same store, queue and counters
    pub cache: CacheClient,
}

impl AppState {
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }
}

fn check_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(msg) => Err(CacheError::InvalidRequest(msg)),
        None => Ok(()),
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.set(&req.key, &req.value, req.options()).await;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// A store outage reads as a miss, so it also answers 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    check_key(&key)?;

    match state.cache.get::<Value>(&key).await {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    check_key(&key)?;

    let deleted = state.cache.delete(&key).await;

    Ok(Json(DeleteResponse::new(key, deleted)))
}

/// Handler for GET /has/:key
pub async fn has_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<HasResponse>> {
    check_key(&key)?;

    let exists = state.cache.has(&key).await;

    Ok(Json(HasResponse { key, exists }))
}

/// Handler for POST /invalidate
///
/// Takes the same `{key?, pattern?, tags?}` payload as the invalidation
/// channel and applies it the same way.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidationRequest>,
) -> Result<Json<InvalidateResponse>> {
    if req.is_empty() {
        return Err(CacheError::InvalidRequest(
            "At least one of key, pattern or tags is required".to_string(),
        ));
    }

    let removed = state.cache.invalidate(&req).await;

    Ok(Json(InvalidateResponse { removed }))
}

/// Handler for DELETE /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.cache.clear().await;
    Json(MessageResponse::new("Cache cleared"))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.cache.stats().await.into())
}

/// Handler for POST /stats/reset
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.cache.reset_stats();
    Json(MessageResponse::new("Statistics reset"))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let available = state.cache.is_available().await;
    Json(HealthResponse::new(state.cache.store_name(), available))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState::new(CacheClient::new(
            Arc::new(MemoryStore::new()),
            &Config::default(),
        ))
    }

    fn set_request(key: &str, value: Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            ttl: None,
            tags: Vec::new(),
            staggered: false,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state();

        let req = set_request("menu:42", json!({"dishes": ["pad thai"]}));
        let result = set_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let response = get_handler(State(state), Path("menu:42".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, json!({"dishes": ["pad thai"]}));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let state = test_state();

        let result = get_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = test_state();
        set_handler(State(state.clone()), Json(set_request("to_delete", json!("v"))))
            .await
            .unwrap();

        let response = delete_handler(State(state.clone()), Path("to_delete".to_string()))
            .await
            .unwrap();
        assert!(response.deleted);

        let response = has_handler(State(state), Path("to_delete".to_string()))
            .await
            .unwrap();
        assert!(!response.exists);
    }

    #[tokio::test]
    async fn test_invalidate_handler_rejects_empty_request() {
        let state = test_state();

        let result = invalidate_handler(State(state), Json(InvalidationRequest::default())).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state();

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert_eq!(response.size, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler(State(test_state())).await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.store, "memory");
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let state = test_state();

        let result = set_handler(State(state), Json(set_request("", json!(1)))).await;
        assert!(result.is_err());
    }
}
