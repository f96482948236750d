//! HTTP retrieval and administration API.
//!
//! Retrieval endpoints read the store directly; trigger endpoints enqueue a
//! command for the controller and acknowledge immediately.

use crate::config::PoolConfig;
use crate::controller::Command;
use crate::error::PoolError;
use crate::proxy::{Protocol, ProxyId};
use crate::store::{PoolSnapshot, ScoredStore};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::warn;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScoredStore>,
    pub config: Arc<PoolConfig>,
    pub commands: mpsc::Sender<Command>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/proxy", get(get_proxy).post(add_proxy))
        .route("/proxy/{*id}", axum::routing::delete(delete_proxy))
        .route("/proxies", get(list_proxies))
        .route("/stats", get(get_stats))
        .route("/crawl", post(trigger_crawl))
        .route("/validate", post(trigger_validate))
        .with_state(state)
}

/// Error envelope returned to API clients.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::NoProxyAvailable => Self::not_found(err.to_string()),
            PoolError::MalformedProxy(_) => Self::bad_request(err.to_string()),
            PoolError::Store(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        }
    }
}

fn parse_protocol(raw: &Option<String>) -> Result<Option<Protocol>, ApiError> {
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(p) => p
            .parse()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("unknown protocol {p:?}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct SampleQuery {
    protocol: Option<String>,
    count: Option<usize>,
}

/// `GET /proxy?protocol=&count=`: sample from the top-ranked window.
async fn get_proxy(
    State(state): State<AppState>,
    Query(query): Query<SampleQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let protocol = parse_protocol(&query.protocol)?;
    let k = query.count.unwrap_or(1).max(1);
    let picked = state
        .store
        .sample(state.config.sample_window, k, protocol)
        .await?;

    let body = match query.count {
        None => json!({ "proxy": picked[0].as_str() }),
        Some(_) => json!({
            "proxies": picked.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
        }),
    };
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    protocol: Option<String>,
}

/// `GET /proxies?limit=&offset=&protocol=`: paginated ranked listing.
async fn list_proxies(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let protocol = parse_protocol(&query.protocol)?;
    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0);

    let size = state.store.count().await?;
    let matching: Vec<(ProxyId, f64)> = state
        .store
        .top(size)
        .await?
        .into_iter()
        .filter(|(id, _)| protocol.map_or(true, |p| id.protocol() == p))
        .collect();

    // Total reflects the filter, so it always agrees with the page.
    let total = matching.len();
    let page: Vec<serde_json::Value> = matching
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|(id, score)| json!({ "proxy": id.as_str(), "score": score }))
        .collect();

    Ok(Json(json!({
        "total": total,
        "offset": offset,
        "proxies": page,
    })))
}

/// `GET /stats`: pool size, protocol histogram, configured thresholds.
async fn get_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = PoolSnapshot::collect(state.store.as_ref()).await?;
    Ok(Json(json!({
        "total_proxies": snapshot.total,
        "protocols": snapshot.protocols,
        "check_interval_secs": state.config.check_interval.as_secs(),
        "min_proxies": state.config.min_proxies,
        "max_proxies": state.config.max_proxies,
    })))
}

fn enqueue(state: &AppState, cmd: Command) -> Json<serde_json::Value> {
    let enqueued = match state.commands.try_send(cmd) {
        Ok(()) => true,
        Err(e) => {
            warn!("could not enqueue background task: {e}");
            false
        }
    };
    Json(json!({ "enqueued": enqueued }))
}

/// `POST /crawl`: enqueue an acquisition run; returns immediately.
async fn trigger_crawl(State(state): State<AppState>) -> Json<serde_json::Value> {
    enqueue(&state, Command::Crawl)
}

/// `POST /validate`: enqueue a full validation pass; returns immediately.
async fn trigger_validate(State(state): State<AppState>) -> Json<serde_json::Value> {
    enqueue(&state, Command::Validate)
}

#[derive(Debug, Deserialize)]
pub struct AddQuery {
    proxy: String,
}

/// `POST /proxy?proxy=`: manual insert at the initial score, validated in
/// the background.
async fn add_proxy(
    State(state): State<AppState>,
    Query(query): Query<AddQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ProxyId::parse(&query.proxy)?;
    let inserted = state
        .store
        .insert_if_absent(&id, crate::store::INITIAL_SCORE)
        .await?;
    enqueue(&state, Command::ValidateOne(id.clone()));
    Ok(Json(json!({
        "proxy": id.as_str(),
        "inserted": inserted,
    })))
}

/// `DELETE /proxy/{id}`: manual removal.
async fn delete_proxy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ProxyId::parse(&id)?;
    if state.store.remove(&id).await? {
        Ok(Json(json!({ "removed": id.as_str() })))
    } else {
        Err(ApiError::not_found(format!("{id} not in pool")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, INITIAL_SCORE};

    fn state_with(store: Arc<dyn ScoredStore>) -> (AppState, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(8);
        (
            AppState {
                store,
                config: Arc::new(PoolConfig::builder().build()),
                commands: tx,
            },
            rx,
        )
    }

    async fn seeded_store() -> Arc<dyn ScoredStore> {
        let store = MemoryStore::new();
        store
            .insert_if_absent(&ProxyId::parse("http://1.1.1.1:80").unwrap(), 15.0)
            .await
            .unwrap();
        store
            .insert_if_absent(&ProxyId::parse("http://2.2.2.2:80").unwrap(), 12.0)
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn get_proxy_misses_on_unmatched_protocol() {
        let (state, _rx) = state_with(seeded_store().await);
        let result = get_proxy(
            State(state),
            Query(SampleQuery {
                protocol: Some("https".to_string()),
                count: None,
            }),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_proxy_returns_a_single_member() {
        let (state, _rx) = state_with(seeded_store().await);
        let body = get_proxy(
            State(state),
            Query(SampleQuery {
                protocol: None,
                count: None,
            }),
        )
        .await
        .unwrap();

        let proxy = body.0["proxy"].as_str().unwrap();
        assert!(proxy.starts_with("http://"));
    }

    #[tokio::test]
    async fn add_proxy_rejects_malformed_identifiers() {
        let (state, _rx) = state_with(seeded_store().await);
        let err = add_proxy(
            State(state),
            Query(AddQuery {
                proxy: "nonsense".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn add_proxy_inserts_and_enqueues_validation() {
        let (state, mut rx) = state_with(Arc::new(MemoryStore::new()));
        let body = add_proxy(
            State(state.clone()),
            Query(AddQuery {
                proxy: "socks5://9.9.9.9:1080".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(body.0["inserted"], true);
        assert_eq!(state.store.count().await.unwrap(), 1);
        let cmd = rx.try_recv().unwrap();
        assert_eq!(
            cmd,
            Command::ValidateOne(ProxyId::parse("socks5://9.9.9.9:1080").unwrap())
        );
    }

    #[tokio::test]
    async fn list_total_matches_the_protocol_filter() {
        let store = MemoryStore::new();
        for (raw, score) in [
            ("http://1.1.1.1:80", 15.0),
            ("http://2.2.2.2:80", 12.0),
            ("socks5://3.3.3.3:1080", 18.0),
        ] {
            store
                .insert_if_absent(&ProxyId::parse(raw).unwrap(), score)
                .await
                .unwrap();
        }
        let (state, _rx) = state_with(Arc::new(store));

        let body = list_proxies(
            State(state),
            Query(ListQuery {
                limit: Some(1),
                offset: None,
                protocol: Some("http".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(body.0["total"], 2);
        let page = body.0["proxies"].as_array().unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["proxy"], "http://1.1.1.1:80");
    }

    #[tokio::test]
    async fn delete_absent_proxy_is_not_found() {
        let (state, _rx) = state_with(Arc::new(MemoryStore::new()));
        let err = delete_proxy(State(state), Path("http://1.1.1.1:80".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_reports_histogram_and_thresholds() {
        let store = MemoryStore::new();
        store
            .insert_if_absent(
                &ProxyId::parse("http://1.1.1.1:80").unwrap(),
                INITIAL_SCORE,
            )
            .await
            .unwrap();
        store
            .insert_if_absent(
                &ProxyId::parse("socks5://2.2.2.2:1080").unwrap(),
                INITIAL_SCORE,
            )
            .await
            .unwrap();
        let (state, _rx) = state_with(Arc::new(store));

        let body = get_stats(State(state)).await.unwrap();
        assert_eq!(body.0["total_proxies"], 2);
        assert_eq!(body.0["protocols"]["http"], 1);
        assert_eq!(body.0["protocols"]["socks5"], 1);
        assert_eq!(body.0["min_proxies"], 50);
    }

    #[tokio::test]
    async fn triggers_enqueue_commands() {
        let (state, mut rx) = state_with(Arc::new(MemoryStore::new()));
        trigger_crawl(State(state.clone())).await;
        trigger_validate(State(state)).await;
        assert_eq!(rx.try_recv().unwrap(), Command::Crawl);
        assert_eq!(rx.try_recv().unwrap(), Command::Validate);
    }
}
