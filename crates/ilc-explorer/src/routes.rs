//! `explorer_api`: the warp filter tree for the explorer's HTTP and
//! WebSocket surface (§4.12), composed the way `interledger-api`'s
//! `accounts_api` composes `warp::Filter`s — one small `and_then` per
//! concern, `.boxed()` to keep the type signature sane.

use std::convert::Infallible;
use std::sync::Arc;

use ilc_store::EventStore;
use ilc_telemetry::EventBus;
use serde_json::json;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::cors::OriginAllowlist;
use crate::error::{recover, BadQuery};
use crate::fetchers::Fetchers;
use crate::health::{ExplorerHealth, HealthReport, HealthStatus, StartedAt};
use crate::query_params::{EventsQuery, HydrationQuery};
use crate::ws::WsHub;

#[derive(Clone)]
pub struct ExplorerState {
    pub node_id: String,
    pub store: EventStore,
    pub bus: Arc<EventBus>,
    pub ws_hub: Arc<WsHub>,
    pub started_at: StartedAt,
    pub cors: Arc<OriginAllowlist>,
    pub fetchers: Arc<Fetchers>,
}

fn with_state(state: ExplorerState) -> impl Filter<Extract = (ExplorerState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Adds `Access-Control-Allow-Origin` when the request's `Origin` is on
/// the allowlist; otherwise leaves the reply untouched.
fn with_cors(reply: impl Reply, origin: Option<String>, allowlist: &OriginAllowlist) -> Box<dyn Reply> {
    match origin {
        Some(origin) if allowlist.allows(&origin) => {
            Box::new(warp::reply::with_header(reply, "access-control-allow-origin", origin))
        }
        _ => Box::new(reply),
    }
}

pub fn explorer_api(
    state: ExplorerState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let cors_for_options = state.cors.clone();

    let preflight = warp::options()
        .and(warp::header::optional::<String>("origin"))
        .map(move |origin: Option<String>| {
            let reply = warp::reply::with_status(warp::reply::reply(), StatusCode::NO_CONTENT);
            with_cors(reply, origin, &cors_for_options)
        })
        .boxed();

    let get_events = warp::get()
        .and(warp::path("api"))
        .and(warp::path("events"))
        .and(warp::path::end())
        .and(warp::query::<EventsQuery>())
        .and(warp::header::optional::<String>("origin"))
        .and(with_state(state.clone()))
        .and_then(events_handler)
        .boxed();

    let get_accounts_events = warp::get()
        .and(warp::path("api"))
        .and(warp::path("accounts"))
        .and(warp::path("events"))
        .and(warp::path::end())
        .and(warp::query::<HydrationQuery>())
        .and(warp::header::optional::<String>("origin"))
        .and(with_state(state.clone()))
        .and_then(accounts_events_handler)
        .boxed();

    let get_health = warp::get()
        .and(warp::path("api"))
        .and(warp::path("health"))
        .and(warp::path::end())
        .and(warp::header::optional::<String>("origin"))
        .and(with_state(state.clone()))
        .map(health_handler)
        .boxed();

    let get_balances = warp::get()
        .and(warp::path("api"))
        .and(warp::path("balances"))
        .and(warp::path::end())
        .and(warp::header::optional::<String>("origin"))
        .and(with_state(state.clone()))
        .and_then(|origin, state: ExplorerState| fetcher_handler(origin, state, |f| f.balances.clone()))
        .boxed();

    let get_peers = warp::get()
        .and(warp::path("api"))
        .and(warp::path("peers"))
        .and(warp::path::end())
        .and(warp::header::optional::<String>("origin"))
        .and(with_state(state.clone()))
        .and_then(|origin, state: ExplorerState| fetcher_handler(origin, state, |f| f.peers.clone()))
        .boxed();

    let get_routes = warp::get()
        .and(warp::path("api"))
        .and(warp::path("routes"))
        .and(warp::path::end())
        .and(warp::header::optional::<String>("origin"))
        .and(with_state(state.clone()))
        .and_then(|origin, state: ExplorerState| fetcher_handler(origin, state, |f| f.routes.clone()))
        .boxed();

    let ws = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_state(state.clone()))
        .map(|ws: warp::ws::Ws, state: ExplorerState| {
            let hub = state.ws_hub.clone();
            ws.on_upgrade(move |socket| hub.handle_connection(socket))
        })
        .boxed();

    preflight
        .or(get_events)
        .or(get_accounts_events)
        .or(get_health)
        .or(get_balances)
        .or(get_peers)
        .or(get_routes)
        .or(ws)
        .recover(recover)
}

async fn events_handler(
    query: EventsQuery,
    origin: Option<String>,
    state: ExplorerState,
) -> Result<Box<dyn Reply>, Rejection> {
    let filter = query.into_filter();
    let events = state.store.query(&filter).map_err(|e| warp::reject::custom(BadQuery(e)))?;
    let total = state.store.count(&filter);
    let body = json!({
        "events": events.iter().map(|e| &e.event).collect::<Vec<_>>(),
        "total": total,
        "limit": filter.limit,
        "offset": filter.offset,
    });
    Ok(with_cors(warp::reply::json(&body), origin, &state.cors))
}

async fn accounts_events_handler(
    query: HydrationQuery,
    origin: Option<String>,
    state: ExplorerState,
) -> Result<Box<dyn Reply>, Rejection> {
    let filter = query.into_filter();
    let events = state
        .store
        .query_hydration(&filter)
        .map_err(|e| warp::reject::custom(BadQuery(e)))?;
    let body = json!({ "events": events.iter().map(|e| &e.event).collect::<Vec<_>>() });
    Ok(with_cors(warp::reply::json(&body), origin, &state.cors))
}

fn health_handler(origin: Option<String>, state: ExplorerState) -> Box<dyn Reply> {
    let report = HealthReport {
        status: HealthStatus::Healthy,
        node_id: state.node_id.clone(),
        uptime: state.started_at.uptime_seconds(),
        explorer: ExplorerHealth {
            event_count: state.store.total(),
            database_size_bytes: state.store.size(),
            ws_connections: state.ws_hub.connection_count(),
        },
        timestamp: chrono::Utc::now(),
    };
    with_cors(warp::reply::json(&report), origin, &state.cors)
}

async fn fetcher_handler(
    origin: Option<String>,
    state: ExplorerState,
    select: impl FnOnce(&Fetchers) -> Option<Arc<dyn crate::fetchers::Fetcher>>,
) -> Result<Box<dyn Reply>, Rejection> {
    match select(&state.fetchers) {
        Some(fetcher) => {
            let value = fetcher.fetch().await;
            Ok(with_cors(warp::reply::json(&value), origin, &state.cors))
        }
        None => Err(warp::reject::not_found()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ilc_telemetry::{EventBus, TelemetryEvent};
    use serde_json::Value;
    use warp::http::StatusCode;

    struct StaticFetcher(Value);

    #[async_trait]
    impl crate::fetchers::Fetcher for StaticFetcher {
        async fn fetch(&self) -> Value {
            self.0.clone()
        }
    }

    fn test_state() -> ExplorerState {
        ExplorerState {
            node_id: "test-node".to_string(),
            store: EventStore::new(ilc_store::DEFAULT_CAPACITY_BYTES),
            bus: Arc::new(EventBus::new()),
            ws_hub: Arc::new(WsHub::new()),
            started_at: StartedAt::default(),
            cors: Arc::new(OriginAllowlist::new(vec!["https://admin.example.com".to_string()])),
            fetchers: Arc::new(Fetchers::default()),
        }
    }

    #[tokio::test]
    async fn health_never_fails_and_reports_counts() {
        let state = test_state();
        state.store.store(TelemetryEvent::AccountBalance {
            node_id: "test-node".into(),
            timestamp: chrono::Utc::now(),
            peer_id: "alice".into(),
            balance: 1,
        });
        let api = explorer_api(state);
        let resp = warp::test::request().path("/api/health").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["explorer"]["eventCount"], 1);
    }

    #[tokio::test]
    async fn events_rejects_out_of_range_limit_with_400() {
        let api = explorer_api(test_state());
        let resp = warp::test::request()
            .path("/api/events?limit=0")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn events_returns_stored_events_newest_first() {
        let state = test_state();
        state.store.store(TelemetryEvent::AccountBalance {
            node_id: "test-node".into(),
            timestamp: chrono::Utc::now(),
            peer_id: "alice".into(),
            balance: 1,
        });
        state.store.store(TelemetryEvent::AccountBalance {
            node_id: "test-node".into(),
            timestamp: chrono::Utc::now(),
            peer_id: "alice".into(),
            balance: 2,
        });
        let api = explorer_api(state);
        let resp = warp::test::request().path("/api/events").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["total"], 2);
        assert_eq!(body["events"][0]["balance"], 2);
    }

    #[tokio::test]
    async fn balances_404s_when_no_fetcher_is_wired() {
        let api = explorer_api(test_state());
        let resp = warp::test::request().path("/api/balances").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn peers_delegates_to_the_wired_fetcher() {
        let mut state = test_state();
        state.fetchers = Arc::new(Fetchers {
            peers: Some(Arc::new(StaticFetcher(json!({"peers": ["a", "b"]})))),
            ..Default::default()
        });
        let api = explorer_api(state);
        let resp = warp::test::request().path("/api/peers").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["peers"][1], "b");
    }

    #[tokio::test]
    async fn options_preflight_returns_204() {
        let api = explorer_api(test_state());
        let resp = warp::test::request()
            .method("OPTIONS")
            .path("/api/events")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn allowed_origin_gets_cors_header_disallowed_does_not() {
        let api = explorer_api(test_state());
        let resp = warp::test::request()
            .path("/api/health")
            .header("origin", "https://admin.example.com")
            .reply(&api)
            .await;
        assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "https://admin.example.com");

        let resp = warp::test::request()
            .path("/api/health")
            .header("origin", "https://evil.example.com")
            .reply(&api)
            .await;
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }
}
