//! Caller-provided fetchers for `/api/balances`, `/api/peers`, `/api/routes`
//! (§4.12: "delegated to caller-provided fetchers; 404 when fetcher
//! absent"). The explorer itself owns no account/routing state — it only
//! renders whatever the connector process hands it.

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self) -> Value;
}

#[derive(Default)]
pub struct Fetchers {
    pub balances: Option<std::sync::Arc<dyn Fetcher>>,
    pub peers: Option<std::sync::Arc<dyn Fetcher>>,
    pub routes: Option<std::sync::Arc<dyn Fetcher>>,
}
