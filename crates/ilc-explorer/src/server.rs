//! Binds `explorer_api` to a port and runs it with the shutdown sequence
//! from §5 Cancellation & timeouts: close every WS client with 1001, then
//! stop accepting HTTP within `shutdown_timeout`.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::oneshot;
use warp::Filter;

use crate::routes::{explorer_api, ExplorerState};

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ExplorerServer {
    state: ExplorerState,
    shutdown_timeout: Duration,
}

impl ExplorerServer {
    pub fn new(state: ExplorerState) -> Self {
        ExplorerServer {
            state,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Serves until `shutdown` resolves, then runs the close sequence.
    pub async fn serve(self, addr: SocketAddr, shutdown: oneshot::Receiver<()>) {
        let ws_hub = self.state.ws_hub.clone();
        let shutdown_timeout = self.shutdown_timeout;
        let routes = explorer_api(self.state);

        let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown.await;
            ws_hub.close_all().await;
        });

        if tokio::time::timeout(shutdown_timeout, server).await.is_err() {
            log::warn!("explorer server did not shut down within {:?}; releasing resources anyway", shutdown_timeout);
        }
    }
}
