//! `ConnectionPool<Client>`: round-robin client selection over a fixed set
//! of endpoints, with a background task that health-checks connected
//! clients and reconnects the unhealthy ones (§4.13).
//!
//! Grounded on the teacher's `http_retry::Client`/`IoHandler` shape: a
//! bounded number of retries, a fixed delay between them, and a
//! `RetryPolicy`-style give-up once the attempt budget is spent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::events::{PoolEvent, PoolObserver};
use crate::factory::ConnectionFactory;
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no endpoints configured")]
    NoEndpoints,
}

struct Slot<Client> {
    endpoint: String,
    client: Option<Client>,
}

struct Inner<Client> {
    slots: Vec<Slot<Client>>,
}

/// The process's single pool instance per downstream service kind (§3
/// Ownership). Generic over whatever `Client` the factory produces —
/// a `reqwest::Client`, a BTP session handle, anything cheaply `Clone`.
pub struct ConnectionPool<Client, F: ConnectionFactory<Client>>
where
    Client: Clone + Send + Sync + 'static,
{
    factory: Arc<F>,
    config: PoolConfig,
    observer: Option<Arc<dyn PoolObserver>>,
    inner: Arc<Mutex<Inner<Client>>>,
    next: AtomicUsize,
    health_check_task: Mutex<Option<JoinHandle<()>>>,
}

impl<Client, F> ConnectionPool<Client, F>
where
    Client: Clone + Send + Sync + 'static,
    F: ConnectionFactory<Client> + 'static,
{
    pub fn new(endpoints: Vec<String>, factory: Arc<F>, config: PoolConfig) -> Self {
        let cap = config.pool_size.min(endpoints.len());
        let slots = endpoints
            .into_iter()
            .take(cap)
            .map(|endpoint| Slot { endpoint, client: None })
            .collect();
        ConnectionPool {
            factory,
            config,
            observer: None,
            inner: Arc::new(Mutex::new(Inner { slots })),
            next: AtomicUsize::new(0),
            health_check_task: Mutex::new(None),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PoolObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn emit(&self, event: PoolEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }

    /// Connects up to `min(pool_size, endpoints.len())` slots. A slot that
    /// fails to connect here is left unhealthy for the background loop to
    /// pick up on its next tick.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        let endpoints: Vec<String> = {
            let inner = self.inner.lock();
            if inner.slots.is_empty() {
                return Err(PoolError::NoEndpoints);
            }
            inner.slots.iter().map(|s| s.endpoint.clone()).collect()
        };
        for endpoint in endpoints {
            match self.factory.create(&endpoint).await {
                Ok(client) => self.set_client(&endpoint, Some(client)),
                Err(err) => warn!("ilc-pool: initial connect to {} failed: {}", endpoint, err),
            }
        }
        Ok(())
    }

    fn set_client(&self, endpoint: &str, client: Option<Client>) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.endpoint == endpoint) {
            slot.client = client;
        }
    }

    /// The next healthy client in round-robin order, skipping unhealthy
    /// slots. `None` if every slot is currently unhealthy.
    pub fn get(&self) -> Option<Client> {
        let inner = self.inner.lock();
        let len = inner.slots.len();
        if len == 0 {
            return None;
        }
        let start = self.next.fetch_add(1, Ordering::SeqCst) % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            if let Some(client) = &inner.slots[idx].client {
                return Some(client.clone());
            }
        }
        None
    }

    /// Marks `endpoint`'s current connection unhealthy immediately (e.g. a
    /// caller observed a send failure), so the background loop reconnects
    /// it on its next tick instead of waiting for a failed health check.
    pub fn mark_unhealthy(&self, endpoint: &str) {
        self.set_client(endpoint, None);
        self.emit(PoolEvent::Unhealthy {
            endpoint: endpoint.to_string(),
        });
    }

    async fn reconnect_with_retries(&self, endpoint: &str) -> Option<Client> {
        for attempt in 1..=self.config.max_reconnect_attempts {
            match self.factory.create(endpoint).await {
                Ok(client) => return Some(client),
                Err(err) => {
                    warn!(
                        "ilc-pool: reconnect attempt {}/{} to {} failed: {}",
                        attempt, self.config.max_reconnect_attempts, endpoint, err
                    );
                    if attempt < self.config.max_reconnect_attempts {
                        tokio::time::sleep(self.config.reconnect_delay).await;
                    }
                }
            }
        }
        None
    }

    async fn tick(&self) {
        let snapshot: Vec<(String, Option<Client>)> = {
            let inner = self.inner.lock();
            inner.slots.iter().map(|s| (s.endpoint.clone(), s.client.clone())).collect()
        };

        for (endpoint, client) in snapshot {
            match client {
                Some(client) => {
                    if !self.factory.health_check(&client).await {
                        self.factory.disconnect(&client).await;
                        self.set_client(&endpoint, None);
                        self.emit(PoolEvent::Unhealthy { endpoint });
                    }
                }
                None => match self.reconnect_with_retries(&endpoint).await {
                    Some(client) => {
                        self.set_client(&endpoint, Some(client));
                        self.emit(PoolEvent::Reconnected { endpoint });
                    }
                    None => self.emit(PoolEvent::Failed { endpoint }),
                },
            }
        }
    }

    /// Spawns the background health-check/reconnect loop. Dropping the pool
    /// does not stop it; call `shutdown()` first.
    pub fn spawn_health_check_loop(self: &Arc<Self>) {
        let pool = self.clone();
        let interval = self.config.health_check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                pool.tick().await;
            }
        });
        *self.health_check_task.lock() = Some(handle);
    }

    /// Disconnects every connected slot (errors are impossible here since
    /// `disconnect` has no error channel; failures are the factory's job
    /// to log) and stops the background loop.
    pub async fn shutdown(&self) {
        if let Some(task) = self.health_check_task.lock().take() {
            task.abort();
        }
        let clients: Vec<Client> = {
            let mut inner = self.inner.lock();
            inner.slots.iter_mut().filter_map(|s| s.client.take()).collect()
        };
        for client in clients {
            self.factory.disconnect(&client).await;
        }
    }

    #[cfg(test)]
    fn healthy_count(&self) -> usize {
        self.inner.lock().slots.iter().filter(|s| s.client.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Mutex as StdMutex;

    #[derive(Clone)]
    struct FakeClient(String);

    struct FlakyFactory {
        fail_endpoints: StdMutex<Vec<String>>,
        create_calls: AtomicU32,
    }

    #[async_trait]
    impl ConnectionFactory<FakeClient> for FlakyFactory {
        type Error = String;

        async fn create(&self, endpoint: &str) -> Result<FakeClient, String> {
            self.create_calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail_endpoints.lock().unwrap().contains(&endpoint.to_string()) {
                Err(format!("refused: {}", endpoint))
            } else {
                Ok(FakeClient(endpoint.to_string()))
            }
        }

        async fn disconnect(&self, _client: &FakeClient) {}

        async fn health_check(&self, client: &FakeClient) -> bool {
            !self.fail_endpoints.lock().unwrap().contains(&client.0)
        }
    }

    fn factory(fail: &[&str]) -> Arc<FlakyFactory> {
        Arc::new(FlakyFactory {
            fail_endpoints: StdMutex::new(fail.iter().map(|s| s.to_string()).collect()),
            create_calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn initializes_up_to_pool_size() {
        let pool = ConnectionPool::new(
            vec!["a".into(), "b".into(), "c".into()],
            factory(&[]),
            PoolConfig { pool_size: 2, ..Default::default() },
        );
        pool.initialize().await.unwrap();
        assert_eq!(pool.healthy_count(), 2);
    }

    #[tokio::test]
    async fn get_round_robins_over_healthy_slots() {
        let pool = ConnectionPool::new(
            vec!["a".into(), "b".into()],
            factory(&[]),
            PoolConfig { pool_size: 2, ..Default::default() },
        );
        pool.initialize().await.unwrap();
        let first = pool.get().unwrap().0;
        let second = pool.get().unwrap().0;
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn get_returns_none_when_all_unhealthy() {
        let pool = ConnectionPool::new(
            vec!["a".into()],
            factory(&["a"]),
            PoolConfig { pool_size: 1, ..Default::default() },
        );
        pool.initialize().await.unwrap();
        assert!(pool.get().is_none());
    }

    #[tokio::test]
    async fn tick_reconnects_a_recovered_endpoint() {
        let fac = factory(&["a"]);
        let pool = Arc::new(ConnectionPool::new(
            vec!["a".into()],
            fac.clone(),
            PoolConfig {
                pool_size: 1,
                reconnect_delay: std::time::Duration::from_millis(1),
                max_reconnect_attempts: 2,
                ..Default::default()
            },
        ));
        pool.initialize().await.unwrap();
        assert!(pool.get().is_none());

        fac.fail_endpoints.lock().unwrap().clear();
        pool.tick().await;
        assert!(pool.get().is_some());
    }

    #[tokio::test]
    async fn empty_endpoints_rejected() {
        let pool = ConnectionPool::new(Vec::<String>::new(), factory(&[]), PoolConfig::default());
        assert!(matches!(pool.initialize().await, Err(PoolError::NoEndpoints)));
    }
}
