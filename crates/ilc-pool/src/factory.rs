//! `ConnectionFactory`: the caller-supplied glue a `ConnectionPool` uses to
//! create, health-check, and tear down connections (§4.13).

use async_trait::async_trait;

#[async_trait]
pub trait ConnectionFactory<Client>: Send + Sync
where
    Client: Send + Sync,
{
    type Error: std::fmt::Display + Send + Sync + 'static;

    async fn create(&self, endpoint: &str) -> Result<Client, Self::Error>;
    async fn disconnect(&self, client: &Client);
    async fn health_check(&self, client: &Client) -> bool;
}
