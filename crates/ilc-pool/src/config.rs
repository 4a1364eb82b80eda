use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub health_check_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            pool_size: 4,
            health_check_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
        }
    }
}
