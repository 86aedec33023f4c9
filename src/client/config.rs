//! Configuration for the default HTTP transport.
//!
//! The numbers are pool tuning, not part of any contract: callers that need
//! different limits build their own [`HttpTransport`](crate::HttpTransport)
//! with [`HttpTransport::with_config`](crate::HttpTransport::with_config).

/// Connection pool and timeout settings for [`HttpTransport`](crate::HttpTransport)
///
/// # Examples
///
/// ```
/// use rest_chain::client::ClientConfig;
///
/// let config = ClientConfig {
///     request_timeout_ms: 2_000,
///     ..Default::default()
/// };
/// assert_eq!(config.pool_max_idle_per_host, 512);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Overall per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Connect (including TLS handshake) timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// Seconds an idle pooled connection survives
    pub pool_idle_timeout_secs: u64,
    /// `User-Agent` sent with every request, if set
    pub user_agent: Option<String>,
    /// Emit DEBUG events for each dispatch
    pub enable_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            request_timeout_ms: 15_000,
            connect_timeout_ms: 10_000,
            pool_max_idle_per_host: 512,
            pool_idle_timeout_secs: 90,
            user_agent: None,
            enable_logging: true,
        }
    }
}
