use std::time::Duration;

/// Default timeout for a single proxied peer call.
pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of permits in the DAO pool (bounds concurrent local-store /
/// coordinator orchestration work). Saturation fails fast with 503.
pub const DEFAULT_DAO_POOL_SIZE: usize = 256;

/// Default number of permits in the proxy pool (bounds concurrent outbound
/// peer HTTP calls).
pub const DEFAULT_PROXY_POOL_SIZE: usize = 256;

/// How long `run()` waits for in-flight requests to finish after a shutdown
/// signal before giving up.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);
