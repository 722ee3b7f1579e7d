//! Names for the headers and query parameters the HTTP surface uses.
//! Centralized here because both `transdb-server` (reads/writes them) and
//! `transdb-client` (writes/reads them) must agree on the exact wire names.

/// Marks a request as an intra-cluster proxy hop rather than one from an originating client.
pub const PROXY_HEADER: &str = "x-transdb-proxy";

/// Carries the stored timestamp on a proxy GET response, and the
/// originator-minted timestamp on a proxy PUT/DELETE request.
pub const TIMESTAMP_HEADER: &str = "x-transdb-timestamp";

/// Absolute millis-since-epoch TTL on PUT; absent or unparsable means `NEVER_EXPIRES`.
pub const EXPIRES_HEADER: &str = "expires";

/// Internal-only: carries a live Value's `expires_at` on a proxy GET response, so the
/// originator can apply the read-time expiration filter to a value it only observed
/// on a remote replica.
pub const EXPIRES_AT_HEADER: &str = "x-transdb-expires-at";

/// Literal value used for `EXPIRES_AT_HEADER` when the value never expires.
pub const NEVER_EXPIRES_TOKEN: &str = "never";

pub const QUERY_ID: &str = "id";
pub const QUERY_REPLICAS: &str = "replicas";
pub const QUERY_START: &str = "start";
pub const QUERY_END: &str = "end";

pub const PATH_STATUS: &str = "/v0/status";
pub const PATH_ENTITY: &str = "/v0/entity";
pub const PATH_ENTITIES: &str = "/v0/entities";
