use transdb_common::MAX_KEY_SIZE;

use crate::error::CoordError;

/// `id` must be present (enforced by the caller's `Query` extraction) and
/// non-empty, and within the key size limit.
pub fn validate_key(raw: &str) -> Result<Vec<u8>, CoordError> {
    if raw.is_empty() {
        return Err(CoordError::BadParameters("id must be non-empty".to_string()));
    }
    if raw.len() > MAX_KEY_SIZE {
        return Err(CoordError::BadParameters(format!("Key exceeds maximum size of {} bytes", MAX_KEY_SIZE)));
    }
    Ok(raw.as_bytes().to_vec())
}

/// Parses `replicas=ack/from`; absent means `ack = quorum_count`,
/// `from = cluster_size`. Enforces `1 ≤ ack ≤ from ≤ cluster_size`.
pub fn parse_replicas(
    raw: Option<&str>,
    cluster_size: usize,
    quorum_count: usize,
) -> Result<(usize, usize), CoordError> {
    let (ack, from) = match raw {
        None => (quorum_count, cluster_size),
        Some(s) => {
            let (a, f) = s.split_once('/').ok_or_else(|| {
                CoordError::BadParameters(format!("replicas must be formatted ack/from, got {:?}", s))
            })?;
            let ack: usize = a
                .parse()
                .map_err(|_| CoordError::BadParameters(format!("invalid ack in replicas={:?}", s)))?;
            let from: usize = f
                .parse()
                .map_err(|_| CoordError::BadParameters(format!("invalid from in replicas={:?}", s)))?;
            (ack, from)
        }
    };

    if ack < 1 || ack > from || from > cluster_size {
        return Err(CoordError::BadParameters(format!(
            "replicas={}/{} violates 1 <= ack <= from <= clusterSize({})",
            ack, from, cluster_size
        )));
    }
    Ok((ack, from))
}
