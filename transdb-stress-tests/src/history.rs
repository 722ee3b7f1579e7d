use std::collections::HashMap;
use std::time::Instant;

pub enum OpKind {
    Put,
    Get,
    Delete,
}

pub enum OpOutcome {
    /// The PUT succeeded. `value` is what was written (needed for correctness checking).
    PutOk { value: Vec<u8> },
    GetOk { value: Vec<u8> },
    NotFound,
    DeleteOk,
    /// 5xx or network failure.
    Error,
}

pub struct OpRecord {
    /// When the client sent the request.
    pub client_start_ts: Instant,
    /// When the client received the response (the ACK).
    pub client_ack_ts: Instant,
    pub key: String,
    pub kind: OpKind,
    pub outcome: OpOutcome,
}

pub struct History(pub Vec<OpRecord>);

/// There is no version counter to key off: TransDB resolves conflicts by
/// timestamp and voted data identity, not a monotonic per-key counter, so a
/// GET result is checked against the set of byte values actually written.
pub enum ViolationKind {
    /// GET returned bytes that were never the subject of any PUT for this key.
    ValueNeverWritten { actual: Vec<u8> },
    /// GET fully completed before the corresponding PUT even started — the server
    /// could not have had that data yet.
    ReadBeforeWriteStart { put_start_ts: Instant, get_ack_ts: Instant },
    /// GET returned stale data. Not counted as an error by default (eventual consistency
    /// across the replica set during fan-out).
    /// `newer_value` is `Some(bytes)` when a newer PUT was already fully ACKed before the
    /// GET started, or `None` when a DELETE superseded the returned value before the GET started.
    StaleDataReturned { newer_value: Option<Vec<u8>> },
}

pub struct Violation {
    pub key: String,
    pub kind: ViolationKind,
}

/// Entry in the write index.
struct PutEntry {
    value: Vec<u8>,
    put_start_ts: Instant,
    put_ack_ts: Instant,
}

/// Entry in the delete index.
struct DeleteEntry {
    del_start_ts: Instant,
    del_ack_ts: Instant,
}

impl History {
    /// Check every successful GET against the write and delete indexes.
    /// Returns one [`Violation`] per inconsistent GET, with [`ViolationKind::StaleDataReturned`]
    /// reported separately (informational only — not counted as an error by default).
    pub fn check_correctness(&self) -> Vec<Violation> {
        let write_index = build_write_index(&self.0);
        let delete_index = build_delete_index(&self.0);

        self.0
            .iter()
            .filter_map(|r| {
                if let OpOutcome::GetOk { value } = &r.outcome {
                    classify_get(&r.key, value, r.client_start_ts, r.client_ack_ts, &write_index, &delete_index)
                        .map(|kind| Violation { key: r.key.clone(), kind })
                } else {
                    None
                }
            })
            .collect()
    }
}

// --- Index builders ---

/// key → every PUT issued for that key, in issue order.
fn build_write_index(records: &[OpRecord]) -> HashMap<String, Vec<PutEntry>> {
    let mut index: HashMap<String, Vec<PutEntry>> = HashMap::new();
    for r in records {
        if let OpOutcome::PutOk { value } = &r.outcome {
            index.entry(r.key.clone()).or_default().push(PutEntry {
                value: value.clone(),
                put_start_ts: r.client_start_ts,
                put_ack_ts: r.client_ack_ts,
            });
        }
    }
    index
}

/// key → start/ack timestamps of every successful DELETE.
fn build_delete_index(records: &[OpRecord]) -> HashMap<String, Vec<DeleteEntry>> {
    let mut index: HashMap<String, Vec<DeleteEntry>> = HashMap::new();
    for r in records {
        if matches!(r.outcome, OpOutcome::DeleteOk) {
            index.entry(r.key.clone()).or_default().push(DeleteEntry {
                del_start_ts: r.client_start_ts,
                del_ack_ts: r.client_ack_ts,
            });
        }
    }
    index
}

// --- Per-GET classification ---

/// Returns the violation kind for a single GET result, or `None` if it is consistent.
fn classify_get(
    key: &str,
    value: &[u8],
    get_start: Instant,
    get_ack: Instant,
    write_index: &HashMap<String, Vec<PutEntry>>,
    delete_index: &HashMap<String, Vec<DeleteEntry>>,
) -> Option<ViolationKind> {
    let Some(entries) = write_index.get(key) else {
        return Some(ViolationKind::ValueNeverWritten { actual: value.to_vec() });
    };
    let matching: Vec<&PutEntry> = entries.iter().filter(|e| e.value == value).collect();
    if matching.is_empty() {
        return Some(ViolationKind::ValueNeverWritten { actual: value.to_vec() });
    }

    // Most recently *started* matching PUT that was acked before this GET started.
    // Using put_start_ts as the sort key — not put_ack_ts — because start time is a
    // better proxy for server execution order: ack time reflects return-path network
    // delay, which can make an earlier write appear to ack later than a subsequent one.
    let entry = matching.iter().filter(|e| e.put_ack_ts <= get_start).max_by_key(|e| e.put_start_ts);

    let entry = match entry {
        Some(e) => *e,
        None => {
            // If every matching PUT also started after the GET was fully acked, the
            // server could not have had this data yet — definite violation.
            let earliest = matching.iter().min_by_key(|e| e.put_start_ts).unwrap();
            if earliest.put_start_ts > get_ack {
                return Some(ViolationKind::ReadBeforeWriteStart {
                    put_start_ts: earliest.put_start_ts,
                    get_ack_ts: get_ack,
                });
            }
            // GET and PUT windows overlapped — ambiguous, not a violation.
            return None;
        }
    };

    // A DELETE definitively started after this PUT finished and before the GET started.
    if superseding_delete(delete_index, key, entry.put_ack_ts, get_start).is_some() {
        return Some(ViolationKind::StaleDataReturned { newer_value: None });
    }

    // A different PUT was fully ACKed, strictly after this one started, before the GET started.
    if let Some(newer) = newer_known_value(entries, entry.put_start_ts, get_start) {
        return Some(ViolationKind::StaleDataReturned { newer_value: Some(newer) });
    }

    None
}

// --- Helpers ---

/// Returns `Some` if there is a DELETE for `key` that definitively started after the PUT
/// finished (`del_start >= put_ack_ts`) and was ACKed before the GET started
/// (`del_ack < get_start_ts`). Both conditions are required to rule out overlap with
/// either the PUT or the GET.
fn superseding_delete(
    delete_index: &HashMap<String, Vec<DeleteEntry>>,
    key: &str,
    put_ack_ts: Instant,
    get_start_ts: Instant,
) -> Option<()> {
    delete_index
        .get(key)?
        .iter()
        .find(|e| e.del_start_ts >= put_ack_ts && e.del_ack_ts < get_start_ts)
        .map(|_| ())
}

/// Returns the bytes of a PUT that started strictly after `chosen_start_ts` and was
/// fully ACKed before `get_start_ts`, or `None` if no such write exists.
fn newer_known_value(entries: &[PutEntry], chosen_start_ts: Instant, get_start_ts: Instant) -> Option<Vec<u8>> {
    entries
        .iter()
        .filter(|e| e.put_start_ts > chosen_start_ts && e.put_ack_ts < get_start_ts)
        .max_by_key(|e| e.put_start_ts)
        .map(|e| e.value.clone())
}
