//! Chunked batch reads against the CRM.
//!
//! Large id lists are split into provider-sized groups and issued concurrently
//! through the shared gateway. A failing group does not abort the rest: its ids
//! are reported as an explicit [`ChunkFailure`] so callers that need
//! completeness can tell "absent" apart from "not requested".

use std::collections::HashMap;

use futures_util::future::join_all;
use serde_json::{json, Value};
use tracing::warn;

use crate::gateway::{Gateway, GatewayError};
use crate::transport::ApiRequest;

#[derive(Debug)]
pub struct ChunkFailure {
    pub ids: Vec<String>,
    pub error: GatewayError,
}

/// Aggregate of one batch read: per-id property objects for every id a chunk
/// returned, plus the failed chunks' ids. Best-effort by design; completeness
/// is the caller's check.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub found: HashMap<String, Value>,
    pub failures: Vec<ChunkFailure>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn missing_ids(&self) -> Vec<&str> {
        self.failures.iter().flat_map(|failure| failure.ids.iter()).map(String::as_str).collect()
    }
}

/// Reads `ids` from `object_path` in groups of at most `page_size`, all issued
/// concurrently through the gateway's shared pool.
pub async fn read_batch(
    gateway: &Gateway,
    object_path: &str,
    properties: &[&str],
    ids: &[String],
    page_size: usize,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    if ids.is_empty() {
        return outcome;
    }

    let page_size = page_size.max(1);
    let reads = ids.chunks(page_size).map(|chunk| async move {
        let request = ApiRequest::post(
            format!("{object_path}/batch/read"),
            json!({
                "properties": properties,
                "inputs": chunk.iter().map(|id| json!({"id": id})).collect::<Vec<_>>(),
            }),
        );
        (chunk, gateway.call(request).await)
    });

    for (chunk, result) in join_all(reads).await {
        match result {
            Ok(response) => match response.body.get("results").and_then(Value::as_array) {
                Some(results) => {
                    for entry in results {
                        let Some(id) = entry.get("id").and_then(Value::as_str) else { continue };
                        let properties =
                            entry.get("properties").cloned().unwrap_or(Value::Null);
                        outcome.found.insert(id.to_string(), properties);
                    }
                }
                None => {
                    warn!(
                        event_name = "crm.batch.malformed_chunk",
                        object_path,
                        chunk_len = chunk.len(),
                        "batch read response carried no results array"
                    );
                    outcome.failures.push(ChunkFailure {
                        ids: chunk.to_vec(),
                        error: GatewayError::Remote {
                            status: response.status,
                            body: "batch read response carried no results array".to_string(),
                        },
                    });
                }
            },
            Err(error) => {
                warn!(
                    event_name = "crm.batch.chunk_failed",
                    object_path,
                    chunk_len = chunk.len(),
                    error = %error,
                    "batch read chunk failed, continuing with partial results"
                );
                outcome.failures.push(ChunkFailure { ids: chunk.to_vec(), error });
            }
        }
    }

    outcome
}
