//! Offloaded computation channel
//!
//! Request/response message passing to a pool of worker threads, so KPI
//! aggregation and sorting of large row sets never block the thread that
//! owns the rendering loop. The caller posts a tagged request, gets a
//! `RequestId` back immediately, and collects the tagged response later via
//! `poll` or `wait_for`.
//!
//! Responses are matched by id, never by submission order: two in-flight
//! requests may complete in either order. There is no cancellation; a
//! caller that superseded a request (changed filters, new page) just drops
//! the late response when its id no longer matches the current one.

pub mod ops;
pub mod worker;

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rows::Row;
use worker::Job;

pub use ops::{DateBucket, KpiSummary, SortOrder};
pub use worker::DEFAULT_POOL_SIZE;

/// Outbound envelope: `{ "type": <tag>, "data": <payload> }` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComputeRequest {
    #[serde(rename = "calculateKPIs")]
    CalculateKpis(Vec<Row>),

    #[serde(rename = "aggregateData")]
    AggregateData(Vec<Row>),

    #[serde(rename = "sortData")]
    SortData {
        items: Vec<Row>,
        #[serde(rename = "sortBy")]
        sort_by: String,
        #[serde(rename = "sortOrder")]
        sort_order: SortOrder,
    },
}

/// Inbound envelope: `{ "type": <tag>, "result": ... }`, or
/// `{ "type": "error", "message": ... }` for any channel fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ComputeResponse {
    #[serde(rename = "kpisCalculated")]
    KpisCalculated { result: KpiSummary },

    #[serde(rename = "dataAggregated")]
    DataAggregated { result: Vec<DateBucket> },

    #[serde(rename = "dataSorted")]
    DataSorted { result: Vec<Row> },

    #[serde(rename = "error")]
    Error { message: String },
}

/// Opaque id a caller uses to match responses to requests. Ids are unique
/// per channel for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

/// A finished request: the id it was submitted under plus its response.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    pub id: RequestId,
    pub response: ComputeResponse,
}

/// Handle to the worker pool. Owned by the caller thread; not `Sync` by
/// design, mirroring the single-owner message port it stands in for.
pub struct ComputeChannel {
    next_id: u64,
    request_tx: Sender<Job>,
    result_rx: Receiver<Completed>,
    /// Responses received while waiting for a different id.
    stash: VecDeque<Completed>,
}

impl ComputeChannel {
    /// Spawn a channel backed by `pool_size` worker threads.
    pub fn new(pool_size: usize) -> Self {
        let (request_tx, request_rx) = channel::<Job>();
        let (result_tx, result_rx) = channel::<Completed>();

        worker::spawn_worker_pool(pool_size, request_rx, result_tx);

        Self {
            next_id: 0,
            request_tx,
            result_rx,
            stash: VecDeque::new(),
        }
    }

    /// Submit a typed request. Non-blocking; the request is serialized to
    /// its wire envelope before crossing the thread boundary, so no state
    /// is shared with the workers.
    pub fn submit(&mut self, request: ComputeRequest) -> RequestId {
        match serde_json::to_value(&request) {
            Ok(envelope) => self.submit_value(envelope),
            Err(err) => self.fail_locally(format!("failed to encode request: {}", err)),
        }
    }

    /// Submit a raw envelope. An unrecognized tag or malformed payload
    /// comes back as an error-tagged response, never a silent drop.
    pub fn submit_value(&mut self, envelope: Value) -> RequestId {
        let id = self.allocate_id();
        if self.request_tx.send(Job { id, envelope }).is_err() {
            // Workers are gone; answer locally so the id still resolves.
            self.stash.push_back(Completed {
                id,
                response: ComputeResponse::Error {
                    message: "compute workers unavailable".to_string(),
                },
            });
        }
        id
    }

    /// Drain every response that has arrived so far.
    pub fn poll(&mut self) -> Vec<Completed> {
        let mut done: Vec<Completed> = self.stash.drain(..).collect();
        while let Ok(completed) = self.result_rx.try_recv() {
            done.push(completed);
        }
        done
    }

    /// Block until the response for `id` arrives or `timeout` elapses.
    ///
    /// Responses for other ids received in the meantime are stashed and
    /// show up in later `poll`/`wait_for` calls.
    pub fn wait_for(&mut self, id: RequestId, timeout: Duration) -> Option<ComputeResponse> {
        if let Some(pos) = self.stash.iter().position(|c| c.id == id) {
            return self.stash.remove(pos).map(|c| c.response);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.result_rx.recv_timeout(remaining) {
                Ok(completed) if completed.id == id => return Some(completed.response),
                Ok(other) => self.stash.push_back(other),
                Err(_) => return None,
            }
        }
    }

    fn allocate_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId(self.next_id)
    }

    fn fail_locally(&mut self, message: String) -> RequestId {
        let id = self.allocate_id();
        self.stash.push_back(Completed {
            id,
            response: ComputeResponse::Error { message },
        });
        id
    }
}

impl Default for ComputeChannel {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_uses_wire_tags() {
        let request = ComputeRequest::SortData {
            items: vec![json!({"v": 1})],
            sort_by: "v".to_string(),
            sort_order: SortOrder::Desc,
        };
        let envelope = serde_json::to_value(&request).unwrap();

        assert_eq!(envelope["type"], "sortData");
        assert_eq!(envelope["data"]["sortBy"], "v");
        assert_eq!(envelope["data"]["sortOrder"], "desc");
    }

    #[test]
    fn response_envelope_uses_wire_tags() {
        let response = ComputeResponse::KpisCalculated {
            result: KpiSummary::default(),
        };
        let envelope = serde_json::to_value(&response).unwrap();

        assert_eq!(envelope["type"], "kpisCalculated");
        assert!(envelope["result"].get("adSpend").is_some());
        assert!(envelope["result"].get("avgCpc").is_some());

        let error = ComputeResponse::Error {
            message: "Unknown operation".to_string(),
        };
        let envelope = serde_json::to_value(&error).unwrap();
        assert_eq!(envelope["type"], "error");
        assert_eq!(envelope["message"], "Unknown operation");
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut channel = ComputeChannel::new(1);
        let a = channel.submit(ComputeRequest::CalculateKpis(Vec::new()));
        let b = channel.submit(ComputeRequest::CalculateKpis(Vec::new()));
        assert!(b > a);
    }
}
