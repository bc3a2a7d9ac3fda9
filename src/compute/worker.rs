//! Background worker pool for offloaded computation
//!
//! Workers pull serialized request envelopes from a shared channel, run the
//! requested operation, and send tagged responses back. A worker never lets
//! a fault escape: malformed envelopes and operation panics both come back
//! as error-tagged responses. Workers exit when the request channel closes
//! (all senders dropped).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::Value;

use super::{ops, Completed, ComputeRequest, ComputeResponse, RequestId};

/// Default number of worker threads in the pool.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// One queued request: the id the caller matches the response by, plus the
/// serialized envelope (payloads cross the channel by copy, never by
/// reference).
pub(crate) struct Job {
    pub id: RequestId,
    pub envelope: Value,
}

/// Spawn `num_threads` workers sharing `request_rx`.
///
/// Each worker sends `Completed` results through its clone of `result_tx`;
/// the original sender is dropped so the result channel closes only when
/// every worker has exited.
pub(crate) fn spawn_worker_pool(
    num_threads: usize,
    request_rx: Receiver<Job>,
    result_tx: Sender<Completed>,
) {
    let request_rx = Arc::new(Mutex::new(request_rx));

    for _ in 0..num_threads.max(1) {
        let rx = Arc::clone(&request_rx);
        let tx = result_tx.clone();

        thread::spawn(move || {
            loop {
                let job = {
                    let rx = match rx.lock() {
                        Ok(rx) => rx,
                        Err(_) => return, // another worker panicked holding the lock
                    };
                    match rx.recv() {
                        Ok(job) => job,
                        Err(_) => return, // channel closed
                    }
                };
                let response = run_job(job.envelope);
                // Ignore send errors (main thread may have exited)
                let _ = tx.send(Completed {
                    id: job.id,
                    response,
                });
            }
        });
    }
    drop(result_tx);
}

/// Decode and execute one envelope. Every failure mode maps to an
/// error-tagged response.
fn run_job(envelope: Value) -> ComputeResponse {
    let request: ComputeRequest = match serde_json::from_value(envelope) {
        Ok(request) => request,
        Err(_) => {
            return ComputeResponse::Error {
                message: "Unknown operation".to_string(),
            }
        }
    };

    match catch_unwind(AssertUnwindSafe(|| execute(request))) {
        Ok(response) => response,
        Err(_) => ComputeResponse::Error {
            message: "computation failed".to_string(),
        },
    }
}

fn execute(request: ComputeRequest) -> ComputeResponse {
    match request {
        ComputeRequest::CalculateKpis(rows) => ComputeResponse::KpisCalculated {
            result: ops::compute_kpis(&rows),
        },
        ComputeRequest::AggregateData(rows) => ComputeResponse::DataAggregated {
            result: ops::aggregate_by_date(&rows),
        },
        ComputeRequest::SortData {
            items,
            sort_by,
            sort_order,
        } => ComputeResponse::DataSorted {
            result: ops::sort_rows(items, &sort_by, sort_order),
        },
    }
}
