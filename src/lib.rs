//! Dashboard View Pipeline (DVP) Library
//!
//! Client-side presentation pipeline for large analytics datasets: result
//! caching with version/TTL/daily-cutoff invalidation, headless list
//! virtualization, offloaded aggregation over a worker-thread channel, and
//! visibility-gated lazy widget loading.

pub mod cache;
pub mod compute;
pub mod config;
pub mod lazy;
pub mod perf;
pub mod rows;
pub mod window;

pub use cache::{CacheStore, FileBackend, MemoryBackend, StorageBackend};
pub use compute::{ComputeChannel, ComputeRequest, ComputeResponse, RequestId, SortOrder};
pub use config::Config;
pub use lazy::{DependencyGate, ViewportLoader, VisibilitySignal};
pub use perf::PerfMonitor;
pub use rows::Row;
pub use window::{Frame, RenderWindow, VirtualList};
