//! REST collaborators for the cron engine: the PostgREST-shaped store, the
//! distributed-lock RPCs, and the scraper/comparison function triggers.

pub mod alerts;
mod client;
mod error;
pub mod execution_logs;
pub mod functions;
pub mod locks;
pub mod metrics;
pub mod price_changes;
pub mod retention;

pub use alerts::{AlertRow, NewAlertRow};
pub use client::StoreClient;
pub use error::StoreError;
pub use execution_logs::ExecutionLogRow;
pub use functions::{ComparisonSummary, ScrapeSummary};
pub use locks::{JobLock, LockError, RpcJobLock};
pub use metrics::WeeklyMetricsRow;
pub use price_changes::PriceChangeRow;
