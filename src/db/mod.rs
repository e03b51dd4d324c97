//! Database access: bounded pool, retrying executor, schema setup

mod pool;
mod retry;
mod schema;

pub use pool::{Pool, PooledClient};
pub use retry::{backoff_delay, execute_with_retries, Queries, RetryFailure, TransientError};
pub use schema::{init_schema, seed_demo_data};
