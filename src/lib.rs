// Shared test fixtures - payload types and tree builders used across unit tests
#[cfg(test)]
#[path = "tests/test_fixtures.rs"]
pub mod test_fixtures;

// Centralized limits and thresholds
pub mod limits;

// Pool - fixed-capacity preorder slot store, relocation, refcounted handles
pub mod pool;
pub use pool::{NodeId, NodePayload, PoolOptions, TreeHandle, TreePool};
#[cfg(test)]
#[path = "tests/arena_tests.rs"]
mod arena_tests;
#[cfg(test)]
#[path = "tests/handle_tests.rs"]
mod handle_tests;
#[cfg(test)]
#[path = "tests/failure_tests.rs"]
mod failure_tests;

// Dump - flat, tree and JSON renderings of pool contents
pub mod dump;
#[cfg(test)]
#[path = "tests/dump_tests.rs"]
mod dump_tests;

// Tracing configuration (text / tree / JSON output for debugging)
pub mod tracing_config;
