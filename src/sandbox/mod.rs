//! The sandbox subsystem: wire protocol, client, pool, and test double.

pub mod client;
pub mod mock;
pub mod pool;
pub mod protocol;

pub use client::{ChildSandbox, LlmQueryFuture, SandboxHandle};
pub use mock::{MockSandbox, MockStep};
pub use pool::{BoxedSandbox, Factory, SandboxPool};
pub use protocol::{ExecutionResult, Sentinel};
