//! Bounded pool of pre-warmed sandbox clients.
//!
//! Optimization only: correctness never depends on the pool. The engine
//! acquires at most one client per query (or is handed one directly in
//! configurations that bypass the pool). Guarded by a single
//! `tokio::sync::Mutex`, the pool's queue and in-use count are the only
//! shared mutable state here.
//!
//! Generic over the builder closure rather than over `ChildSandbox`
//! directly so pool tests can run against boxed `SandboxHandle`
//! trait objects without spawning real processes.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::client::SandboxHandle;
use crate::Result;

/// A boxed, type-erased sandbox client.
pub type BoxedSandbox = Box<dyn SandboxHandle>;
/// A constructor for [`BoxedSandbox`] values, invoked each time the pool
/// needs a new client (eager fill in [`SandboxPool::start`], or elastic
/// overflow in [`SandboxPool::acquire`]).
pub type Factory = Arc<dyn Fn() -> Result<BoxedSandbox> + Send + Sync>;

struct Inner {
    idle: Vec<BoxedSandbox>,
    in_use: usize,
}

/// A FIFO pool of sandbox clients, elastic beyond its initial size.
pub struct SandboxPool {
    factory: Factory,
    inner: Mutex<Inner>,
}

impl SandboxPool {
    /// Construct a pool that will eagerly start `size` clients the first
    /// time `start()` is called, using `factory` to build each one.
    pub fn new(factory: Factory) -> Self {
        Self {
            factory,
            inner: Mutex::new(Inner {
                idle: Vec::new(),
                in_use: 0,
            }),
        }
    }

    /// Eagerly construct and start `size` clients.
    pub async fn start(&self, size: usize) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for _ in 0..size {
            inner.idle.push((self.factory)()?);
        }
        Ok(())
    }

    /// Pop one client, constructing a new one on demand if the pool is
    /// empty (pool elasticity, acquire never blocks on capacity).
    pub async fn acquire(&self) -> Result<BoxedSandbox> {
        let mut inner = self.inner.lock().await;
        let client = match inner.idle.pop() {
            Some(c) => c,
            None => {
                tracing::debug!("pool empty, spawning overflow client");
                (self.factory)()?
            }
        };
        inner.in_use += 1;
        Ok(client)
    }

    /// Return a client to the tail of the idle queue.
    pub async fn release(&self, client: BoxedSandbox) {
        let mut inner = self.inner.lock().await;
        inner.in_use = inner.in_use.saturating_sub(1);
        inner.idle.push(client);
    }

    /// Terminate all clients, both idle and (as far as we can reach them)
    /// in use. Clients currently checked out by a caller must be stopped
    /// by that caller before being dropped; this only drains the idle
    /// queue.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        for mut client in inner.idle.drain(..) {
            client.stop().await;
        }
    }

    pub async fn idle_count(&self) -> usize {
        self.inner.lock().await.idle.len()
    }

    pub async fn in_use_count(&self) -> usize {
        self.inner.lock().await.in_use
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::mock::MockSandbox;

    fn mock_factory() -> Factory {
        Arc::new(|| Ok(Box::new(MockSandbox::new(vec![])) as BoxedSandbox))
    }

    #[tokio::test]
    async fn test_start_populates_idle_queue() {
        let pool = SandboxPool::new(mock_factory());
        pool.start(3).await.unwrap();
        assert_eq!(pool.idle_count().await, 3);
    }

    #[tokio::test]
    async fn test_acquire_release_roundtrip() {
        let pool = SandboxPool::new(mock_factory());
        pool.start(1).await.unwrap();
        let client = pool.acquire().await.unwrap();
        assert_eq!(pool.idle_count().await, 0);
        assert_eq!(pool.in_use_count().await, 1);
        pool.release(client).await;
        assert_eq!(pool.idle_count().await, 1);
        assert_eq!(pool.in_use_count().await, 0);
    }

    #[tokio::test]
    async fn test_acquire_overflow_creates_new_client() {
        let pool = SandboxPool::new(mock_factory());
        // No start() call: pool begins empty, acquire must still succeed.
        let _client = pool.acquire().await.unwrap();
        assert_eq!(pool.in_use_count().await, 1);
    }

    #[tokio::test]
    async fn test_stop_drains_idle_queue() {
        let pool = SandboxPool::new(mock_factory());
        pool.start(2).await.unwrap();
        pool.stop().await;
        assert_eq!(pool.idle_count().await, 0);
    }
}
