//! Runtime connected on first use.
//!
//! Lets a backend be built on hosts without a container daemon; only calls
//! that actually reach a container pay for, and can fail on, the connection.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{ContainerRuntime, ContainerSpec, ContainerState, DockerRuntime, ExecOutput};
use crate::Result;

type Connector =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn ContainerRuntime>>> + Send + Sync>;

/// Delegates to a runtime produced by `connect` the first time it is needed.
/// A failed connection is not cached; the next call tries again.
pub struct LazyRuntime {
    inner: OnceCell<Arc<dyn ContainerRuntime>>,
    connect: Connector,
}

impl LazyRuntime {
    /// Runtime built by `connect` on the first call.
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn ContainerRuntime>>> + Send + Sync + 'static,
    {
        Self {
            inner: OnceCell::new(),
            connect: Box::new(connect),
        }
    }

    /// Local Docker daemon, pinged on first use.
    pub fn docker() -> Self {
        Self::new(|| {
            Box::pin(async {
                let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect().await?);
                Ok(runtime)
            })
        })
    }

    /// Whether the underlying runtime has been connected.
    pub fn is_connected(&self) -> bool {
        self.inner.initialized()
    }

    async fn runtime(&self) -> Result<&Arc<dyn ContainerRuntime>> {
        self.inner
            .get_or_try_init(|| {
                debug!("Connecting container runtime on first use");
                (self.connect)()
            })
            .await
    }
}

#[async_trait]
impl ContainerRuntime for LazyRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        self.runtime().await?.create(spec).await
    }

    async fn inspect(&self, id: &str) -> Result<ContainerState> {
        self.runtime().await?.inspect(id).await
    }

    async fn exec(&self, id: &str, argv: &[String], workdir: &str) -> Result<ExecOutput> {
        self.runtime().await?.exec(id, argv, workdir).await
    }

    async fn upload(&self, id: &str, dir: &str, archive: Bytes) -> Result<()> {
        self.runtime().await?.upload(id, dir, archive).await
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.runtime().await?.stop(id).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.runtime().await?.remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use crate::SandboxError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(fake: Arc<FakeRuntime>, calls: Arc<AtomicUsize>) -> LazyRuntime {
        LazyRuntime::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let runtime: Arc<dyn ContainerRuntime> = fake.clone();
            Box::pin(async move { Ok(runtime) })
        })
    }

    #[tokio::test]
    async fn test_not_connected_until_first_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fake = Arc::new(FakeRuntime::new());
        fake.insert("c1", true);
        let runtime = counting(fake, calls.clone());

        assert!(!runtime.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(runtime.inspect("c1").await.unwrap().running);
        runtime.stop("c1").await.unwrap();
        assert!(!runtime.inspect("c1").await.unwrap().running);

        assert!(runtime.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_connection_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let runtime = LazyRuntime::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(SandboxError::runtime("daemon down")) })
        });

        assert!(runtime.inspect("c1").await.is_err());
        assert!(runtime.remove("c1").await.is_err());

        assert!(!runtime.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
