//! Background tasks whose failures are always logged.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinHandle;

/// Handle to a task spawned with [`spawn_logged`].
///
/// Dropping the handle does not stop the task; call [`detach`](Self::detach)
/// to make that explicit, or [`join`](Self::join) to wait for it.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the task to finish. Errors were already logged.
    pub async fn join(self) {
        let _ = self.handle.await;
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Let the task run to completion on its own.
    pub fn detach(self) {}
}

/// Spawn `fut` on the runtime. An `Err` result or a panic is logged with the
/// task's name.
pub fn spawn_logged<F, E>(name: &'static str, fut: F) -> TaskHandle
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let handle = tokio::spawn(async move {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => tracing::debug!(task = name, "task finished"),
            Ok(Err(e)) => tracing::warn!(task = name, error = %e, "task failed"),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(task = name, panic = %msg, "task panicked");
            }
        }
    });
    TaskHandle { name, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_to_completion() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let handle = spawn_logged("ok", async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), String>(())
        });
        assert_eq!(handle.name(), "ok");
        handle.join().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn errors_and_panics_do_not_escape() {
        spawn_logged("err", async { Err::<(), _>("boom") }).join().await;
        spawn_logged("panic", async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), String>(())
        })
        .join()
        .await;
    }

    #[tokio::test]
    async fn abort_stops_task() {
        let handle = spawn_logged("sleepy", async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok::<(), String>(())
        });
        handle.abort();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.join())
            .await
            .unwrap();
    }
}
