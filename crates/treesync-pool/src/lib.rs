#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Fixed-parallelism execution substrate.
//!
//! # Design
//! - One semaphore bounds both execution modes; no task holds a permit while it waits on others.
//! - Recursive work is an explicit task graph driven by a `JoinSet`, so tree depth never grows the stack.
//! - Fire-and-forget tasks are tracked for draining on shutdown and log their own failures.

pub mod error;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub use error::{PoolError, PoolResult};

/// Parallelism used when none is configured: twice the logical core count, to
/// tolerate blocking I/O inside tasks.
#[must_use]
pub fn default_parallelism() -> usize {
    num_cpus::get().saturating_mul(2).max(1)
}

/// Outcome of expanding one node of a recursive computation.
#[derive(Debug)]
pub struct Expansion<N, O> {
    /// Results contributed by this node.
    pub outputs: Vec<O>,
    /// Child nodes to expand independently.
    pub children: Vec<N>,
}

impl<N, O> Expansion<N, O> {
    /// Build an expansion from a node's own results and its children.
    #[must_use]
    pub const fn new(outputs: Vec<O>, children: Vec<N>) -> Self {
        Self { outputs, children }
    }
}

/// Result of [`TaskPool::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight task finished before the deadline.
    Drained,
    /// The deadline elapsed with tasks still running.
    TimedOut {
        /// Tasks still running when the deadline elapsed.
        pending: usize,
    },
    /// An earlier call already shut the pool down.
    AlreadyShutDown,
}

/// Handle to a submitted task. Dropping it detaches the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    label: &'static str,
    inner: JoinHandle<Result<T, TaskFailure>>,
}

#[derive(Debug)]
enum TaskFailure {
    Failed(anyhow::Error),
    Panicked(String),
}

impl<T> TaskHandle<T> {
    /// Label supplied at submission.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Wait for the task and return its value.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TaskFailed`] when the task returned an error and
    /// [`PoolError::TaskPanicked`] when it panicked or was cancelled.
    pub async fn join(self) -> PoolResult<T> {
        let label = self.label;
        match self.inner.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(TaskFailure::Failed(source))) => Err(PoolError::TaskFailed { label, source }),
            Ok(Err(TaskFailure::Panicked(message))) => {
                Err(PoolError::TaskPanicked { label, message })
            }
            Err(err) => Err(PoolError::TaskPanicked {
                label,
                message: err.to_string(),
            }),
        }
    }
}

/// Fixed-size worker pool shared by tree descent and downstream processing.
#[derive(Clone, Debug)]
pub struct TaskPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    parallelism: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    // `true` while submissions are accepted.
    intake: RwLock<bool>,
}

impl TaskPool {
    /// Create a pool that runs at most `parallelism` tasks at once.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidParallelism`] when `parallelism` is zero.
    pub fn new(parallelism: usize) -> PoolResult<Self> {
        if parallelism == 0 {
            return Err(PoolError::InvalidParallelism { value: parallelism });
        }
        info!(parallelism, "task pool ready");
        Ok(Self {
            inner: Arc::new(PoolInner {
                parallelism,
                permits: Arc::new(Semaphore::new(parallelism)),
                tracker: TaskTracker::new(),
                intake: RwLock::new(true),
            }),
        })
    }

    /// Maximum number of tasks running at once.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.inner.parallelism
    }

    /// Number of submitted tasks that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Whether [`TaskPool::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        !*self.inner.intake.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `task` for asynchronous execution without blocking the caller.
    ///
    /// Errors and panics inside the task are logged under `label` and surfaced only
    /// through [`TaskHandle::join`]; they never affect other tasks.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] once shutdown has started.
    pub fn submit<F, T>(&self, label: &'static str, task: F) -> PoolResult<TaskHandle<T>>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.inner.permits);
        let inner = self
            .while_accepting(|| {
                self.inner.tracker.spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|err| TaskFailure::Failed(err.into()))?;
                    match AssertUnwindSafe(task).catch_unwind().await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => {
                            warn!(task = label, error = %format!("{err:#}"), "pool task failed");
                            Err(TaskFailure::Failed(err))
                        }
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            warn!(task = label, panic = %message, "pool task panicked");
                            Err(TaskFailure::Panicked(message))
                        }
                    }
                })
            })
            .ok_or(PoolError::ShutDown {
                operation: "submit",
            })?;

        Ok(TaskHandle { label, inner })
    }

    // Runs `spawn` under the intake read lock so shutdown cannot close the tracker
    // between the check and the spawn.
    fn while_accepting<R>(&self, spawn: impl FnOnce() -> R) -> Option<R> {
        let intake = self.inner.intake.read().unwrap_or_else(PoisonError::into_inner);
        (*intake).then(spawn)
    }

    /// Run a divide-and-conquer computation rooted at `root` and return every output.
    ///
    /// Each node is expanded on its own task; children returned by `expand` are
    /// scheduled independently and their outputs merged as they complete. Output
    /// order across sibling subtrees is unspecified; order within one expansion is
    /// preserved.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::BranchFailed`] with the first node error, or
    /// [`PoolError::BranchAborted`] if a node panicked. Remaining nodes are aborted
    /// and no partial result is returned. Returns [`PoolError::ShutDown`] once
    /// shutdown has started.
    pub async fn invoke_recursive<N, O, F, Fut>(&self, root: N, expand: F) -> PoolResult<Vec<O>>
    where
        N: Send + 'static,
        O: Send + 'static,
        F: Fn(N) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Expansion<N, O>>> + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(PoolError::ShutDown {
                operation: "invoke_recursive",
            });
        }

        let expand = Arc::new(expand);
        let mut branches = JoinSet::new();
        self.spawn_branch(&mut branches, &expand, root);

        let mut outputs = Vec::new();
        let mut expanded = 0_usize;
        while let Some(joined) = branches.join_next().await {
            let expansion = match joined {
                Ok(Ok(expansion)) => expansion,
                Ok(Err(source)) => {
                    branches.abort_all();
                    return Err(PoolError::BranchFailed { source });
                }
                Err(err) => {
                    branches.abort_all();
                    let message = if err.is_panic() {
                        panic_message(err.into_panic().as_ref())
                    } else {
                        err.to_string()
                    };
                    return Err(PoolError::BranchAborted { message });
                }
            };
            expanded += 1;
            outputs.extend(expansion.outputs);
            for child in expansion.children {
                self.spawn_branch(&mut branches, &expand, child);
            }
        }

        debug!(nodes = expanded, outputs = outputs.len(), "recursive invocation joined");
        Ok(outputs)
    }

    fn spawn_branch<N, O, F, Fut>(
        &self,
        branches: &mut JoinSet<anyhow::Result<Expansion<N, O>>>,
        expand: &Arc<F>,
        node: N,
    ) where
        N: Send + 'static,
        O: Send + 'static,
        F: Fn(N) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Expansion<N, O>>> + Send + 'static,
    {
        let permits = Arc::clone(&self.inner.permits);
        let expand = Arc::clone(expand);
        branches.spawn(async move {
            let _permit = permits.acquire_owned().await?;
            expand(node).await
        });
    }

    /// Stop accepting work and wait up to `deadline` for in-flight tasks.
    ///
    /// Safe to call more than once; later calls return
    /// [`ShutdownOutcome::AlreadyShutDown`] immediately.
    pub async fn shutdown(&self, deadline: Duration) -> ShutdownOutcome {
        // The write lock waits out every submission already past its check.
        let was_open = std::mem::replace(
            &mut *self.inner.intake.write().unwrap_or_else(PoisonError::into_inner),
            false,
        );
        if !was_open {
            return ShutdownOutcome::AlreadyShutDown;
        }
        self.inner.tracker.close();
        info!(in_flight = self.in_flight(), "draining task pool");
        if tokio::time::timeout(deadline, self.inner.tracker.wait())
            .await
            .is_ok()
        {
            info!("task pool drained");
            ShutdownOutcome::Drained
        } else {
            let pending = self.in_flight();
            warn!(
                pending,
                deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                "task pool shutdown deadline elapsed"
            );
            ShutdownOutcome::TimedOut { pending }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_parallelism_is_rejected() {
        assert!(matches!(
            TaskPool::new(0),
            Err(PoolError::InvalidParallelism { value: 0 })
        ));
    }

    #[test]
    fn default_parallelism_is_twice_core_count() {
        assert_eq!(default_parallelism(), num_cpus::get() * 2);
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        let text: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(text.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
