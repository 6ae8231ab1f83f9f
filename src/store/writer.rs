//! store::writer
//!
//! The single-writer execution context of a ref.
//!
//! Every commit on a ref names the previous head as its parent, so commits
//! on one ref can only be built one at a time. Each ref gets one OS thread
//! that owns a long-lived [`Git`] handle and runs submitted jobs in order.
//! Callers get a future for each job's result and never block.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::core::types::RefName;
use crate::git::{Git, RepoHandle};

use super::error::{StoreError, StoreResult};

type Job = Box<dyn FnOnce(&Git) + Send>;

/// Serial job queue bound to one ref.
#[derive(Debug)]
pub struct RepoWriter {
    refname: RefName,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl RepoWriter {
    /// Open the repository and start the writer thread.
    pub fn spawn(handle: &RepoHandle, refname: RefName) -> StoreResult<Self> {
        let git = handle.open()?;
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let thread_ref = refname.clone();

        thread::Builder::new()
            .name(format!("gitkv-writer-{}", refname.short_name()))
            .spawn(move || {
                debug!(refname = %thread_ref, "writer started");
                while let Some(job) = receiver.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(|| job(&git))).is_err() {
                        error!(refname = %thread_ref, "writer job panicked");
                    }
                }
                debug!(refname = %thread_ref, "writer stopped");
            })
            .map_err(|e| StoreError::Io(crate::git::GitError::AccessError {
                message: format!("failed to start writer thread: {e}"),
            }))?;

        Ok(Self {
            refname,
            sender: Mutex::new(Some(sender)),
        })
    }

    pub fn refname(&self) -> &RefName {
        &self.refname
    }

    /// Queue a job. The job is queued immediately; the returned future only
    /// waits for its result.
    pub fn submit<T, F>(&self, job: F) -> impl Future<Output = StoreResult<T>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce(&Git) -> StoreResult<T> + Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let queued = match self.sender.lock().as_ref() {
            Some(sender) => sender
                .send(Box::new(move |git: &Git| {
                    let _ = reply.send(job(git));
                }))
                .is_ok(),
            None => false,
        };
        let refname = self.refname.to_string();

        async move {
            if !queued {
                return Err(StoreError::WriterClosed { refname });
            }
            result
                .await
                .map_err(|_| StoreError::WriterClosed { refname })?
        }
    }

    /// Stop accepting jobs. Queued jobs still run.
    pub fn close(&self) {
        if self.sender.lock().take().is_some() {
            debug!(refname = %self.refname, "writer closing");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Drop for RepoWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run object store work on tokio's blocking pool with a fresh handle.
///
/// Reads and cache loads go through here so they never queue behind the
/// ref's writer.
pub async fn run_blocking<T, F>(handle: RepoHandle, work: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Git) -> StoreResult<T> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let git = handle.open()?;
        work(&git)
    })
    .await;
    match joined {
        Ok(result) => result,
        Err(join) if join.is_panic() => panic::resume_unwind(join.into_panic()),
        Err(join) => Err(StoreError::Io(crate::git::GitError::Internal {
            message: format!("blocking task failed: {join}"),
        })),
    }
}
