use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{SocketError, SocketResult};

/// A unit of socket work. The future carries its own completion channel.
type IoJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Bounded pool of I/O workers.
/// - jobs go through a bounded channel, so `submit` waits when the queue is full
/// - a worker hands each job to its own task and goes back to the queue, so a
///   job parked on an idle socket never holds a worker
/// - `request_shutdown` stops the workers from taking new jobs; jobs still in
///   the queue are dropped and their callers see `Shutdown`
pub struct IoWorkerPool {
    jobs_tx: mpsc::Sender<IoJob>,
    shutdown_tx: watch::Sender<bool>,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl IoWorkerPool {
    /// Spawn `workers` workers. Must be called inside a tokio runtime.
    pub fn spawn(workers: usize, queue_capacity: usize) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel::<IoJob>(queue_capacity.max(1));
        let jobs_rx = Arc::new(AsyncMutex::new(jobs_rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(workers);
        for worker_id in 0..workers.max(1) {
            let rx = Arc::clone(&jobs_rx);
            let mut shutdown = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, rx, &mut shutdown).await;
            });
            joins.push(join);
        }

        Self {
            shutdown_tx,
            jobs_tx,
            joins: Mutex::new(joins),
        }
    }

    /// Run `job` through the pool and await its output.
    pub async fn submit<T, F>(&self, job: F) -> SocketResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: IoJob = Box::pin(async move {
            // caller が先に諦めていても無視してよい
            let _ = done_tx.send(job.await);
        });

        self.jobs_tx
            .send(job)
            .await
            .map_err(|_| SocketError::Shutdown)?;
        done_rx.await.map_err(|_| SocketError::Shutdown)
    }

    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(&self) {
        self.request_shutdown();
        let joins = std::mem::take(&mut *self.joins.lock());
        for j in joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    jobs: Arc<AsyncMutex<mpsc::Receiver<IoJob>>>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let job = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // pool が drop された
                    break;
                }
                continue;
            }
            job = async { jobs.lock().await.recv().await } => job,
        };

        let Some(job) = job else {
            break;
        };

        tokio::spawn(job);
    }
    debug!(worker_id, "i/o worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_submit_returns_job_result() {
        let pool = IoWorkerPool::spawn(2, 4);
        let value = pool.submit(async { 40 + 2 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parked_jobs_do_not_hold_workers() {
        let pool = Arc::new(IoWorkerPool::spawn(1, 4));

        // 完了しない job を worker 数より多く積んでも後続は進む
        let (_never_tx, never_rx) = watch::channel(());
        let mut parked = Vec::new();
        for _ in 0..3 {
            let pool = Arc::clone(&pool);
            let mut never = never_rx.clone();
            parked.push(tokio::spawn(async move {
                pool.submit(async move {
                    let _ = never.changed().await;
                })
                .await
            }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let value = tokio::time::timeout(Duration::from_secs(2), pool.submit(async { "done" }))
            .await
            .expect("pool stalled behind parked jobs")
            .unwrap();
        assert_eq!(value, "done");
        assert!(parked.iter().all(|p| !p.is_finished()));

        for p in parked {
            p.abort();
        }
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let pool = IoWorkerPool::spawn(1, 1);
        pool.shutdown_and_join().await;
        assert!(pool.is_shutdown());

        let err = pool.submit(async {}).await.unwrap_err();
        assert!(matches!(err, SocketError::Shutdown));
    }
}
