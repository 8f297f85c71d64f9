use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::backend::{GenerationBackend, GenerationParams};
use crate::error::BackendError;

// Queued generation - holds the request + response channel
pub struct GenerationJob {
    pub text: String,
    pub params: GenerationParams,
    pub response_tx: oneshot::Sender<Result<String, BackendError>>,
}

/// Bounded queue in front of the backend, drained by a fixed worker pool.
///
/// The pool size caps how many backend calls run at once. Workers exit once
/// every handle to the queue is dropped.
#[derive(Clone)]
pub struct GenerationQueue {
    tx: mpsc::Sender<GenerationJob>,
}

impl GenerationQueue {
    pub fn spawn(backend: Arc<dyn GenerationBackend>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let workers = workers.max(1);
        for id in 0..workers {
            tokio::spawn(worker(id, rx.clone(), backend.clone()));
        }
        tracing::info!(workers, "generation workers started");
        Self { tx }
    }

    /// Queue a generation and wait for its result.
    pub async fn submit(&self, text: String, params: GenerationParams) -> Result<String, BackendError> {
        let (response_tx, response_rx) = oneshot::channel();
        let job = GenerationJob {
            text,
            params,
            response_tx,
        };
        self.tx
            .send(job)
            .await
            .map_err(|_| BackendError::QueueClosed)?;

        response_rx.await.map_err(|_| BackendError::QueueClosed)?
    }
}

async fn worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<GenerationJob>>>,
    backend: Arc<dyn GenerationBackend>,
) {
    loop {
        // hold the lock only while waiting for the next job
        let job = rx.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        if job.response_tx.is_closed() {
            tracing::debug!(worker = id, "requester gone, skipping job");
            continue;
        }

        let result = backend.generate(&job.text, &job.params).await;
        if let Err(e) = &result {
            tracing::debug!(worker = id, error = %e, "generation failed");
        }
        // Send response back to the waiting request
        let _ = job.response_tx.send(result);
    }
    tracing::debug!(worker = id, "generation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowEcho {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl GenerationBackend for SlowEcho {
        async fn generate(&self, text: &str, _: &GenerationParams) -> Result<String, BackendError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if text == "boom" {
                return Err(BackendError::Other("exploded".into()));
            }
            Ok(text.to_uppercase())
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    fn echo() -> Arc<SlowEcho> {
        Arc::new(SlowEcho {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn submit_returns_backend_result() {
        let queue = GenerationQueue::spawn(echo(), 2, 8);
        let params = GenerationParams::new(10, 0.7);
        assert_eq!(queue.submit("hi".into(), params).await.unwrap(), "HI");
        assert_eq!(
            queue.submit("boom".into(), params).await.unwrap_err(),
            BackendError::Other("exploded".into())
        );
    }

    #[tokio::test]
    async fn worker_pool_caps_concurrency() {
        let backend = echo();
        let queue = GenerationQueue::spawn(backend.clone(), 3, 32);
        let params = GenerationParams::new(10, 0.7);

        let calls: Vec<_> = (0..12)
            .map(|i| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.submit(format!("p{i}"), params).await })
            })
            .collect();
        for call in calls {
            assert!(call.await.unwrap().is_ok());
        }
        assert!(backend.peak.load(Ordering::SeqCst) <= 3);
    }
}
