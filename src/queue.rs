//! Global job serialization
//!
//! Jobs go onto a bounded channel; a single-slot ready token guards its
//! receiving end. A submitter that takes the token hands it to a spawned
//! drainer, which pops jobs in FIFO order and runs them one at a time until
//! the channel is empty, sending each result back to its submitter. The
//! drainer owns the token, so a submitter that goes away never interrupts a
//! running job, and a panicking job still returns the token.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::language::LanguageProfile;

/// Default number of jobs that may wait for their turn
pub const DEFAULT_CAPACITY: usize = 500;

/// One submitted piece of code bound to a language
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub profile: Arc<LanguageProfile>,
    pub code: String,
}

impl Job {
    pub fn new(profile: Arc<LanguageProfile>, code: impl Into<String>) -> Self {
        Job {
            id: Uuid::new_v4(),
            profile,
            code: code.into(),
        }
    }
}

/// Runs a job once it holds the ready token
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<Vec<String>>;
}

struct Pending {
    job: Job,
    queued_at: Instant,
    reply: oneshot::Sender<Result<Vec<String>>>,
}

struct Shared {
    /// The ready token; holding it is the right to pop and run jobs
    token: Arc<Mutex<mpsc::Receiver<Pending>>>,
    handler: Arc<dyn JobHandler>,
    turns: AtomicU64,
}

impl Shared {
    /// Run queued jobs until the channel is empty, then return the token
    async fn drain(self: Arc<Self>, mut jobs: OwnedMutexGuard<mpsc::Receiver<Pending>>) {
        debug!("Token taken");
        while let Ok(pending) = jobs.try_recv() {
            self.run_one(pending).await;
        }
        debug!("Token released");
    }

    async fn run_one(&self, pending: Pending) {
        let Pending {
            job,
            queued_at,
            reply,
        } = pending;

        if reply.is_closed() {
            warn!(job = %job.id, "Skipping job whose submitter went away");
            return;
        }

        debug!(job = %job.id, waited = ?queued_at.elapsed(), "Admitted");
        let result = self.handler.handle(&job).await;
        self.turns.fetch_add(1, Ordering::SeqCst);

        if reply.send(result).is_err() {
            debug!(job = %job.id, "Submitter went away before the result arrived");
        }
    }
}

/// Serializes every job system-wide to one at a time
pub struct ExecutionQueue {
    capacity: usize,
    sender: mpsc::Sender<Pending>,
    shared: Arc<Shared>,
}

impl ExecutionQueue {
    pub fn new(capacity: usize, handler: Arc<dyn JobHandler>) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        ExecutionQueue {
            capacity,
            sender,
            shared: Arc::new(Shared {
                token: Arc::new(Mutex::new(receiver)),
                handler,
                turns: AtomicU64::new(0),
            }),
        }
    }

    /// Queue `job` and wait until it has run.
    ///
    /// Waits for space when the queue is full. Dropping the returned future
    /// before the job starts skips it; once started, the job runs to the end.
    pub async fn submit(&self, job: Job) -> Result<Vec<String>> {
        let id = job.id;
        let (reply, mut result) = oneshot::channel();

        self.sender
            .send(Pending {
                job,
                queued_at: Instant::now(),
                reply,
            })
            .await
            .map_err(|_| Error::Internal("Execution queue is closed".to_string()))?;
        debug!(job = %id, "Queued");

        // A drainer started after our send always reaches our job, and sends
        // its result before giving the token back.
        loop {
            tokio::select! {
                biased;
                done = &mut result => return Self::received(id, done),
                token = Arc::clone(&self.shared.token).lock_owned() => {
                    tokio::spawn(Arc::clone(&self.shared).drain(token));
                }
            }
        }
    }

    fn received(
        id: Uuid,
        done: std::result::Result<Result<Vec<String>>, oneshot::error::RecvError>,
    ) -> Result<Vec<String>> {
        done.unwrap_or_else(|_| Err(Error::Internal(format!("Job {} was dropped", id))))
    }

    /// Number of jobs that have been run
    pub fn turns(&self) -> u64 {
        self.shared.turns.load(Ordering::SeqCst)
    }

    /// Number of jobs currently waiting in the channel
    pub fn queued(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageRegistry;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Echoes the code back, tracking how many jobs run at once
    #[derive(Default)]
    struct EchoHandler {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        order: std::sync::Mutex<Vec<String>>,
        finished: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobHandler for EchoHandler {
        async fn handle(&self, job: &Job) -> Result<Vec<String>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(job.code.clone());

            let delay = if job.code.starts_with("slow") { 300 } else { 20 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.lock().unwrap().push(job.code.clone());

            match job.code.as_str() {
                "fail" => Err(Error::Execution {
                    status: Some(1),
                    output: "boom".into(),
                }),
                "panic" => panic!("handler panicked"),
                code => Ok(vec![code.to_string()]),
            }
        }
    }

    fn job(language: &str, code: &str) -> Job {
        let registry = LanguageRegistry::builtin();
        Job::new(registry.lookup(language).unwrap(), code)
    }

    #[tokio::test]
    async fn test_one_job_at_a_time() {
        let handler = Arc::new(EchoHandler::default());
        let queue = Arc::new(ExecutionQueue::new(DEFAULT_CAPACITY, handler.clone()));

        let languages = ["go", "python3", "node", "java"];
        let mut tasks = Vec::new();
        for i in 0..12 {
            let queue = queue.clone();
            let language = languages[i % languages.len()];
            tasks.push(tokio::spawn(async move {
                let code = format!("job-{}", i);
                let lines = queue.submit(job(language, &code)).await.unwrap();
                (code, lines)
            }));
        }

        for task in tasks {
            let (code, lines) = task.await.unwrap();
            assert_eq!(lines, vec![code]);
        }
        assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(queue.turns(), 12);
        assert_eq!(queue.queued(), 0);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let handler = Arc::new(EchoHandler::default());
        let queue = Arc::new(ExecutionQueue::new(DEFAULT_CAPACITY, handler.clone()));

        let mut tasks = Vec::new();
        for i in 0..5 {
            let queue = queue.clone();
            let code = if i == 0 { "slow-0".to_string() } else { format!("job-{}", i) };
            tasks.push(tokio::spawn(async move { queue.submit(job("go", &code)).await }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let order = handler.order.lock().unwrap().clone();
        assert_eq!(order, vec!["slow-0", "job-1", "job-2", "job-3", "job-4"]);
    }

    #[tokio::test]
    async fn test_error_releases_token() {
        let handler = Arc::new(EchoHandler::default());
        let queue = ExecutionQueue::new(4, handler);

        let err = queue.submit(job("go", "fail")).await.unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));

        let lines = queue.submit(job("go", "after")).await.unwrap();
        assert_eq!(lines, vec!["after"]);
    }

    #[tokio::test]
    async fn test_panic_releases_token() {
        let handler = Arc::new(EchoHandler::default());
        let queue = Arc::new(ExecutionQueue::new(4, handler));

        let err = queue.submit(job("go", "panic")).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        let lines = tokio::time::timeout(
            Duration::from_secs(5),
            queue.submit(job("python3", "still alive")),
        )
        .await
        .expect("queue deadlocked")
        .unwrap();
        assert_eq!(lines, vec!["still alive"]);
    }

    #[tokio::test]
    async fn test_cancelled_submitter_does_not_interrupt_running_jobs() {
        let handler = Arc::new(EchoHandler::default());
        let queue = Arc::new(ExecutionQueue::new(DEFAULT_CAPACITY, handler.clone()));

        // The first submitter takes the token and runs both jobs
        let holder = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(job("go", "slow-holder")).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let other = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(job("node", "slow-other")).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        holder.abort();
        assert!(holder.await.unwrap_err().is_cancelled());

        let lines = other.await.unwrap().unwrap();
        assert_eq!(lines, vec!["slow-other"]);

        let lines = queue.submit(job("python3", "after")).await.unwrap();
        assert_eq!(lines, vec!["after"]);

        let finished = handler.finished.lock().unwrap().clone();
        assert_eq!(finished, vec!["slow-holder", "slow-other", "after"]);
        assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(queue.turns(), 3);
    }

    #[tokio::test]
    async fn test_abandoned_job_is_skipped() {
        let handler = Arc::new(EchoHandler::default());
        let queue = Arc::new(ExecutionQueue::new(DEFAULT_CAPACITY, handler.clone()));

        let first = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(job("go", "slow-first")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let abandoned = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(job("go", "abandoned")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        abandoned.abort();

        let lines = queue.submit(job("go", "third")).await.unwrap();
        assert_eq!(lines, vec!["third"]);
        first.await.unwrap().unwrap();

        let order = handler.order.lock().unwrap().clone();
        assert_eq!(order, vec!["slow-first", "third"]);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let queue = ExecutionQueue::new(0, Arc::new(EchoHandler::default()));
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.submit(job("node", "x")).await.unwrap(), vec!["x"]);
    }
}
