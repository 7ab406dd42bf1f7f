//! Background retry sweeping and the delivery worker pool.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::domain::JobId;
use crate::infra::{JobStore, Result, TrustError};

use super::engine::DeliveryEngine;

/// Counters from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Due `retry` jobs moved back to `pending`
    pub requeued: u64,
    /// Claimable jobs handed to the worker pool
    pub enqueued: u64,
    /// `sent` jobs failed for a lapsed acknowledgment window
    pub ack_timeouts: u64,
    /// Whether this tick actually swept (false when one was in flight)
    pub swept: bool,
}

/// Fixed-interval cooperative scan over the job store.
///
/// Moves due retries back to `pending`, hands claimable work to the worker
/// pool, and fails `sent` jobs whose acknowledgment window lapsed. At most
/// one sweep is in flight at a time; an overlapping tick is a no-op.
pub struct RetrySweeper {
    engine: Arc<DeliveryEngine>,
    jobs: Arc<dyn JobStore>,
    queue: mpsc::Sender<JobId>,
    config: EngineConfig,
    in_flight: Mutex<()>,
    running: RwLock<bool>,
}

impl RetrySweeper {
    pub fn new(
        engine: Arc<DeliveryEngine>,
        jobs: Arc<dyn JobStore>,
        queue: mpsc::Sender<JobId>,
        config: EngineConfig,
    ) -> Self {
        Self {
            engine,
            jobs,
            queue,
            config,
            in_flight: Mutex::new(()),
            running: RwLock::new(false),
        }
    }

    /// One sweep. Public so operational tooling and tests can drive the
    /// sweeper without the interval loop.
    pub async fn tick(&self) -> Result<SweepStats> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Sweep already in flight; skipping tick");
            return Ok(SweepStats::default());
        };

        let mut stats = SweepStats {
            swept: true,
            ..SweepStats::default()
        };
        let now = Utc::now();

        // Lapsed acknowledgment windows count as transport failures
        let ack_cutoff = now
            - ChronoDuration::from_std(self.config.ack_timeout)
                .unwrap_or_else(|_| ChronoDuration::seconds(900));
        for job in self.jobs.stale_sent(ack_cutoff, self.config.sweep_batch).await? {
            warn!(job_id = %job.id, "Acknowledgment window lapsed; failing sent job");
            self.engine.handle_ack_timeout(job.id).await?;
            stats.ack_timeouts += 1;
        }

        // Due retries re-enter the pending pool
        for job in self.jobs.due_retries(now, self.config.sweep_batch).await? {
            if self.engine.requeue(job.id).await?.is_some() {
                stats.requeued += 1;
            }
        }

        // Hand every claimable job to the workers; anything the queue
        // cannot take stays pending for the next tick
        for job in self
            .jobs
            .claimable_pending(now, self.config.sweep_batch)
            .await?
        {
            match self.queue.try_send(job.id) {
                Ok(()) => stats.enqueued += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Worker queue full; leaving remaining jobs for next sweep");
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(TrustError::Internal("worker queue closed".to_string()));
                }
            }
        }

        if stats.requeued > 0 || stats.enqueued > 0 || stats.ack_timeouts > 0 {
            info!(
                requeued = stats.requeued,
                enqueued = stats.enqueued,
                ack_timeouts = stats.ack_timeouts,
                "Sweep complete"
            );
        }
        Ok(stats)
    }

    /// Run the sweep loop until [`stop`](Self::stop) is called.
    pub async fn run(&self) -> Result<()> {
        {
            let mut running = self.running.write().await;
            if *running {
                return Err(TrustError::Internal("sweeper already running".to_string()));
            }
            *running = true;
        }

        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "Retry sweeper started"
        );

        loop {
            if !*self.running.read().await {
                info!("Retry sweeper stopping");
                break;
            }

            if let Err(e) = self.tick().await {
                // Store outages are transient from the sweeper's point of
                // view; keep ticking and let jobs drain once it recovers
                error!(error = %e, "Sweep failed");
            }

            tokio::time::sleep(self.config.sweep_interval).await;
        }

        Ok(())
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}

/// Pool of workers draining the delivery queue.
///
/// Jobs are independent units; parallel execution across jobs is safe, and
/// per-job exclusivity is enforced by the engine's claim/lease, so a
/// duplicate id in the queue is harmless.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Bounded handoff channel between the sweeper and the workers.
    pub fn channel(capacity: usize) -> (mpsc::Sender<JobId>, mpsc::Receiver<JobId>) {
        mpsc::channel(capacity)
    }

    /// Spawn `workers` tasks draining `receiver`. The pool winds down when
    /// every sender is dropped.
    pub fn spawn(
        engine: Arc<DeliveryEngine>,
        receiver: mpsc::Receiver<JobId>,
        workers: usize,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let engine = engine.clone();
            let receiver = receiver.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = { receiver.lock().await.recv().await };
                    match next {
                        Some(job_id) => match engine.attempt(job_id).await {
                            Ok(Some(job)) => debug!(
                                worker_id,
                                job_id = %job.id,
                                status = %job.status,
                                "Attempt complete"
                            ),
                            Ok(None) => debug!(worker_id, %job_id, "Job not claimable"),
                            Err(e) => error!(worker_id, %job_id, error = %e, "Attempt errored"),
                        },
                        None => {
                            debug!(worker_id, "Delivery queue closed; worker exiting");
                            break;
                        }
                    }
                }
            }));
        }

        Self { handles }
    }

    /// Await worker shutdown after the queue's senders are dropped.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Delivery worker panicked");
            }
        }
    }
}
