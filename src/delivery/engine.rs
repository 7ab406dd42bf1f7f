//! The delivery engine: submission with idempotent dedup, leased attempt
//! execution, acknowledgment handling, and statistics.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

use crate::audit::AuditLog;
use crate::config::EngineConfig;
use crate::crypto::compute_idempotency_key;
use crate::domain::{
    ActionType, AuditEntryDraft, DeliveryJob, DeliveryMethod, DeliveryStatistics, DeliveryStatus,
    EntryStatus, EventType, JobId, Platform, PolicyId, SubjectId,
};
use crate::infra::{JobStore, Result, TrustError};
use crate::template::TemplateRegistry;

use super::transport::{DispatchEnvelope, DispatchOutcome, TransportError, TransportRegistry};

/// One logical notification to deliver.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub policy_id: PolicyId,
    pub subject_id: SubjectId,
    pub platform: Platform,
    pub action_type: ActionType,
    pub method: DeliveryMethod,
    /// Template rendering context; identical context yields an identical
    /// idempotency key
    pub context: BTreeMap<String, String>,
}

/// Outcome of a batch submission: per-request results in input order.
#[derive(Debug)]
pub struct BatchSubmitOutcome {
    pub submitted: Vec<DeliveryJob>,
    pub rejected: Vec<(usize, TrustError)>,
}

/// Outward alert channel for jobs that exhausted their attempts. Expiry is
/// the one condition that must reach a human, not just a log line; inject
/// a pager or ticketing integration here.
#[async_trait]
pub trait ExpiryAlerter: Send + Sync {
    async fn alert(&self, job: &DeliveryJob);
}

/// Default alerter: an error-level structured log record.
pub struct TracingAlerter;

#[async_trait]
impl ExpiryAlerter for TracingAlerter {
    async fn alert(&self, job: &DeliveryJob) {
        tracing::error!(
            job_id = %job.id,
            policy_id = %job.policy_id,
            subject_id = %job.subject_id,
            platform = %job.platform,
            method = %job.method,
            attempts = job.attempt_count,
            last_error = ?job.last_error,
            "Delivery job EXPIRED after exhausting attempts; human follow-up required"
        );
    }
}

/// Executes delivery jobs against pluggable transports, applying retry,
/// backoff, idempotency, and status tracking. Every attempt, success, or
/// failure is itself an audit entry on the subject's chain.
pub struct DeliveryEngine {
    jobs: Arc<dyn JobStore>,
    audit: Arc<AuditLog>,
    templates: Arc<TemplateRegistry>,
    transports: TransportRegistry,
    config: EngineConfig,
    alerter: Arc<dyn ExpiryAlerter>,
}

impl DeliveryEngine {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        audit: Arc<AuditLog>,
        templates: Arc<TemplateRegistry>,
        transports: TransportRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            jobs,
            audit,
            templates,
            transports,
            config,
            alerter: Arc::new(TracingAlerter),
        }
    }

    /// Replace the default log-only expiry alerter.
    pub fn with_alerter(mut self, alerter: Arc<dyn ExpiryAlerter>) -> Self {
        self.alerter = alerter;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submit a notification for delivery.
    ///
    /// Renders deterministically, deduplicates by idempotency key, and
    /// durably queues a new job. Callers see success once the job is
    /// queued; `status` is the way to observe the eventual outcome.
    /// Template and rendering errors return synchronously and are never
    /// retried.
    #[instrument(skip(self, request), fields(
        policy_id = %request.policy_id,
        platform = %request.platform,
        method = %request.method
    ))]
    pub async fn submit(&self, request: SubmitRequest) -> Result<DeliveryJob> {
        let rendered = self
            .templates
            .render(
                &request.platform,
                request.action_type,
                request.method,
                &request.context,
            )
            .await?;

        let idempotency_key = compute_idempotency_key(
            &request.policy_id.0,
            request.platform.as_str(),
            request.method.as_str(),
            &rendered.payload_hash,
        );

        if let Some(existing) = self.jobs.find_by_idempotency_key(&idempotency_key).await? {
            return self.converge_resubmission(existing).await;
        }

        let envelope = DispatchEnvelope::from_rendered(&rendered);
        let rendered_payload = serde_json::to_string(&envelope)
            .map_err(|e| TrustError::Internal(format!("envelope serialization: {e}")))?;

        let now = Utc::now();
        let job = DeliveryJob {
            id: JobId::new(),
            policy_id: request.policy_id,
            subject_id: request.subject_id,
            platform: request.platform.clone(),
            action_type: request.action_type,
            method: request.method,
            rendered_payload,
            idempotency_key,
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        };

        // Audit before the row exists: no job is ever created without its
        // queued entry. A duplicate queued entry from a rare replay is
        // preferable to a job with no audit trail.
        self.audit.append(self.queued_draft(&job)).await?;

        if let Err(insert_err) = self.jobs.insert(&job).await {
            // A concurrent submit with the same key may have won the race
            if let Some(existing) = self.jobs.find_by_idempotency_key(&idempotency_key).await? {
                return Ok(existing);
            }
            return Err(insert_err);
        }

        tracing::info!(job_id = %job.id, "Delivery job queued");
        Ok(job)
    }

    /// Submit one policy across several platforms in one call.
    pub async fn submit_batch(
        &self,
        subject_id: SubjectId,
        requests: Vec<SubmitRequest>,
    ) -> Result<BatchSubmitOutcome> {
        let total = requests.len();
        let mut outcome = BatchSubmitOutcome {
            submitted: Vec::new(),
            rejected: Vec::new(),
        };

        for (index, request) in requests.into_iter().enumerate() {
            match self.submit(request).await {
                Ok(job) => outcome.submitted.push(job),
                Err(e @ TrustError::StoreUnavailable(_)) => return Err(e),
                Err(e) => outcome.rejected.push((index, e)),
            }
        }

        self.audit
            .append(
                AuditEntryDraft::new(
                    subject_id,
                    EventType::NOTIFICATION_BATCH_SUBMITTED,
                    format!(
                        "Batch submission: {} of {} notifications queued",
                        outcome.submitted.len(),
                        total
                    ),
                )
                .output(serde_json::json!({
                    "total": total,
                    "queued": outcome.submitted.len(),
                    "rejected": outcome.rejected.len(),
                }))
                .status(if outcome.rejected.is_empty() {
                    EntryStatus::Success
                } else {
                    EntryStatus::Failure
                }),
            )
            .await?;

        Ok(outcome)
    }

    /// Resubmission with an existing key: active and terminal-success jobs
    /// are returned unchanged; a terminal-failed (expired) job gets its
    /// retry scheduling reset.
    async fn converge_resubmission(&self, existing: DeliveryJob) -> Result<DeliveryJob> {
        if existing.status != DeliveryStatus::Expired {
            tracing::debug!(
                job_id = %existing.id,
                status = %existing.status,
                "Submit deduplicated onto existing job"
            );
            return Ok(existing);
        }

        let mut job = existing;
        self.audit.append(self.queued_draft(&job)).await?;

        job.status = DeliveryStatus::Pending;
        job.attempt_count = 0;
        job.last_error = None;
        job.next_attempt_at = None;
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        self.jobs.update(&job).await?;

        tracing::info!(job_id = %job.id, "Expired job re-queued by resubmission");
        Ok(job)
    }

    /// Execute one delivery attempt for the job, if it can be claimed.
    ///
    /// Returns `Ok(None)` when another worker holds the job or it is not
    /// in a claimable state. Transport failures never surface here; they
    /// become job state.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn attempt(&self, id: JobId) -> Result<Option<DeliveryJob>> {
        let now = Utc::now();
        let lease_until = now
            + ChronoDuration::from_std(self.config.lease_timeout)
                .unwrap_or_else(|_| ChronoDuration::seconds(120));

        let Some(mut job) = self.jobs.claim(id, now, lease_until).await? else {
            return Ok(None);
        };

        let envelope: DispatchEnvelope = serde_json::from_str(&job.rendered_payload)
            .map_err(|e| TrustError::Internal(format!("malformed dispatch envelope: {e}")))?;

        let transport = self
            .transports
            .get(job.method)
            .ok_or(TrustError::TransportUnavailable(job.method))?;

        // Transport I/O runs under the job lease only; no audit chain lock
        // is held across it.
        let dispatch_result =
            match tokio::time::timeout(self.config.transport_timeout, transport.dispatch(&envelope))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(self.config.transport_timeout)),
            };

        job.attempt_count += 1;

        match dispatch_result {
            Ok(outcome) => {
                let next_status = if job.method.is_fire_and_forget() {
                    DeliveryStatus::Delivered
                } else {
                    match outcome {
                        DispatchOutcome::Delivered => DeliveryStatus::Delivered,
                        DispatchOutcome::Sent => DeliveryStatus::Sent,
                    }
                };
                self.transition(&mut job, next_status).await?;
            }
            Err(transport_err) => {
                tracing::warn!(
                    job_id = %job.id,
                    attempt = job.attempt_count,
                    error = %transport_err,
                    "Delivery attempt failed"
                );
                self.apply_failure(&mut job, transport_err.to_string()).await?;
            }
        }

        Ok(Some(job))
    }

    /// Record an external acknowledgment (webhook callback, API
    /// confirmation) for a `sent` job.
    pub async fn acknowledge(&self, id: JobId) -> Result<DeliveryJob> {
        let mut job = self
            .jobs
            .get(id)
            .await?
            .ok_or(TrustError::JobNotFound(id))?;

        if job.status != DeliveryStatus::Sent {
            return Err(TrustError::InvalidTransition {
                job_id: id,
                from: job.status,
                to: DeliveryStatus::Delivered,
            });
        }

        self.transition(&mut job, DeliveryStatus::Delivered).await?;
        Ok(job)
    }

    /// Current state of a job.
    pub async fn status(&self, id: JobId) -> Result<DeliveryJob> {
        self.jobs.get(id).await?.ok_or(TrustError::JobNotFound(id))
    }

    /// Delivery statistics over the trailing window.
    pub async fn statistics(&self, window: ChronoDuration) -> Result<DeliveryStatistics> {
        self.jobs.statistics(Utc::now() - window).await
    }

    /// A `sent` job whose acknowledgment window lapsed re-enters the retry
    /// path, identical to a transport error. Called by the sweeper.
    pub(crate) async fn handle_ack_timeout(&self, id: JobId) -> Result<()> {
        let Some(mut job) = self.jobs.get(id).await? else {
            return Ok(());
        };
        if job.status != DeliveryStatus::Sent {
            return Ok(());
        }

        job.attempt_count += 1;
        self.apply_failure(
            &mut job,
            format!(
                "no acknowledgment within {}s",
                self.config.ack_timeout.as_secs()
            ),
        )
        .await
    }

    /// Move a due `retry` job back to `pending`. Scheduling bookkeeping,
    /// not an audited state change of its own; the preceding failure entry
    /// already recorded the retry decision. Called by the sweeper.
    pub(crate) async fn requeue(&self, id: JobId) -> Result<Option<DeliveryJob>> {
        let Some(mut job) = self.jobs.get(id).await? else {
            return Ok(None);
        };
        if job.status != DeliveryStatus::Retry {
            return Ok(None);
        }

        job.status = DeliveryStatus::Pending;
        job.next_attempt_at = None;
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        self.jobs.update(&job).await?;
        Ok(Some(job))
    }

    /// Failure path shared by transport errors and ack timeouts: schedule a
    /// retry with capped exponential backoff, or expire the job once
    /// attempts are exhausted. `attempt_count` has already been bumped.
    ///
    /// Every failed attempt writes a `notification_failed` entry; the final
    /// one additionally writes `notification_expired`, since the hop from
    /// failed to expired is its own transition with its own entry.
    async fn apply_failure(&self, job: &mut DeliveryJob, error: String) -> Result<()> {
        job.last_error = Some(error);

        if job.attempt_count < self.config.max_attempts {
            let next_attempt_at = self
                .config
                .backoff
                .next_attempt_at(Utc::now(), job.attempt_count);
            job.next_attempt_at = Some(next_attempt_at);
            self.transition(job, DeliveryStatus::Retry).await
        } else {
            job.next_attempt_at = None;
            self.audit
                .append(
                    AuditEntryDraft::new(
                        job.subject_id,
                        EventType::NOTIFICATION_FAILED,
                        format!(
                            "Delivery to {} failed (attempt {}); attempts exhausted",
                            job.platform, job.attempt_count
                        ),
                    )
                    .output(serde_json::json!({
                        "job_id": job.id.to_string(),
                        "attempt": job.attempt_count,
                        "last_error": job.last_error,
                    }))
                    .status(EntryStatus::Failure),
                )
                .await?;
            self.transition(job, DeliveryStatus::Expired).await?;
            self.alerter.alert(job).await;
            Ok(())
        }
    }

    /// Apply a state transition: validate it, append its audit entry, then
    /// persist the job. The audit entry goes first so a store failure can
    /// never leave a transition unaccounted for; the lapsed lease replays
    /// the attempt instead.
    async fn transition(&self, job: &mut DeliveryJob, to: DeliveryStatus) -> Result<()> {
        let from = job.status;
        let legal = match (from, to) {
            // pending -> failed -> retry/expired collapses into one
            // persisted transition; validate the two hops
            (DeliveryStatus::Pending, DeliveryStatus::Retry | DeliveryStatus::Expired)
            | (DeliveryStatus::Sent, DeliveryStatus::Retry | DeliveryStatus::Expired) => {
                from.can_transition_to(DeliveryStatus::Failed)
                    && DeliveryStatus::Failed.can_transition_to(to)
            }
            _ => from.can_transition_to(to),
        };
        if !legal {
            return Err(TrustError::InvalidTransition {
                job_id: job.id,
                from,
                to,
            });
        }

        self.audit.append(self.transition_draft(job, to)).await?;

        job.status = to;
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        self.jobs.update(job).await?;

        tracing::info!(
            job_id = %job.id,
            from = %from,
            to = %to,
            attempt = job.attempt_count,
            "Delivery job transitioned"
        );
        Ok(())
    }

    fn queued_draft(&self, job: &DeliveryJob) -> AuditEntryDraft {
        AuditEntryDraft::new(
            job.subject_id,
            EventType::NOTIFICATION_QUEUED,
            format!(
                "Notification queued for {} via {} ({})",
                job.platform, job.method, job.action_type
            ),
        )
        .input(serde_json::json!({
            "job_id": job.id.to_string(),
            "policy_id": job.policy_id.to_string(),
            "platform": job.platform.as_str(),
            "method": job.method.as_str(),
            "idempotency_key": hex::encode(job.idempotency_key),
        }))
        .status(EntryStatus::Pending)
    }

    fn transition_draft(&self, job: &DeliveryJob, to: DeliveryStatus) -> AuditEntryDraft {
        let (event_type, status, description) = match to {
            DeliveryStatus::Sent => (
                EventType::NOTIFICATION_SENT,
                EntryStatus::Success,
                format!("Notification sent to {} via {}", job.platform, job.method),
            ),
            DeliveryStatus::Delivered => (
                EventType::NOTIFICATION_DELIVERED,
                EntryStatus::Success,
                format!("Notification to {} acknowledged as delivered", job.platform),
            ),
            DeliveryStatus::Retry => (
                EventType::NOTIFICATION_FAILED,
                EntryStatus::Failure,
                format!(
                    "Delivery to {} failed (attempt {}); retry scheduled",
                    job.platform, job.attempt_count
                ),
            ),
            DeliveryStatus::Expired => (
                EventType::NOTIFICATION_EXPIRED,
                EntryStatus::Failure,
                format!(
                    "Delivery to {} expired after {} attempts",
                    job.platform, job.attempt_count
                ),
            ),
            DeliveryStatus::Pending | DeliveryStatus::Failed => (
                EventType::NOTIFICATION_QUEUED,
                EntryStatus::Pending,
                format!("Notification to {} re-queued", job.platform),
            ),
        };

        let mut output = serde_json::json!({
            "job_id": job.id.to_string(),
            "attempt": job.attempt_count,
        });
        if let Some(error) = &job.last_error {
            output["last_error"] = serde_json::Value::String(error.clone());
        }
        if let Some(next) = job.next_attempt_at {
            output["next_attempt_at"] = serde_json::Value::String(next.to_rfc3339());
        }

        AuditEntryDraft::new(job.subject_id, event_type, description)
            .output(output)
            .status(status)
    }
}
