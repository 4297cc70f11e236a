//! ReconcilePendingHandler - polls processors for payments whose webhook never arrived.
//!
//! Each run lists recent pending payments, asks the owning processor for the
//! live status and hands terminal statuses to the entitlement writer. A
//! failing record never aborts the batch; it lands in the report instead.
//! The whole run is bounded by a deadline: a poll still outstanding when it
//! passes is abandoned and left pending for the next run, while a write that
//! already started is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::Instant;

use crate::domain::billing::{
    classify_processor_status, processor_reference, BillingError, OutcomeMetadata,
    PaymentOutcome, PaymentRecord, StatusVerdict,
};
use crate::domain::foundation::{PaymentId, Timestamp};
use crate::ports::PaymentRepository;

use super::apply_outcome::{ApplyOutcomeCommand, ApplyOutcomeHandler, ApplyOutcomeResult};
use super::processors::ProcessorRegistry;
use super::resolve_payment::PaymentResolver;

/// Command to sweep pending payments created within `max_age`.
#[derive(Debug, Clone)]
pub struct ReconcilePendingCommand {
    pub max_age: Duration,
}

/// Limits applied to every sweep.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Total wall-clock budget for one run.
    pub deadline: Duration,
    /// Processor polls in flight at once.
    pub concurrency: usize,
    /// Most records considered per run.
    pub batch_limit: u32,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(50),
            concurrency: 4,
            batch_limit: 500,
        }
    }
}

/// Per-record failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileError {
    pub payment_id: PaymentId,
    pub message: String,
}

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub checked: usize,
    pub verified: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub unresolved: usize,
    /// Not finished before the deadline; retried next run.
    pub skipped: usize,
    pub errors: Vec<ReconcileError>,
    /// Processor events since start that matched no payment.
    pub unmatched_webhooks: u64,
}

enum RecordOutcome {
    Verified,
    Failed,
    Unchanged,
    Unresolved,
    Skipped,
    Error(ReconcileError),
}

impl ReconciliationReport {
    fn record(&mut self, outcome: RecordOutcome) {
        if !matches!(outcome, RecordOutcome::Skipped) {
            self.checked += 1;
        }
        match outcome {
            RecordOutcome::Verified => self.verified += 1,
            RecordOutcome::Failed => self.failed += 1,
            RecordOutcome::Unchanged => self.unchanged += 1,
            RecordOutcome::Unresolved => self.unresolved += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Error(err) => self.errors.push(err),
        }
    }
}

pub struct ReconcilePendingHandler {
    repository: Arc<dyn PaymentRepository>,
    processors: ProcessorRegistry,
    writer: Arc<ApplyOutcomeHandler>,
    settings: SweepSettings,
    resolver: Option<Arc<PaymentResolver>>,
}

impl ReconcilePendingHandler {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        processors: ProcessorRegistry,
        writer: Arc<ApplyOutcomeHandler>,
        settings: SweepSettings,
    ) -> Self {
        Self {
            repository,
            processors,
            writer,
            settings,
            resolver: None,
        }
    }

    /// Reports the webhook resolver's unmatched-event total with every sweep.
    pub fn with_resolver(mut self, resolver: Arc<PaymentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    /// Runs one sweep.
    ///
    /// # Errors
    ///
    /// Only when the pending payments cannot be listed. Everything after that
    /// is reported per record.
    pub async fn handle(
        &self,
        cmd: ReconcilePendingCommand,
    ) -> Result<ReconciliationReport, BillingError> {
        let deadline = Instant::now() + self.settings.deadline;
        let created_after = Timestamp::now().minus(cmd.max_age);

        let pending = self
            .repository
            .list_pending(created_after, self.settings.batch_limit)
            .await?;

        let outcomes: Vec<RecordOutcome> = stream::iter(pending)
            .map(|payment| self.reconcile(payment, deadline))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut report = ReconciliationReport {
            unmatched_webhooks: self
                .resolver
                .as_ref()
                .map_or(0, |resolver| resolver.unresolved_count()),
            ..ReconciliationReport::default()
        };
        for outcome in outcomes {
            report.record(outcome);
        }

        tracing::info!(
            checked = report.checked,
            verified = report.verified,
            failed = report.failed,
            unchanged = report.unchanged,
            unresolved = report.unresolved,
            skipped = report.skipped,
            errors = report.errors.len(),
            unmatched_webhooks = report.unmatched_webhooks,
            "reconciliation sweep complete"
        );
        for err in &report.errors {
            tracing::error!(payment_id = %err.payment_id, error = %err.message, "reconciliation failed for payment");
        }

        Ok(report)
    }

    async fn reconcile(&self, payment: PaymentRecord, deadline: Instant) -> RecordOutcome {
        if Instant::now() >= deadline {
            return RecordOutcome::Skipped;
        }
        let error = |message: String| {
            RecordOutcome::Error(ReconcileError {
                payment_id: payment.id,
                message,
            })
        };

        let Some(processor) = self.processors.get(payment.payment_method) else {
            return error(format!("no processor for {}", payment.payment_method));
        };

        let Some((reference, source)) = processor_reference(&payment) else {
            tracing::warn!(
                target: "billing::correlation",
                payment_id = %payment.id,
                transaction_id = %payment.transaction_id,
                "no processor reference recoverable for pending payment"
            );
            return RecordOutcome::Unresolved;
        };

        let status = match tokio::time::timeout_at(deadline, processor.get_status(&reference)).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => return error(err.to_string()),
            Err(_) => {
                tracing::debug!(payment_id = %payment.id, %reference, "sweep deadline reached mid-poll");
                return RecordOutcome::Skipped;
            }
        };

        let outcome = match classify_processor_status(&status.raw_status) {
            StatusVerdict::Unchanged => {
                tracing::debug!(
                    payment_id = %payment.id,
                    %reference,
                    status = %status.raw_status,
                    "payment still pending at processor"
                );
                return RecordOutcome::Unchanged;
            }
            StatusVerdict::Verified => PaymentOutcome::Verified,
            StatusVerdict::Failed => {
                PaymentOutcome::failed(status.raw_status.trim().to_ascii_lowercase())
            }
        };

        tracing::debug!(payment_id = %payment.id, %reference, ?source, "applying polled status");

        let result = self
            .writer
            .handle(ApplyOutcomeCommand {
                payment_id: payment.id,
                outcome,
                metadata: OutcomeMetadata::reconciliation().with_verified_amount(status.amount),
            })
            .await;

        match result {
            Ok(ApplyOutcomeResult::Verified { .. }) => RecordOutcome::Verified,
            Ok(ApplyOutcomeResult::Failed) => RecordOutcome::Failed,
            Ok(ApplyOutcomeResult::AlreadyFinal(_)) => RecordOutcome::Unchanged,
            Err(err) => error(err.to_string()),
        }
    }
}
