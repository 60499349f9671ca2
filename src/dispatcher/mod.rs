//! The dispatch cycle: select due alerts, run each through
//! curate → extract → synthesize → filter → schedule → deliver with a capped
//! number of alerts in flight, then sweep and refresh credentials.
//!
//! Alerts never fail each other. Every alert settles on its own, a failed one
//! still has its `next_run` advanced, and only the cycle deadline aborts the
//! whole run.

mod deadline;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tracing::Instrument;

use crate::config::DispatchConfig;
use crate::curator::CuratorRegistry;
use crate::custodian::Custodian;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::herald::{DeliveryContext, DeliveryError, Herald};
use crate::maintenance::CredentialRefresher;
use crate::models::{Alert, RunSummary, Story, WaitPolicy};
use crate::reaper::Reaper;
use crate::sage::Sage;
use crate::schedule;

pub use deadline::{run_stage, within, Stage, StageError, StageFailure, Timed};

/// Stories that may go out this run: not marked irrelevant by anyone and
/// created after the previous run.
pub fn filter_deliverable(stories: Vec<Story>, last_run: Option<DateTime<Utc>>) -> Vec<Story> {
    stories
        .into_iter()
        .filter(|story| story.is_deliverable_since(last_run))
        .collect()
}

/// Whether `eligible` stories are enough to notify subscribers.
pub fn should_deliver(wait: &WaitPolicy, eligible: usize) -> bool {
    match wait {
        WaitPolicy::Count(threshold) => eligible > 0 && eligible >= *threshold as usize,
        WaitPolicy::Schedule(_) => eligible > 0,
    }
}

/// One subscription's delivery, tagged with its subscription id.
type PendingDelivery<'a> = BoxFuture<'a, (i64, Timed<std::result::Result<(), DeliveryError>>)>;

/// What one successful alert contributed to the run summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct AlertReport {
    stories_filtered: usize,
    stories_sent: usize,
    deliveries_attempted: usize,
    deliveries_failed: usize,
    reconnect_required: usize,
}

pub struct Dispatcher {
    repository: Repository,
    curators: CuratorRegistry,
    reaper: Reaper,
    sage: Sage,
    herald: Herald,
    custodian: Custodian,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    config: DispatchConfig,
    offset: FixedOffset,
    base_url: String,
}

impl Dispatcher {
    pub fn new(
        repository: Repository,
        curators: CuratorRegistry,
        reaper: Reaper,
        sage: Sage,
        herald: Herald,
        config: DispatchConfig,
    ) -> Self {
        Self {
            custodian: Custodian::new(repository.clone()),
            repository,
            curators,
            reaper,
            sage,
            herald,
            refresher: None,
            config,
            offset: Utc.fix(),
            base_url: String::new(),
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Run one full cycle under the global deadline.
    pub async fn run_cycle(&self) -> Result<RunSummary> {
        match within(self.config.cycle_timeout(), self.cycle()).await {
            Timed::Completed(result) => result,
            Timed::TimedOut(limit) => {
                tracing::error!(timeout = ?limit, "dispatch cycle exceeded its deadline");
                Err(AppError::CycleTimeout(limit))
            }
        }
    }

    async fn cycle(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let alerts = self.repository.due_alerts(Utc::now()).await?;
        tracing::info!(count = alerts.len(), "due alerts selected");

        let mut summary = RunSummary {
            alerts_found: alerts.len(),
            ..RunSummary::default()
        };

        let outcomes: Vec<std::result::Result<AlertReport, StageError>> = stream::iter(alerts)
            .map(|alert| self.settle_alert(alert).boxed())
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            summary.processed += 1;
            match outcome {
                Ok(report) => {
                    summary.succeeded += 1;
                    summary.stories_filtered += report.stories_filtered;
                    summary.stories_sent += report.stories_sent;
                    summary.deliveries_attempted += report.deliveries_attempted;
                    summary.deliveries_failed += report.deliveries_failed;
                    summary.reconnect_required += report.reconnect_required;
                }
                Err(_) => summary.failed += 1,
            }
        }

        match within(self.config.custodian_timeout(), self.custodian.sweep()).await {
            Timed::Completed(Ok(counts)) => {
                summary.stories_cleaned = counts.stories;
                summary.subscriptions_cleaned = counts.subscriptions;
            }
            Timed::Completed(Err(e)) => tracing::warn!(error = %e, "custodian sweep failed"),
            Timed::TimedOut(limit) => tracing::warn!(timeout = ?limit, "custodian sweep timed out"),
        }

        if let Some(refresher) = &self.refresher {
            match within(self.config.maintenance_timeout(), refresher.refresh()).await {
                Timed::Completed(Ok(refreshed)) => summary.credentials_refreshed = refreshed,
                Timed::Completed(Err(e)) => tracing::warn!(error = %e, "credential refresh failed"),
                Timed::TimedOut(limit) => tracing::warn!(timeout = ?limit, "credential refresh timed out"),
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        log_summary(&summary);
        Ok(summary)
    }

    /// Run one alert under its deadline. On failure the alert is re-armed for
    /// its next slot without touching `last_run`.
    async fn settle_alert(&self, alert: Alert) -> std::result::Result<AlertReport, StageError> {
        let span = tracing::info_span!("alert", alert_id = alert.id);
        async move {
            let outcome = match within(self.config.alert_timeout(), self.process_alert(&alert)).await {
                Timed::Completed(outcome) => outcome,
                Timed::TimedOut(limit) => Err(StageError {
                    stage: Stage::Alert,
                    failure: StageFailure::TimedOut(limit),
                }),
            };

            if let Err(e) = &outcome {
                tracing::warn!(error = %e, timed_out = e.is_timeout(), "alert run failed");
                let next = schedule::next_run(&alert.wait, Utc::now(), self.offset);
                if let Err(e) = self.repository.update_alert_next_run(alert.id, next).await {
                    tracing::error!(error = %e, "could not re-arm failed alert");
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn process_alert(&self, alert: &Alert) -> std::result::Result<AlertReport, StageError> {
        let previous_run = alert.last_run;

        let urls = run_stage(
            Stage::Curator,
            self.config.curator_timeout(),
            self.curators.run(&alert.strategy),
        )
        .await?;
        tracing::debug!(urls = urls.len(), "curated");

        let contents = run_stage(Stage::Reaper, self.config.reaper_timeout(), self.reaper.run(&urls)).await?;
        let stories = run_stage(
            Stage::Sage,
            self.config.sage_timeout(),
            self.sage.run(alert, &contents),
        )
        .await?;

        let eligible = filter_deliverable(stories, previous_run);
        let mut report = AlertReport {
            stories_filtered: eligible.len(),
            ..AlertReport::default()
        };

        // Stamped after synthesis so that stories created during this run
        // are older than the next run's cutoff.
        let now = Utc::now();
        let next = schedule::next_run(&alert.wait, now, self.offset);
        self.repository
            .update_alert_schedule(alert.id, now, next)
            .await
            .map_err(|e| StageError::failed(Stage::Store, e))?;

        if !should_deliver(&alert.wait, eligible.len()) {
            tracing::debug!(eligible = eligible.len(), "not enough stories to deliver");
            return Ok(report);
        }

        let subscriptions = self
            .repository
            .subscriptions_for_alert(alert.id)
            .await
            .map_err(|e| StageError::failed(Stage::Store, e))?;
        let cadence = schedule::describe(&alert.wait);
        let readers = subscriptions.len();

        let stories = &eligible;
        let deliveries: Vec<PendingDelivery<'_>> = subscriptions
            .into_iter()
            .map(|subscription| {
                let ctx = DeliveryContext {
                    user_id: subscription.user_id,
                    cadence: cadence.clone(),
                    readers,
                    base_url: self.base_url.clone(),
                };
                async move {
                    let delivery = self
                        .herald
                        .deliver(subscription.channel_id.into(), &alert.name, stories, &ctx);
                    let outcome = within(self.config.delivery_timeout(), delivery).await;
                    (subscription.id, outcome)
                }
                .boxed()
            })
            .collect();

        let mut delivered = false;
        for (subscription_id, outcome) in join_all(deliveries).await {
            report.deliveries_attempted += 1;
            match outcome {
                Timed::Completed(Ok(())) => delivered = true,
                Timed::Completed(Err(e)) => {
                    report.deliveries_failed += 1;
                    if e.is_reconnect_required() {
                        report.reconnect_required += 1;
                    }
                    tracing::warn!(
                        subscription_id,
                        reconnect_required = e.is_reconnect_required(),
                        error = %e,
                        "delivery failed"
                    );
                }
                Timed::TimedOut(limit) => {
                    report.deliveries_failed += 1;
                    tracing::warn!(subscription_id, timeout = ?limit, "delivery timed out");
                }
            }
        }
        if delivered {
            report.stories_sent = eligible.len();
        }
        Ok(report)
    }
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        alerts_found = summary.alerts_found,
        processed = summary.processed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        stories_filtered = summary.stories_filtered,
        stories_sent = summary.stories_sent,
        deliveries_attempted = summary.deliveries_attempted,
        deliveries_failed = summary.deliveries_failed,
        reconnect_required = summary.reconnect_required,
        stories_cleaned = summary.stories_cleaned,
        subscriptions_cleaned = summary.subscriptions_cleaned,
        credentials_refreshed = summary.credentials_refreshed,
        elapsed_ms = summary.elapsed_ms,
        "dispatch cycle complete"
    );
}
