// Copyright 2025 Alertmesh Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! The notification pipeline. One pipeline per receiver, built from stages
//! sharing a single contract; a stage returning no alerts short-circuits the
//! rest. Stages hold no per-group state, the context carries everything a
//! flush needs.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use config::{
    meta::{
        alerts::{Alert, LabelSet, fingerprint_set_hash},
        routes::ReceiverConfig,
    },
    metrics,
    utils::time::now_micros,
};
use infra::{
    cluster::Peer,
    errors::{Error, Result},
};
use tokio_util::sync::CancellationToken;

use crate::service::{
    alerts::Alerts, inhibit::Inhibitor, nflog::Nflog, routes::Route, silences::Silences,
};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Per-flush context handed through the stages.
#[derive(Clone)]
pub struct Context {
    pub group_key: String,
    pub group_labels: LabelSet,
    pub receiver: ReceiverConfig,
    pub repeat_interval: Duration,
    pub cancel: CancellationToken,
}

/// Delivery contract. `Ok` means delivered; a transient error is retried
/// until the flush deadline, anything else fails the flush attempt.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, ctx: &Context, alerts: &[Alert]) -> Result<()>;
}

#[async_trait]
pub trait Stage: Send + Sync + 'static {
    async fn exec(&self, ctx: &Context, alerts: Vec<Alert>) -> Result<Vec<Alert>>;
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// The standard per-receiver pipeline in its fixed stage order.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        route: Arc<Route>,
        notifier: Arc<dyn Notifier>,
        alerts: Arc<Alerts>,
        silences: Arc<Silences>,
        inhibitor: Arc<Inhibitor>,
        nflog: Arc<Nflog>,
        peer: Arc<dyn Peer>,
        peer_timeout: Duration,
    ) -> Pipeline {
        Pipeline {
            stages: vec![
                Box::new(GcStage {
                    retention: alerts.resolve_retention(),
                }),
                Box::new(InhibitStage {
                    inhibitor,
                    alerts: Arc::clone(&alerts),
                }),
                Box::new(SilenceStage { silences, alerts }),
                Box::new(RouteStage { route }),
                Box::new(WaitStage {
                    peer: Arc::clone(&peer),
                    peer_timeout,
                }),
                Box::new(DedupStage {
                    nflog: Arc::clone(&nflog),
                }),
                Box::new(RetryStage { notifier }),
                Box::new(SetNotifiesStage { nflog }),
            ],
        }
    }

    pub fn from_stages(stages: Vec<Box<dyn Stage>>) -> Pipeline {
        Pipeline { stages }
    }
}

#[async_trait]
impl Stage for Pipeline {
    async fn exec(&self, ctx: &Context, mut alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        for stage in &self.stages {
            if alerts.is_empty() {
                break;
            }
            alerts = stage.exec(ctx, alerts).await?;
        }
        Ok(alerts)
    }
}

/// Drops alerts resolved for longer than the retention window; they are on
/// their way out of the provider and must not resurface in notifications.
struct GcStage {
    retention: i64,
}

#[async_trait]
impl Stage for GcStage {
    async fn exec(&self, _ctx: &Context, mut alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        let now = now_micros();
        alerts.retain(|a| a.is_firing_at(now) || a.ends_at + self.retention > now);
        Ok(alerts)
    }
}

struct InhibitStage {
    inhibitor: Arc<Inhibitor>,
    alerts: Arc<Alerts>,
}

#[async_trait]
impl Stage for InhibitStage {
    async fn exec(&self, _ctx: &Context, alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        let now = now_micros();
        let mut out = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let muted_by = self.inhibitor.mutes(&alert.labels, now);
            let muted = !muted_by.is_empty();
            self.alerts.set_inhibited(alert.fingerprint(), muted_by);
            if !muted {
                out.push(alert);
            }
        }
        Ok(out)
    }
}

struct SilenceStage {
    silences: Arc<Silences>,
    alerts: Arc<Alerts>,
}

#[async_trait]
impl Stage for SilenceStage {
    async fn exec(&self, _ctx: &Context, alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        let mut out = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let muted_by = self.silences.mutes(&alert.labels);
            let muted = !muted_by.is_empty();
            self.alerts.set_silenced(alert.fingerprint(), muted_by);
            if !muted {
                out.push(alert);
            }
        }
        Ok(out)
    }
}

/// Drops alerts that no longer route to this receiver, for instance after
/// their labels were merged into a different shape than when grouped.
struct RouteStage {
    route: Arc<Route>,
}

#[async_trait]
impl Stage for RouteStage {
    async fn exec(&self, ctx: &Context, mut alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        alerts.retain(|a| {
            self.route
                .matches(&a.labels)
                .iter()
                .any(|r| r.opts.receiver == ctx.receiver.name)
        });
        Ok(alerts)
    }
}

/// Every peer runs the same pipeline; holding back in proportion to our
/// position lets the first peer notify and the rest observe its log entry.
struct WaitStage {
    peer: Arc<dyn Peer>,
    peer_timeout: Duration,
}

#[async_trait]
impl Stage for WaitStage {
    async fn exec(&self, ctx: &Context, alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        let position = self.peer.position().await;
        if position == 0 {
            return Ok(alerts);
        }
        let wait = self.peer_timeout * position as u32;
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                Err(Error::Permanent(format!(
                    "flush cancelled while waiting for {position} peers"
                )))
            }
            _ = tokio::time::sleep(wait) => Ok(alerts),
        }
    }
}

/// Suppresses notifications some peer already sent, and resolved-only
/// notifications the receiver does not want.
struct DedupStage {
    nflog: Arc<Nflog>,
}

#[async_trait]
impl Stage for DedupStage {
    async fn exec(&self, ctx: &Context, alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        let now = now_micros();
        let (firing_hash, resolved_hash, firing_count) = flush_hashes(&alerts, now);

        if firing_count == 0 && !ctx.receiver.send_resolved {
            return Ok(Vec::new());
        }

        let repeat = ctx.repeat_interval.as_micros() as i64;
        let entries = self.nflog.query(&ctx.group_key, &ctx.receiver.name);
        let duplicate = entries.values().any(|e| {
            e.firing_hash == firing_hash
                && e.resolved_hash == resolved_hash
                && e.timestamp + repeat > now
        });
        if duplicate {
            log::debug!(
                "[NOTIFY] suppressing unchanged notification for {} -> {}",
                ctx.group_key,
                ctx.receiver.name
            );
            return Ok(Vec::new());
        }
        Ok(alerts)
    }
}

/// Calls the notifier, retrying transient failures with exponential backoff
/// until the flush deadline cancels the attempt.
struct RetryStage {
    notifier: Arc<dyn Notifier>,
}

#[async_trait]
impl Stage for RetryStage {
    async fn exec(&self, ctx: &Context, alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started = std::time::Instant::now();
            match self.notifier.notify(ctx, &alerts).await {
                Ok(()) => {
                    metrics::NOTIFICATIONS_TOTAL
                        .with_label_values(&[ctx.receiver.name.as_str(), "success"])
                        .inc();
                    metrics::NOTIFICATION_LATENCY_SECONDS
                        .with_label_values(&[ctx.receiver.name.as_str()])
                        .observe(started.elapsed().as_secs_f64());
                    return Ok(alerts);
                }
                Err(e) if e.is_transient() && !ctx.cancel.is_cancelled() => {
                    log::warn!(
                        "[NOTIFY] receiver {} attempt {attempt} failed, retrying in {delay:?}: {e}",
                        ctx.receiver.name
                    );
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => {
                            metrics::NOTIFICATIONS_TOTAL
                                .with_label_values(&[ctx.receiver.name.as_str(), "failed"])
                                .inc();
                            return Err(Error::Permanent(format!(
                                "flush deadline reached after {attempt} attempts, last error: {e}"
                            )));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = (delay * 2).min(RETRY_MAX_DELAY);
                }
                Err(e) => {
                    metrics::NOTIFICATIONS_TOTAL
                        .with_label_values(&[ctx.receiver.name.as_str(), "failed"])
                        .inc();
                    return Err(Error::Permanent(format!(
                        "receiver {} failed permanently: {e}",
                        ctx.receiver.name
                    )));
                }
            }
        }
    }
}

/// Records the successful delivery so other peers and later flushes dedup
/// against it.
struct SetNotifiesStage {
    nflog: Arc<Nflog>,
}

#[async_trait]
impl Stage for SetNotifiesStage {
    async fn exec(&self, ctx: &Context, alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        let (firing_hash, resolved_hash, _) = flush_hashes(&alerts, now_micros());
        self.nflog
            .log(&ctx.group_key, &ctx.receiver.name, firing_hash, resolved_hash)
            .await?;
        Ok(alerts)
    }
}

/// Hashes identifying exactly which alerts were firing and which resolved
/// at flush time.
pub fn flush_hashes(alerts: &[Alert], now: i64) -> (u64, u64, usize) {
    let firing: Vec<u64> = alerts
        .iter()
        .filter(|a| a.is_firing_at(now))
        .map(|a| a.fingerprint())
        .collect();
    let resolved: Vec<u64> = alerts
        .iter()
        .filter(|a| a.is_resolved_at(now))
        .map(|a| a.fingerprint())
        .collect();
    (
        fingerprint_set_hash(&firing),
        fingerprint_set_hash(&resolved),
        firing.len(),
    )
}

/// A notifier that only logs, the default wiring for smoke tests and dry
/// runs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, ctx: &Context, alerts: &[Alert]) -> Result<()> {
        log::info!(
            "[NOTIFY] receiver {} group {} would deliver {} alerts",
            ctx.receiver.name,
            ctx.group_key,
            alerts.len()
        );
        Ok(())
    }
}
