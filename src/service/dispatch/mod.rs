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

//! The dispatcher routes every incoming alert into aggregation groups and
//! drives one state machine per group: wait for `group_wait`, flush, then
//! flush every `group_interval` until only resolved alerts are left and the
//! group tears itself down.

use std::{sync::Arc, time::Duration};

use config::{
    meta::{
        alerts::{Alert, Fingerprint, LabelSet},
        routes::ReceiverConfig,
    },
    metrics,
    utils::time::{now_micros, seconds_micros},
};
use dashmap::DashMap;
use hashbrown::HashMap;
use infra::errors::{Error, Result};
use itertools::Itertools;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::service::{
    alerts::Alerts,
    notify::{Context, Pipeline, Stage},
    routes::{Route, RouteOpts},
};

/// A live aggregation group as reported by [`Dispatcher::groups`].
#[derive(Clone, Debug)]
pub struct GroupInfo {
    pub key: String,
    pub receiver: String,
    pub labels: LabelSet,
    pub alerts: Vec<Alert>,
}

struct GroupShared {
    key: String,
    receiver: ReceiverConfig,
    labels: LabelSet,
    alerts: RwLock<HashMap<Fingerprint, Alert>>,
}

struct GroupHandle {
    shared: Arc<GroupShared>,
    tx: mpsc::UnboundedSender<Alert>,
}

pub struct Dispatcher {
    route: Arc<Route>,
    receivers: HashMap<String, ReceiverConfig>,
    pipelines: HashMap<String, Arc<Pipeline>>,
    alerts: Arc<Alerts>,
    groups: Arc<DashMap<String, GroupHandle>>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        route: Arc<Route>,
        receivers: Vec<ReceiverConfig>,
        pipelines: HashMap<String, Arc<Pipeline>>,
        alerts: Arc<Alerts>,
    ) -> Result<Arc<Dispatcher>> {
        for name in route.receivers() {
            if !pipelines.contains_key(&name) {
                return Err(Error::Validation(format!(
                    "no pipeline for receiver {name:?}"
                )));
            }
        }
        Ok(Arc::new(Dispatcher {
            route,
            receivers: receivers.into_iter().map(|r| (r.name.clone(), r)).collect(),
            pipelines,
            alerts,
            groups: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
        }))
    }

    /// Consume the provider subscription until shut down. A severed
    /// subscription is re-established, replaying the snapshot.
    pub async fn run(self: Arc<Self>) {
        loop {
            let mut sub = match self.alerts.subscribe("dispatcher") {
                Ok(sub) => sub,
                Err(e) => {
                    log::error!("[DISPATCHER] cannot subscribe to alerts: {e}");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    alert = sub.recv() => {
                        match alert {
                            Some(alert) => self.dispatch(alert),
                            None => break,
                        }
                    }
                }
            }
            match sub.error() {
                Some(e) => log::error!("[DISPATCHER] subscription lost: {e}, resubscribing"),
                None => return, // provider shut down
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    fn dispatch(&self, alert: Alert) {
        let routes = self.route.matches(&alert.labels);
        if routes.is_empty() {
            log::debug!("[DISPATCHER] alert {} matches no route", alert.name());
            return;
        }
        for route in routes {
            let group_labels = route.group_labels(&alert.labels);
            let key = group_key(route.fingerprint(), &group_labels);
            if let Some(handle) = self.groups.get(&key) {
                if handle.tx.send(alert.clone()).is_ok() {
                    continue;
                }
                // the group tore itself down under us, rebuild it
                drop(handle);
                self.groups.remove(&key);
            }
            let Some(pipeline) = self.pipelines.get(&route.opts.receiver) else {
                log::error!(
                    "[DISPATCHER] no pipeline for receiver {:?}, dropping alert",
                    route.opts.receiver
                );
                continue;
            };
            let receiver = self
                .receivers
                .get(&route.opts.receiver)
                .cloned()
                .unwrap_or_else(|| ReceiverConfig {
                    name: route.opts.receiver.clone(),
                    ..Default::default()
                });

            let shared = Arc::new(GroupShared {
                key: key.clone(),
                receiver,
                labels: group_labels,
                alerts: RwLock::new(HashMap::new()),
            });
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(alert.clone());
            let stop = self.cancel.child_token();
            let handle = GroupHandle {
                shared: Arc::clone(&shared),
                tx: tx.clone(),
            };
            self.groups.insert(key.clone(), handle);
            metrics::DISPATCHER_GROUPS.set(self.groups.len() as i64);
            log::debug!("[DISPATCHER] created group {key}");

            let groups = Arc::clone(&self.groups);
            let opts = route.opts.clone();
            let pipeline = Arc::clone(pipeline);
            let resolve_retention = self.alerts.resolve_retention();
            let own_tx = tx;
            tokio::spawn(async move {
                run_group(shared, opts, pipeline, rx, stop, resolve_retention).await;
                // only drop our own entry; the key may have been rebuilt
                groups.remove_if(&key, |_, h| h.tx.same_channel(&own_tx));
                metrics::DISPATCHER_GROUPS.set(groups.len() as i64);
            });
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Current groups with their alerts, sorted by group key.
    pub fn groups(&self) -> Vec<GroupInfo> {
        let mut out: Vec<GroupInfo> = self
            .groups
            .iter()
            .map(|entry| {
                let shared = &entry.value().shared;
                let mut alerts: Vec<Alert> =
                    shared.alerts.read().values().cloned().collect();
                alerts.sort_by_key(|a| a.fingerprint());
                GroupInfo {
                    key: shared.key.clone(),
                    receiver: shared.receiver.name.clone(),
                    labels: shared.labels.clone(),
                    alerts,
                }
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Stop the run loop and all group tasks. In-flight flushes finish on
    /// their own pipeline; no new groups form afterwards.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

fn group_key(route_fp: u64, group_labels: &LabelSet) -> String {
    format!(
        "{route_fp:016x}:{{{}}}",
        group_labels
            .iter()
            .map(|(k, v)| format!("{k}={v:?}"))
            .join(",")
    )
}

async fn run_group(
    shared: Arc<GroupShared>,
    opts: RouteOpts,
    pipeline: Arc<Pipeline>,
    mut rx: mpsc::UnboundedReceiver<Alert>,
    stop: CancellationToken,
    resolve_retention: i64,
) {
    // collect alerts during the initial wait
    let wait = tokio::time::sleep(opts.group_wait);
    tokio::pin!(wait);
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = &mut wait => break,
            alert = rx.recv() => {
                match alert {
                    Some(alert) => insert(&shared, alert),
                    None => return,
                }
            }
        }
    }

    flush(&shared, &opts, &pipeline, &stop, resolve_retention).await;

    let mut interval = tokio::time::interval(opts.group_interval);
    interval.tick().await; // the first tick fires immediately
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            // a mid-interval alert joins the set but never resets the timer
            alert = rx.recv() => {
                match alert {
                    Some(alert) => insert(&shared, alert),
                    None => return,
                }
            }
            _ = interval.tick() => {
                let done = flush(&shared, &opts, &pipeline, &stop, resolve_retention).await;
                if done {
                    log::debug!("[DISPATCHER] group {} has fully resolved, removing", shared.key);
                    return;
                }
            }
        }
    }
}

fn insert(shared: &GroupShared, alert: Alert) {
    shared
        .alerts
        .write()
        .insert(alert.fingerprint(), alert);
}

/// One flush attempt. Returns true when the group is empty afterwards and
/// its task should end.
async fn flush(
    shared: &GroupShared,
    opts: &RouteOpts,
    pipeline: &Pipeline,
    stop: &CancellationToken,
    resolve_retention: i64,
) -> bool {
    let now = now_micros();
    let mut snapshot: Vec<Alert> = {
        let alerts = shared.alerts.read();
        alerts
            .values()
            .filter(|a| a.is_firing_at(now) || a.ends_at + resolve_retention > now)
            .cloned()
            .collect()
    };
    snapshot.sort_by_key(|a| a.fingerprint());

    if snapshot.is_empty() {
        return prune(shared, &[], now);
    }

    let ctx = Context {
        group_key: shared.key.clone(),
        group_labels: shared.labels.clone(),
        receiver: shared.receiver.clone(),
        repeat_interval: opts.repeat_interval,
        cancel: stop.child_token(),
    };

    let attempt = pipeline.exec(&ctx, snapshot.clone());
    let result = tokio::select! {
        res = tokio::time::timeout(opts.group_interval, attempt) => res,
        _ = stop.cancelled() => {
            ctx.cancel.cancel();
            log::debug!("[DISPATCHER] group {} flush cancelled by shutdown", shared.key);
            return false;
        }
    };

    match result {
        Ok(Ok(_)) => prune(shared, &snapshot, now),
        Ok(Err(e)) => {
            log::error!(
                "[DISPATCHER] group {} flush failed, next attempt on cadence: {e}",
                shared.key
            );
            false
        }
        Err(_elapsed) => {
            ctx.cancel.cancel();
            log::error!(
                "[DISPATCHER] group {} flush hit its deadline, next attempt on cadence",
                shared.key
            );
            false
        }
    }
}

/// Drop alerts that were resolved when this flush snapshotted them and have
/// not been touched since. Returns true when nothing is left.
fn prune(shared: &GroupShared, sent: &[Alert], flush_time: i64) -> bool {
    let mut alerts = shared.alerts.write();
    for alert in sent {
        if alert.is_resolved_at(flush_time) {
            let fp = alert.fingerprint();
            if alerts
                .get(&fp)
                .is_some_and(|current| current.updated_at == alert.updated_at)
            {
                alerts.remove(&fp);
            }
        }
    }
    // anything resolved far beyond retention is dead weight regardless
    let horizon = flush_time - seconds_micros(3600);
    alerts.retain(|_, a| a.is_firing_at(flush_time) || a.ends_at > horizon);
    alerts.is_empty()
}
