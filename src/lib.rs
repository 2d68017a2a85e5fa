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

//! alertmesh is a clustered alert-management engine. Producers put alerts
//! into the provider; the dispatcher groups them by route and drives each
//! group through a notification pipeline that honours silences, inhibition
//! rules, and what other peers in the gossip mesh already sent.
//!
//! The API surface, receiver transports and process scaffolding live
//! elsewhere; this crate is the engine they call into, via [`Engine`].

pub mod job;
pub mod service;

use std::{collections::HashMap as StdHashMap, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use config::{get_config, meta::routes::AlertingConfig};
use hashbrown::HashMap;
use infra::{
    cluster::Peer,
    errors::{Error, Result},
};
use parking_lot::Mutex;
use regex::Regex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::service::{
    alerts::{AlertQuery, Alerts, AlertsOptions},
    dispatch::{Dispatcher, GroupInfo},
    inhibit::Inhibitor,
    nflog::{Nflog, NflogOptions},
    notify::{Notifier, Pipeline},
    routes::Route,
    silences::{Silences, SilencesOptions},
};

/// Everything tunable at engine construction. `Default` pulls from the
/// process configuration.
#[derive(Clone, Debug, Default)]
pub struct EngineOptions {
    pub alerts: AlertsOptions,
    pub silences: SilencesOptions,
    pub nflog: NflogOptions,
    pub peer_timeout: Option<Duration>,
    pub settle_timeout: Option<Duration>,
}

/// The process-wide engine: owns the stores, the dispatcher and every
/// background task, with an explicit start/stop lifecycle.
pub struct Engine {
    pub alerts: Arc<Alerts>,
    pub silences: Arc<Silences>,
    pub nflog: Arc<Nflog>,
    pub peer: Arc<dyn Peer>,
    inhibitor: Arc<Inhibitor>,
    dispatcher: ArcSwap<Dispatcher>,
    notifiers: Mutex<StdHashMap<String, Arc<dyn Notifier>>>,
    opts: EngineOptions,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Bring the engine up: load snapshots, join the mesh, wait for state to
    /// settle, then start dispatching. Every receiver named in the config
    /// needs a notifier registered under the same name.
    pub async fn init(
        cfg: AlertingConfig,
        notifiers: StdHashMap<String, Arc<dyn Notifier>>,
        peer: Arc<dyn Peer>,
        opts: EngineOptions,
    ) -> Result<Arc<Engine>> {
        let route = Arc::new(Route::compile(&cfg)?);
        for name in route.receivers() {
            if !notifiers.contains_key(&name) {
                return Err(Error::Validation(format!(
                    "no notifier registered for receiver {name:?}"
                )));
            }
        }

        let cancel = CancellationToken::new();
        let alerts = Alerts::new(opts.alerts.clone());
        let silences = Silences::new(opts.silences.clone(), Arc::clone(&peer));
        let nflog = Nflog::new(opts.nflog.clone(), Arc::clone(&peer));
        let inhibitor = Inhibitor::new(&cfg.inhibit_rules)?;

        // prime local state before anything is allowed to send
        silences.load().await?;
        nflog.load().await?;

        let mut tasks = vec![
            job::spawn_alerts_gc(Arc::clone(&alerts), cancel.child_token()),
            job::spawn_silences_maintenance(Arc::clone(&silences), cancel.child_token()),
            job::spawn_silences_gossip(Arc::clone(&silences), cancel.child_token()),
            job::spawn_nflog_maintenance(Arc::clone(&nflog), cancel.child_token()),
            job::spawn_nflog_gossip(Arc::clone(&nflog), cancel.child_token()),
        ];
        tasks.push(job::spawn_inhibitor_feed(
            Arc::clone(&inhibitor),
            &alerts,
            cancel.child_token(),
        )?);

        let settle = opts.settle_timeout.unwrap_or_else(|| {
            Duration::from_secs(get_config().cluster.settle_timeout as u64)
        });
        peer.wait_ready(settle).await?;

        let dispatcher = build_dispatcher(
            &cfg,
            Arc::clone(&route),
            &notifiers,
            &alerts,
            &silences,
            &inhibitor,
            &nflog,
            &peer,
            &opts,
        )?;
        tasks.push(tokio::spawn(Arc::clone(&dispatcher).run()));

        log::info!(
            "[ENGINE] started as peer {} with {} receivers",
            peer.name(),
            cfg.receivers.len()
        );

        Ok(Arc::new(Engine {
            alerts,
            silences,
            nflog,
            peer,
            inhibitor,
            dispatcher: ArcSwap::from(dispatcher),
            notifiers: Mutex::new(notifiers),
            opts,
            cancel,
            tasks: Mutex::new(tasks),
        }))
    }

    /// Install a new alerting configuration. The new routing tree and
    /// pipelines take over; old groups finish their in-flight flush on the
    /// previous generation and are rebuilt from the provider snapshot.
    pub async fn reload(&self, cfg: AlertingConfig) -> Result<()> {
        let route = Arc::new(Route::compile(&cfg)?);
        let notifiers = self.notifiers.lock().clone();
        for name in route.receivers() {
            if !notifiers.contains_key(&name) {
                return Err(Error::Validation(format!(
                    "no notifier registered for receiver {name:?}"
                )));
            }
        }
        let dispatcher = build_dispatcher(
            &cfg,
            route,
            &notifiers,
            &self.alerts,
            &self.silences,
            &self.inhibitor,
            &self.nflog,
            &self.peer,
            &self.opts,
        )?;

        let old = self.dispatcher.swap(Arc::clone(&dispatcher));
        old.stop();
        self.tasks
            .lock()
            .push(tokio::spawn(Arc::clone(&dispatcher).run()));
        log::info!("[ENGINE] configuration reloaded");
        Ok(())
    }

    /// Alerts with status, optionally narrowed to receivers matching the
    /// given anchored regex, sorted by fingerprint.
    pub fn query_alerts(
        &self,
        query: &AlertQuery,
        receiver_re: Option<&str>,
    ) -> Result<Vec<(config::meta::alerts::Alert, config::meta::alerts::AlertStatus)>> {
        let mut out = self.alerts.query(query)?;
        if let Some(pattern) = receiver_re {
            let re = Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| Error::Validation(format!("invalid receiver regex: {e}")))?;
            let dispatcher = self.dispatcher.load();
            out.retain(|(alert, _)| {
                dispatcher
                    .route()
                    .matches(&alert.labels)
                    .iter()
                    .any(|r| re.is_match(&r.opts.receiver))
            });
        }
        Ok(out)
    }

    pub fn groups(&self) -> Vec<GroupInfo> {
        self.dispatcher.load().groups()
    }

    /// Stop every task, snapshot the replicated stores and leave the mesh.
    pub async fn stop(&self) {
        log::info!("[ENGINE] stopping");
        self.cancel.cancel();
        self.dispatcher.load().stop();
        self.alerts.close();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .is_err()
            {
                log::warn!("[ENGINE] a background task did not stop in time");
            }
        }

        if let Err(e) = self.silences.snapshot().await {
            log::error!("[ENGINE] final silences snapshot failed: {e}");
        }
        if let Err(e) = self.nflog.snapshot().await {
            log::error!("[ENGINE] final nflog snapshot failed: {e}");
        }
        self.peer.shutdown().await;
        log::info!("[ENGINE] stopped");
    }
}

#[allow(clippy::too_many_arguments)]
fn build_dispatcher(
    cfg: &AlertingConfig,
    route: Arc<Route>,
    notifiers: &StdHashMap<String, Arc<dyn Notifier>>,
    alerts: &Arc<Alerts>,
    silences: &Arc<Silences>,
    inhibitor: &Arc<Inhibitor>,
    nflog: &Arc<Nflog>,
    peer: &Arc<dyn Peer>,
    opts: &EngineOptions,
) -> Result<Arc<Dispatcher>> {
    let peer_timeout = opts
        .peer_timeout
        .unwrap_or_else(|| Duration::from_secs(get_config().cluster.peer_timeout as u64));

    let mut pipelines = HashMap::new();
    for receiver in &cfg.receivers {
        let Some(notifier) = notifiers.get(&receiver.name) else {
            continue;
        };
        pipelines.insert(
            receiver.name.clone(),
            Arc::new(Pipeline::build(
                Arc::clone(&route),
                Arc::clone(notifier),
                Arc::clone(alerts),
                Arc::clone(silences),
                Arc::clone(inhibitor),
                Arc::clone(nflog),
                Arc::clone(peer),
                peer_timeout,
            )),
        );
    }

    Dispatcher::new(route, cfg.receivers.clone(), pipelines, Arc::clone(alerts))
}
