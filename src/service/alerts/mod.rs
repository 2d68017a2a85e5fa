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

//! The in-memory alert provider. Producers put alerts, the dispatcher and
//! inhibitor subscribe, and a background sweep drops alerts that have been
//! resolved for longer than the retention window.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use config::{
    get_config,
    meta::{
        alerts::{Alert, AlertStatus, Fingerprint, fingerprint},
        matchers::CompiledMatchers,
    },
    metrics,
    utils::time::{now_micros, seconds_micros},
};
use hashbrown::HashMap;
use infra::errors::{Error, Result};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct AlertsOptions {
    /// Synthesized end time for alerts that arrive without one, micros.
    pub resolve_timeout: i64,
    /// How long resolved alerts are kept before the sweep drops them, micros.
    pub resolve_retention: i64,
    pub gc_interval: Duration,
    pub subscriber_queue_capacity: usize,
}

impl Default for AlertsOptions {
    fn default() -> Self {
        let cfg = get_config();
        AlertsOptions {
            resolve_timeout: seconds_micros(cfg.alerts.resolve_timeout),
            resolve_retention: seconds_micros(cfg.alerts.resolve_retention),
            gc_interval: Duration::from_secs(cfg.alerts.gc_interval as u64),
            subscriber_queue_capacity: cfg.limit.subscriber_queue_capacity,
        }
    }
}

struct Subscriber {
    name: String,
    tx: mpsc::Sender<Alert>,
    overflowed: Arc<AtomicBool>,
}

/// Handed out by [`Alerts::subscribe`]. The receiver first drains a snapshot
/// of the current alerts, then every subsequent insert or merge. When the
/// channel closes, [`AlertSubscription::error`] tells overflow apart from a
/// normal shutdown.
pub struct AlertSubscription {
    pub name: String,
    rx: mpsc::Receiver<Alert>,
    overflowed: Arc<AtomicBool>,
}

impl AlertSubscription {
    pub async fn recv(&mut self) -> Option<Alert> {
        self.rx.recv().await
    }

    pub fn error(&self) -> Option<Error> {
        if self.overflowed.load(Ordering::SeqCst) {
            Some(Error::Overflow(self.name.clone()))
        } else {
            None
        }
    }
}

#[derive(Default)]
struct Inner {
    alerts: HashMap<Fingerprint, Alert>,
    statuses: HashMap<Fingerprint, AlertStatus>,
    subscribers: Vec<Subscriber>,
    closed: bool,
}

pub struct Alerts {
    opts: AlertsOptions,
    inner: RwLock<Inner>,
}

/// Filters applied by [`Alerts::query`]. The receiver filter lives a level
/// up, where the routing tree is known.
#[derive(Clone, Debug, Default)]
pub struct AlertQuery {
    pub matchers: Vec<config::meta::matchers::Matcher>,
    pub silenced: Option<bool>,
    pub inhibited: Option<bool>,
}

impl Alerts {
    pub fn new(opts: AlertsOptions) -> Arc<Alerts> {
        Arc::new(Alerts {
            opts,
            inner: RwLock::new(Inner::default()),
        })
    }

    pub fn resolve_retention(&self) -> i64 {
        self.opts.resolve_retention
    }

    /// Insert or merge a batch of alerts. Invalid alerts are reported in the
    /// returned list while the valid remainder still lands; a closed store
    /// rejects the whole call.
    pub fn put(&self, alerts: Vec<Alert>) -> Result<Vec<Error>> {
        let now = now_micros();
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Error::Message("alert store is shut down".to_string()));
        }

        let mut rejected = Vec::new();
        for mut alert in alerts {
            if let Err(e) = alert.validate() {
                metrics::ALERTS_RECEIVED_TOTAL
                    .with_label_values(&["invalid"])
                    .inc();
                rejected.push(Error::Validation(format!(
                    "invalid alert {}: {e}",
                    alert.name()
                )));
                continue;
            }
            metrics::ALERTS_RECEIVED_TOTAL
                .with_label_values(&["valid"])
                .inc();

            if alert.starts_at == 0 {
                // an already-resolved alert starts no later than it ended
                alert.starts_at = if alert.ends_at != 0 && alert.ends_at < now {
                    alert.ends_at
                } else {
                    now
                };
            }
            if alert.ends_at == 0 {
                alert.ends_at = now + self.opts.resolve_timeout;
                alert.timeout = true;
            } else {
                alert.timeout = false;
            }
            alert.updated_at = now;

            let fp = alert.fingerprint();
            let merged = match inner.alerts.get(&fp) {
                Some(existing) => existing.merge(&alert, now),
                None => alert,
            };
            inner.alerts.insert(fp, merged.clone());

            // fan out without ever blocking the producer
            let mut severed = Vec::new();
            for (idx, sub) in inner.subscribers.iter().enumerate() {
                match sub.tx.try_send(merged.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        sub.overflowed.store(true, Ordering::SeqCst);
                        metrics::SUBSCRIBER_OVERFLOW_TOTAL
                            .with_label_values(&[sub.name.as_str()])
                            .inc();
                        log::error!(
                            "[ALERTS] subscriber {} overflowed, closing its subscription",
                            sub.name
                        );
                        severed.push(idx);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => severed.push(idx),
                }
            }
            for idx in severed.into_iter().rev() {
                inner.subscribers.remove(idx);
            }
        }

        metrics::ALERTS_ACTIVE.set(inner.alerts.len() as i64);
        Ok(rejected)
    }

    pub fn get(&self, fp: Fingerprint) -> Option<Alert> {
        self.inner.read().alerts.get(&fp).cloned()
    }

    /// All alerts, sorted by fingerprint.
    pub fn list(&self) -> Vec<Alert> {
        let inner = self.inner.read();
        let mut out: Vec<Alert> = inner.alerts.values().cloned().collect();
        out.sort_by_key(|a| a.fingerprint());
        out
    }

    pub fn status(&self, fp: Fingerprint) -> AlertStatus {
        self.inner.read().statuses.get(&fp).cloned().unwrap_or_default()
    }

    pub fn set_silenced(&self, fp: Fingerprint, ids: Vec<String>) {
        let mut inner = self.inner.write();
        inner.statuses.entry(fp).or_default().set_silenced(ids);
    }

    pub fn set_inhibited(&self, fp: Fingerprint, ids: Vec<String>) {
        let mut inner = self.inner.write();
        inner.statuses.entry(fp).or_default().set_inhibited(ids);
    }

    /// Alerts with their suppression status, filtered and sorted by
    /// fingerprint.
    pub fn query(&self, q: &AlertQuery) -> Result<Vec<(Alert, AlertStatus)>> {
        let matchers = CompiledMatchers::compile(&q.matchers)
            .map_err(|e| Error::Validation(e.to_string()))?;
        let inner = self.inner.read();
        let mut out = Vec::new();
        for (fp, alert) in inner.alerts.iter() {
            if !matchers.is_empty() && !matchers.matches(&alert.labels) {
                continue;
            }
            let status = inner.statuses.get(fp).cloned().unwrap_or_default();
            if let Some(want) = q.silenced
                && want != !status.silenced_by.is_empty()
            {
                continue;
            }
            if let Some(want) = q.inhibited
                && want != !status.inhibited_by.is_empty()
            {
                continue;
            }
            out.push((alert.clone(), status));
        }
        out.sort_by_key(|(a, _)| a.fingerprint());
        Ok(out)
    }

    /// Register a subscriber. The snapshot of current alerts is preloaded
    /// into the queue so the receiver observes full state before updates.
    pub fn subscribe(&self, name: &str) -> Result<AlertSubscription> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Error::Message("alert store is shut down".to_string()));
        }
        let snapshot: Vec<Alert> = inner.alerts.values().cloned().collect();
        let capacity = self
            .opts
            .subscriber_queue_capacity
            .max(snapshot.len() + self.opts.subscriber_queue_capacity);
        let (tx, rx) = mpsc::channel(capacity);
        for alert in snapshot {
            // capacity is sized above, this cannot fail
            let _ = tx.try_send(alert);
        }
        let overflowed = Arc::new(AtomicBool::new(false));
        inner.subscribers.push(Subscriber {
            name: name.to_string(),
            tx,
            overflowed: Arc::clone(&overflowed),
        });
        Ok(AlertSubscription {
            name: name.to_string(),
            rx,
            overflowed,
        })
    }

    /// Drop alerts that have been resolved for longer than the retention
    /// window. Returns the removed fingerprints.
    pub fn gc(&self) -> Vec<Fingerprint> {
        let now = now_micros();
        let horizon = self.opts.resolve_retention;
        let mut inner = self.inner.write();
        let doomed: Vec<Fingerprint> = inner
            .alerts
            .iter()
            .filter(|(_, a)| a.is_resolved_at(now) && a.ends_at + horizon < now)
            .map(|(fp, _)| *fp)
            .collect();
        for fp in &doomed {
            inner.alerts.remove(fp);
            inner.statuses.remove(fp);
        }
        metrics::ALERTS_ACTIVE.set(inner.alerts.len() as i64);
        doomed
    }

    pub fn close(&self) {
        let mut inner = self.inner.write();
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub async fn run_gc(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.opts.gc_interval);
        interval.tick().await; // trigger the first run
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = self.gc();
                    if !removed.is_empty() {
                        log::debug!("[ALERTS] gc removed {} resolved alerts", removed.len());
                    }
                }
            }
        }
    }
}

pub fn labels_from(pairs: &[(&str, &str)]) -> config::meta::alerts::LabelSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Fingerprint helper for call sites that only hold labels.
pub fn fingerprint_of(pairs: &[(&str, &str)]) -> Fingerprint {
    fingerprint(&labels_from(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(pairs: &[(&str, &str)]) -> Alert {
        Alert {
            labels: labels_from(pairs),
            ..Default::default()
        }
    }

    fn store() -> Arc<Alerts> {
        Alerts::new(AlertsOptions {
            resolve_timeout: seconds_micros(300),
            resolve_retention: seconds_micros(300),
            gc_interval: Duration::from_secs(1800),
            subscriber_queue_capacity: 16,
        })
    }

    #[test]
    fn test_put_synthesizes_end_time() {
        let alerts = store();
        let errs = alerts.put(vec![alert(&[("alertname", "a")])]).unwrap();
        assert!(errs.is_empty());

        let got = alerts.get(fingerprint_of(&[("alertname", "a")])).unwrap();
        assert!(got.timeout);
        assert!(got.ends_at > now_micros());
        assert!(got.starts_at > 0);
    }

    #[test]
    fn test_put_explicit_end_clears_timeout() {
        let alerts = store();
        let now = now_micros();
        let mut a = alert(&[("alertname", "a")]);
        a.ends_at = now + seconds_micros(60);
        alerts.put(vec![a]).unwrap();
        let got = alerts.get(fingerprint_of(&[("alertname", "a")])).unwrap();
        assert!(!got.timeout);
        assert_eq!(got.ends_at, now + seconds_micros(60));
    }

    #[test]
    fn test_put_is_idempotent() {
        let alerts = store();
        let now = now_micros();
        let mut a = alert(&[("alertname", "a")]);
        a.starts_at = now - seconds_micros(60);
        a.ends_at = now + seconds_micros(60);

        alerts.put(vec![a.clone()]).unwrap();
        let first = alerts.get(a.fingerprint()).unwrap();
        alerts.put(vec![a.clone()]).unwrap();
        let second = alerts.get(a.fingerprint()).unwrap();

        assert_eq!(first.starts_at, second.starts_at);
        assert_eq!(first.ends_at, second.ends_at);
        assert_eq!(first.labels, second.labels);
        assert_eq!(alerts.list().len(), 1);
    }

    #[test]
    fn test_put_reports_invalid_but_keeps_valid() {
        let alerts = store();
        let bad = Alert::default();
        let errs = alerts
            .put(vec![bad, alert(&[("alertname", "ok")])])
            .unwrap();
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0], Error::Validation(_)));
        assert_eq!(alerts.list().len(), 1);
    }

    #[test]
    fn test_merge_symmetry_through_store() {
        let now = now_micros();
        let minute = seconds_micros(60);
        let mut a = alert(&[("alertname", "x")]);
        a.starts_at = now - 2 * minute;
        a.ends_at = now + 2 * minute;
        let mut b = alert(&[("alertname", "x")]);
        b.starts_at = now - minute;
        b.ends_at = now + 3 * minute;

        let s1 = store();
        s1.put(vec![a.clone()]).unwrap();
        s1.put(vec![b.clone()]).unwrap();
        let r1 = s1.get(a.fingerprint()).unwrap();

        let s2 = store();
        s2.put(vec![b]).unwrap();
        s2.put(vec![a.clone()]).unwrap();
        let r2 = s2.get(a.fingerprint()).unwrap();

        assert_eq!(r1.starts_at, r2.starts_at);
        assert_eq!(r1.ends_at, r2.ends_at);
        assert_eq!(r1.starts_at, now - 2 * minute);
        assert_eq!(r1.ends_at, now + 3 * minute);
    }

    #[tokio::test]
    async fn test_subscribe_snapshot_then_updates() {
        let alerts = store();
        alerts.put(vec![alert(&[("alertname", "early")])]).unwrap();

        let mut sub = alerts.subscribe("test").unwrap();
        let first = sub.recv().await.unwrap();
        assert_eq!(first.name(), "early");

        alerts.put(vec![alert(&[("alertname", "late")])]).unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(second.name(), "late");
        assert!(sub.error().is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_severed_not_blocking() {
        let alerts = Alerts::new(AlertsOptions {
            resolve_timeout: seconds_micros(300),
            resolve_retention: seconds_micros(300),
            gc_interval: Duration::from_secs(1800),
            subscriber_queue_capacity: 1,
        });
        let sub = alerts.subscribe("slow").unwrap();

        // the queue holds one update; the second one overflows
        alerts.put(vec![alert(&[("alertname", "a")])]).unwrap();
        alerts.put(vec![alert(&[("alertname", "b")])]).unwrap();

        assert!(sub.error().is_some());
        assert_eq!(alerts.list().len(), 2);
    }

    #[test]
    fn test_gc_drops_long_resolved() {
        let alerts = store();
        let now = now_micros();
        let mut resolved = alert(&[("alertname", "old")]);
        resolved.starts_at = now - seconds_micros(3600);
        resolved.ends_at = now - seconds_micros(600);
        let mut firing = alert(&[("alertname", "live")]);
        firing.ends_at = now + seconds_micros(600);
        alerts.put(vec![resolved, firing]).unwrap();

        let removed = alerts.gc();
        assert_eq!(removed.len(), 1);
        let left = alerts.list();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].name(), "live");
    }

    #[test]
    fn test_put_fails_atomically_after_close() {
        let alerts = store();
        alerts.close();
        assert!(alerts.put(vec![alert(&[("alertname", "a")])]).is_err());
        assert!(alerts.list().is_empty());
    }

    #[test]
    fn test_query_by_matcher_and_status() {
        let alerts = store();
        alerts
            .put(vec![
                alert(&[("alertname", "a"), ("job", "api")]),
                alert(&[("alertname", "b"), ("job", "db")]),
            ])
            .unwrap();
        let fp = fingerprint_of(&[("alertname", "a"), ("job", "api")]);
        alerts.set_silenced(fp, vec!["sil-1".to_string()]);

        let q = AlertQuery {
            matchers: vec![config::meta::matchers::Matcher::equal("job", "api")],
            ..Default::default()
        };
        let res = alerts.query(&q).unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].1.silenced_by, vec!["sil-1".to_string()]);

        let q = AlertQuery {
            silenced: Some(false),
            ..Default::default()
        };
        let res = alerts.query(&q).unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].0.name(), "b");
    }
}
