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

//! Inhibition: a firing source alert mutes target alerts that agree with it
//! on the configured equality labels. Each rule keeps an index from the
//! equality tuple to the firing source alerts behind it, fed from a provider
//! subscription.

use std::{sync::Arc, time::Duration};

use config::meta::{
    alerts::{Alert, Fingerprint, LabelSet, fingerprint},
    matchers::CompiledMatchers,
    routes::InhibitRuleConfig,
};
use hashbrown::HashMap;
use infra::errors::{Error, Result};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::service::alerts::AlertSubscription;

const GC_INTERVAL: Duration = Duration::from_secs(300);

struct InhibitRule {
    source: CompiledMatchers,
    target: CompiledMatchers,
    equal: Vec<String>,
    /// equality tuple -> firing source alerts (fingerprint -> ends_at)
    index: RwLock<HashMap<Vec<String>, HashMap<Fingerprint, i64>>>,
}

impl InhibitRule {
    fn equal_tuple(&self, labels: &LabelSet) -> Vec<String> {
        self.equal
            .iter()
            .map(|name| labels.get(name).cloned().unwrap_or_default())
            .collect()
    }

    fn observe(&self, alert: &Alert, now: i64) {
        if !self.source.matches(&alert.labels) {
            return;
        }
        let tuple = self.equal_tuple(&alert.labels);
        let fp = alert.fingerprint();
        let mut index = self.index.write();
        if alert.is_firing_at(now) {
            index.entry(tuple).or_default().insert(fp, alert.ends_at);
        } else if let Some(sources) = index.get_mut(&tuple) {
            sources.remove(&fp);
            if sources.is_empty() {
                index.remove(&tuple);
            }
        }
    }

    /// Source fingerprints muting this label set right now.
    fn muting_sources(&self, labels: &LabelSet, now: i64) -> Vec<Fingerprint> {
        if !self.target.matches(labels) {
            return Vec::new();
        }
        let target_fp = fingerprint(labels);
        let tuple = self.equal_tuple(labels);
        let index = self.index.read();
        let Some(sources) = index.get(&tuple) else {
            return Vec::new();
        };
        sources
            .iter()
            .filter(|(fp, ends_at)| **fp != target_fp && (**ends_at == 0 || **ends_at > now))
            .map(|(fp, _)| *fp)
            .collect()
    }

    fn gc(&self, now: i64) {
        let mut index = self.index.write();
        index.retain(|_, sources| {
            sources.retain(|_, ends_at| *ends_at == 0 || *ends_at > now);
            !sources.is_empty()
        });
    }
}

pub struct Inhibitor {
    rules: Vec<InhibitRule>,
}

impl Inhibitor {
    pub fn new(rules: &[InhibitRuleConfig]) -> Result<Arc<Inhibitor>> {
        let rules = rules
            .iter()
            .map(|cfg| {
                Ok(InhibitRule {
                    source: CompiledMatchers::compile(&cfg.source_matchers)
                        .map_err(|e| Error::Validation(e.to_string()))?,
                    target: CompiledMatchers::compile(&cfg.target_matchers)
                        .map_err(|e| Error::Validation(e.to_string()))?,
                    equal: cfg.equal.clone(),
                    index: RwLock::new(HashMap::new()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Inhibitor { rules }))
    }

    /// Account one alert observation across every rule it is a source for.
    pub fn observe(&self, alert: &Alert, now: i64) {
        for rule in &self.rules {
            rule.observe(alert, now);
        }
    }

    /// The source fingerprints muting this label set, formatted for status
    /// stamping. Empty means not inhibited.
    pub fn mutes(&self, labels: &LabelSet, now: i64) -> Vec<String> {
        let mut out: Vec<String> = self
            .rules
            .iter()
            .flat_map(|rule| rule.muting_sources(labels, now))
            .map(|fp| format!("{fp:016x}"))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn gc(&self, now: i64) {
        for rule in &self.rules {
            rule.gc(now);
        }
    }

    /// Drive the index from a provider subscription until cancelled.
    pub async fn run(
        self: Arc<Self>,
        mut sub: AlertSubscription,
        cancel: CancellationToken,
    ) {
        let mut gc_tick = tokio::time::interval(GC_INTERVAL);
        gc_tick.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = gc_tick.tick() => {
                    self.gc(config::utils::time::now_micros());
                }
                alert = sub.recv() => {
                    match alert {
                        Some(alert) => {
                            self.observe(&alert, config::utils::time::now_micros());
                        }
                        None => {
                            if let Some(e) = sub.error() {
                                log::error!("[INHIBITOR] feed lost: {e}");
                            }
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use config::{meta::matchers::Matcher, utils::time::now_micros};

    use super::*;
    use crate::service::alerts::labels_from;

    fn rule() -> Arc<Inhibitor> {
        Inhibitor::new(&[InhibitRuleConfig {
            source_matchers: vec![Matcher::equal("alertname", "JobDown")],
            target_matchers: vec![Matcher::equal("alertname", "InstanceDown")],
            equal: vec!["job".to_string(), "zone".to_string()],
        }])
        .unwrap()
    }

    fn firing(pairs: &[(&str, &str)], now: i64) -> Alert {
        Alert {
            labels: labels_from(pairs),
            starts_at: now - 1_000_000,
            ends_at: now + 60_000_000,
            updated_at: now,
            ..Default::default()
        }
    }

    #[test]
    fn test_source_mutes_matching_target() {
        let inhibitor = rule();
        let now = now_micros();
        let source = firing(&[("alertname", "JobDown"), ("job", "j"), ("zone", "aa")], now);
        inhibitor.observe(&source, now);

        let target = labels_from(&[("alertname", "InstanceDown"), ("job", "j"), ("zone", "aa")]);
        let muted = inhibitor.mutes(&target, now);
        assert_eq!(muted, vec![format!("{:016x}", source.fingerprint())]);

        // different zone does not agree on the equal labels
        let other = labels_from(&[("alertname", "InstanceDown"), ("job", "j"), ("zone", "ab")]);
        assert!(inhibitor.mutes(&other, now).is_empty());
    }

    #[test]
    fn test_source_does_not_inhibit_itself() {
        let inhibitor = Inhibitor::new(&[InhibitRuleConfig {
            source_matchers: vec![Matcher::equal("severity", "critical")],
            target_matchers: vec![Matcher::equal("severity", "critical")],
            equal: vec!["job".to_string()],
        }])
        .unwrap();
        let now = now_micros();
        let alert = firing(&[("alertname", "a"), ("severity", "critical"), ("job", "j")], now);
        inhibitor.observe(&alert, now);

        // the only candidate source is the alert itself
        assert!(inhibitor.mutes(&alert.labels, now).is_empty());

        // a different alert under the same rule is muted
        let other = labels_from(&[("alertname", "b"), ("severity", "critical"), ("job", "j")]);
        assert!(!inhibitor.mutes(&other, now).is_empty());
    }

    #[test]
    fn test_resolving_source_unmutes() {
        let inhibitor = rule();
        let now = now_micros();
        let mut source = firing(&[("alertname", "JobDown"), ("job", "j"), ("zone", "aa")], now);
        inhibitor.observe(&source, now);

        let target = labels_from(&[("alertname", "InstanceDown"), ("job", "j"), ("zone", "aa")]);
        assert!(!inhibitor.mutes(&target, now).is_empty());

        source.ends_at = now - 1;
        inhibitor.observe(&source, now);
        assert!(inhibitor.mutes(&target, now).is_empty());
    }

    #[test]
    fn test_gc_drops_expired_sources() {
        let inhibitor = rule();
        let now = now_micros();
        let mut source = firing(&[("alertname", "JobDown"), ("job", "j"), ("zone", "aa")], now);
        source.ends_at = now + 1_000;
        inhibitor.observe(&source, now);

        let later = now + 2_000;
        // entry is stale but still indexed until gc or a newer observation
        inhibitor.gc(later);
        let target = labels_from(&[("alertname", "InstanceDown"), ("job", "j"), ("zone", "aa")]);
        assert!(inhibitor.mutes(&target, later).is_empty());
        assert!(inhibitor.rules[0].index.read().is_empty());
    }

    #[test]
    fn test_missing_equal_label_counts_as_empty() {
        let inhibitor = rule();
        let now = now_micros();
        // source without zone label
        let source = firing(&[("alertname", "JobDown"), ("job", "j")], now);
        inhibitor.observe(&source, now);

        // target also without zone agrees (both empty)
        let target = labels_from(&[("alertname", "InstanceDown"), ("job", "j")]);
        assert!(!inhibitor.mutes(&target, now).is_empty());

        // target with a zone does not
        let target = labels_from(&[("alertname", "InstanceDown"), ("job", "j"), ("zone", "aa")]);
        assert!(inhibitor.mutes(&target, now).is_empty());
    }
}
