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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utils::hash::fnv;

/// Label names sorted by the map itself, so fingerprinting is deterministic.
pub type LabelSet = BTreeMap<String, String>;

pub type Fingerprint = u64;

/// Hash of a label set, computed over labels sorted by name as
/// `name\0value\0` pairs. The fingerprint is the identity of an alert.
pub fn fingerprint(labels: &LabelSet) -> Fingerprint {
    let mut buf = Vec::with_capacity(labels.len() * 16);
    for (name, value) in labels {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(value.as_bytes());
        buf.push(0);
    }
    fnv::new().sum64_bytes(&buf)
}

/// Stable hash over a set of fingerprints, independent of input order.
pub fn fingerprint_set_hash(fps: &[Fingerprint]) -> u64 {
    let mut sorted = fps.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut buf = Vec::with_capacity(sorted.len() * 8);
    for fp in sorted {
        buf.extend_from_slice(&fp.to_le_bytes());
    }
    fnv::new().sum64_bytes(&buf)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    #[default]
    Active,
    Suppressed,
}

impl std::fmt::Display for StatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusState::Active => write!(f, "active"),
            StatusState::Suppressed => write!(f, "suppressed"),
        }
    }
}

/// Why an alert is (or is not) muted right now. Stamped by the silence and
/// inhibit stages so operators can see which rules apply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStatus {
    pub state: StatusState,
    #[serde(default)]
    pub silenced_by: Vec<String>,
    #[serde(default)]
    pub inhibited_by: Vec<String>,
}

impl AlertStatus {
    pub fn is_suppressed(&self) -> bool {
        !self.silenced_by.is_empty() || !self.inhibited_by.is_empty()
    }

    fn recompute(&mut self) {
        self.state = if self.is_suppressed() {
            StatusState::Suppressed
        } else {
            StatusState::Active
        };
    }

    pub fn set_silenced(&mut self, ids: Vec<String>) {
        self.silenced_by = ids;
        self.recompute();
    }

    pub fn set_inhibited(&mut self, ids: Vec<String>) {
        self.inhibited_by = ids;
        self.recompute();
    }
}

/// All timestamps are unix epoch microseconds; 0 means unset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub labels: LabelSet,
    #[serde(default)]
    pub annotations: LabelSet,
    #[serde(default)]
    pub starts_at: i64,
    #[serde(default)]
    pub ends_at: i64,
    /// Authoritative last-touched time, stamped by the provider on every put.
    #[serde(default)]
    pub updated_at: i64,
    /// True when `ends_at` was synthesized from the resolve timeout rather
    /// than supplied by the producer.
    #[serde(default)]
    pub timeout: bool,
    #[serde(default)]
    pub generator_url: String,
}

impl Alert {
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.labels)
    }

    pub fn is_firing_at(&self, now: i64) -> bool {
        self.ends_at == 0 || self.ends_at > now
    }

    pub fn is_resolved_at(&self, now: i64) -> bool {
        !self.is_firing_at(now)
    }

    pub fn name(&self) -> &str {
        self.labels.get("alertname").map(|s| s.as_str()).unwrap_or("")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.labels.is_empty() {
            return Err(anyhow::anyhow!("at least one label pair required"));
        }
        for (name, value) in &self.labels {
            if name.is_empty() {
                return Err(anyhow::anyhow!("invalid label set: empty name"));
            }
            if value.is_empty() {
                return Err(anyhow::anyhow!("invalid label set: label {name:?} has empty value"));
            }
        }
        if self.ends_at != 0 && self.starts_at > self.ends_at {
            return Err(anyhow::anyhow!(
                "start time must be before end time ({} > {})",
                self.starts_at,
                self.ends_at
            ));
        }
        Ok(())
    }

    /// Merge two observations of the same alert. `merge(a, b) == merge(b, a)`
    /// holds for any pair; the provider relies on that to stay convergent
    /// under replays and out-of-order puts.
    pub fn merge(&self, other: &Alert, now: i64) -> Alert {
        let (older, newer) = if cmp_recency(self, other) == std::cmp::Ordering::Greater {
            (other, self)
        } else {
            (self, other)
        };

        let mut res = newer.clone();

        // earliest non-zero start wins, unless exactly one side is still
        // firing, then the firing side defines when the incident began
        let older_firing = older.is_firing_at(now);
        let newer_firing = newer.is_firing_at(now);
        res.starts_at = if older_firing != newer_firing {
            if older_firing { older.starts_at } else { newer.starts_at }
        } else {
            match (older.starts_at, newer.starts_at) {
                (0, s) | (s, 0) => s,
                (a, b) => a.min(b),
            }
        };

        match (older.timeout, newer.timeout) {
            (true, true) | (false, false) => {
                if older.ends_at > newer.ends_at {
                    res.ends_at = older.ends_at;
                    res.timeout = older.timeout;
                } else {
                    res.ends_at = newer.ends_at;
                    res.timeout = newer.timeout;
                }
            }
            // an explicit end time always beats a synthesized one
            (true, false) => {
                res.ends_at = newer.ends_at;
                res.timeout = false;
            }
            (false, true) => {
                res.ends_at = older.ends_at;
                res.timeout = false;
            }
        }

        res.updated_at = older.updated_at.max(newer.updated_at);
        res
    }
}

/// Total order on observations of one alert. `updated_at` decides; the
/// remaining fields only break ties so the ordering stays antisymmetric.
fn cmp_recency(a: &Alert, b: &Alert) -> std::cmp::Ordering {
    a.updated_at
        .cmp(&b.updated_at)
        .then(a.ends_at.cmp(&b.ends_at))
        .then(a.starts_at.cmp(&b.starts_at))
        .then(a.timeout.cmp(&b.timeout))
        .then_with(|| a.annotations.cmp(&b.annotations))
        .then_with(|| a.generator_url.cmp(&b.generator_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn alert(pairs: &[(&str, &str)]) -> Alert {
        Alert {
            labels: labels(pairs),
            ..Default::default()
        }
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let a = labels(&[("alertname", "x"), ("job", "api")]);
        let b = labels(&[("job", "api"), ("alertname", "x")]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_depends_on_values() {
        let a = labels(&[("alertname", "x")]);
        let b = labels(&[("alertname", "y")]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_separator_is_unambiguous() {
        let a = labels(&[("ab", "c")]);
        let b = labels(&[("a", "bc")]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_set_hash_order_independent() {
        assert_eq!(
            fingerprint_set_hash(&[3, 1, 2]),
            fingerprint_set_hash(&[1, 2, 3])
        );
        assert_ne!(fingerprint_set_hash(&[1]), fingerprint_set_hash(&[2]));
    }

    #[test]
    fn test_validate() {
        let mut a = alert(&[("alertname", "x")]);
        assert!(a.validate().is_ok());
        a.labels.insert("".to_string(), "v".to_string());
        assert!(a.validate().is_err());

        let mut b = alert(&[("alertname", "x")]);
        b.labels.insert("job".to_string(), "".to_string());
        assert!(b.validate().is_err());

        let mut c = alert(&[("alertname", "x")]);
        c.starts_at = 10;
        c.ends_at = 5;
        assert!(c.validate().is_err());
        c.ends_at = 0;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_merge_is_commutative() {
        let now = 1_700_000_000 * 1_000_000i64;
        let minute = 60 * 1_000_000i64;
        let a = Alert {
            starts_at: now - 2 * minute,
            ends_at: now + 2 * minute,
            updated_at: now,
            timeout: true,
            ..alert(&[("alertname", "x")])
        };
        let b = Alert {
            starts_at: now - minute,
            ends_at: now + 3 * minute,
            updated_at: now + minute,
            timeout: true,
            ..alert(&[("alertname", "x")])
        };

        let ab = a.merge(&b, now);
        let ba = b.merge(&a, now);
        assert_eq!(ab, ba);
        assert_eq!(ab.starts_at, now - 2 * minute);
        assert_eq!(ab.ends_at, now + 3 * minute);
        assert!(ab.timeout);
        assert_eq!(ab.updated_at, now + minute);
    }

    #[test]
    fn test_merge_explicit_end_beats_timeout() {
        let now = 1_700_000_000 * 1_000_000i64;
        let minute = 60 * 1_000_000i64;
        let synthesized = Alert {
            starts_at: now - minute,
            ends_at: now + 5 * minute,
            updated_at: now,
            timeout: true,
            ..alert(&[("alertname", "x")])
        };
        let explicit = Alert {
            starts_at: now - minute,
            ends_at: now + minute,
            updated_at: now + 1,
            timeout: false,
            ..alert(&[("alertname", "x")])
        };

        let merged = synthesized.merge(&explicit, now);
        assert_eq!(merged, explicit.merge(&synthesized, now));
        assert_eq!(merged.ends_at, now + minute);
        assert!(!merged.timeout);
    }

    #[test]
    fn test_merge_firing_start_wins_over_resolved() {
        let now = 1_700_000_000 * 1_000_000i64;
        let minute = 60 * 1_000_000i64;
        let resolved = Alert {
            starts_at: now - 10 * minute,
            ends_at: now - minute,
            updated_at: now - minute,
            ..alert(&[("alertname", "x")])
        };
        let firing = Alert {
            starts_at: now - 2 * minute,
            ends_at: now + 5 * minute,
            updated_at: now,
            ..alert(&[("alertname", "x")])
        };

        let merged = resolved.merge(&firing, now);
        assert_eq!(merged.starts_at, firing.starts_at);
        assert_eq!(merged.ends_at, firing.ends_at);
    }

    #[test]
    fn test_status_stamping() {
        let mut status = AlertStatus::default();
        assert_eq!(status.state, StatusState::Active);
        status.set_silenced(vec!["abc".to_string()]);
        assert_eq!(status.state, StatusState::Suppressed);
        status.set_silenced(vec![]);
        assert_eq!(status.state, StatusState::Active);
        status.set_inhibited(vec!["123".to_string()]);
        assert_eq!(status.state, StatusState::Suppressed);
    }
}
