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

use serde::{Deserialize, Serialize};

use crate::meta::matchers::Matcher;

/// Derived from the clock, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilenceState {
    Pending,
    Active,
    Expired,
}

impl std::fmt::Display for SilenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SilenceState::Pending => write!(f, "pending"),
            SilenceState::Active => write!(f, "active"),
            SilenceState::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for SilenceState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SilenceState::Pending),
            "active" => Ok(SilenceState::Active),
            "expired" => Ok(SilenceState::Expired),
            other => Err(anyhow::anyhow!("unknown silence state {other:?}")),
        }
    }
}

/// Timestamps are unix epoch microseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Silence {
    #[serde(default)]
    pub id: String,
    pub matchers: Vec<Matcher>,
    pub starts_at: i64,
    pub ends_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub comment: String,
}

impl Silence {
    pub fn state_at(&self, now: i64) -> SilenceState {
        if now < self.starts_at {
            SilenceState::Pending
        } else if now < self.ends_at {
            SilenceState::Active
        } else {
            SilenceState::Expired
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.matchers.is_empty() {
            return Err(anyhow::anyhow!("silence must have at least one matcher"));
        }
        for m in &self.matchers {
            m.validate()?;
        }
        if self.starts_at <= 0 || self.ends_at <= 0 {
            return Err(anyhow::anyhow!("silence start and end times must be set"));
        }
        if self.ends_at < self.starts_at {
            return Err(anyhow::anyhow!(
                "silence end time must not be before start time"
            ));
        }
        Ok(())
    }

    /// Matchers compared independent of declaration order.
    pub fn same_matchers(&self, other: &Silence) -> bool {
        let mut a = self.matchers.clone();
        let mut b = other.matchers.clone();
        let key = |m: &Matcher| (m.name.clone(), m.value.clone(), m.is_regex, m.is_negative);
        a.sort_by_key(key);
        b.sort_by_key(key);
        a == b
    }
}
