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

use crate::{meta::matchers::Matcher, utils::json};

/// Everything the engine is compiled from: the routing tree, the named
/// receivers it points at, and the inhibition rules.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AlertingConfig {
    pub route: RouteConfig,
    #[serde(default)]
    pub receivers: Vec<ReceiverConfig>,
    #[serde(default)]
    pub inhibit_rules: Vec<InhibitRuleConfig>,
}

impl AlertingConfig {
    pub fn receiver(&self, name: &str) -> Option<&ReceiverConfig> {
        self.receivers.iter().find(|r| r.name == name)
    }
}

/// One node of the routing tree as written in configuration. Unset timers
/// and group_by inherit from the parent node; the root falls back to the
/// process defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    /// `Some(["..."])` groups by the full label set.
    #[serde(default)]
    pub group_by: Option<Vec<String>>,
    #[serde(default)]
    pub group_wait: Option<String>,
    #[serde(default)]
    pub group_interval: Option<String>,
    #[serde(default)]
    pub repeat_interval: Option<String>,
    #[serde(default, rename = "continue")]
    pub continue_matching: bool,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// A named notification target. The settings blob is opaque to the engine
/// and handed to whatever notifier is registered under this name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub name: String,
    #[serde(default = "default_send_resolved")]
    pub send_resolved: bool,
    #[serde(default)]
    pub settings: json::Map<String, json::Value>,
}

fn default_send_resolved() -> bool {
    true
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            name: String::new(),
            send_resolved: true,
            settings: json::Map::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InhibitRuleConfig {
    #[serde(default)]
    pub source_matchers: Vec<Matcher>,
    #[serde(default)]
    pub target_matchers: Vec<Matcher>,
    #[serde(default)]
    pub equal: Vec<String>,
}
