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

//! The routing tree. Compiled once from configuration, immutable afterwards;
//! a reload installs a whole new tree.

use std::time::Duration;

use config::{
    get_config,
    meta::{
        alerts::LabelSet,
        matchers::CompiledMatchers,
        routes::{AlertingConfig, RouteConfig},
    },
    utils::{hash::fnv, time::parse_duration},
};
use infra::errors::{Error, Result};
use itertools::Itertools;

#[derive(Clone, Debug)]
pub struct RouteOpts {
    pub receiver: String,
    pub group_by: Vec<String>,
    pub group_by_all: bool,
    pub group_wait: Duration,
    pub group_interval: Duration,
    pub repeat_interval: Duration,
}

pub struct Route {
    /// Path-derived identity; part of every group key built from this node.
    pub key: String,
    pub opts: RouteOpts,
    pub continue_matching: bool,
    matchers: CompiledMatchers,
    routes: Vec<Route>,
}

impl Route {
    /// Compile the configured tree. Every route must point at a declared
    /// receiver and every timer must parse.
    pub fn compile(cfg: &AlertingConfig) -> Result<Route> {
        if cfg.route.receiver.is_empty() {
            return Err(Error::Validation(
                "root route must have a receiver".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for r in &cfg.receivers {
            if !seen.insert(r.name.clone()) {
                return Err(Error::Validation(format!(
                    "receiver {:?} declared twice",
                    r.name
                )));
            }
        }

        let defaults = get_config();
        let root_opts = RouteOpts {
            receiver: String::new(),
            group_by: Vec::new(),
            group_by_all: false,
            group_wait: parse_duration(&defaults.route.group_wait)
                .map_err(|e| Error::Validation(e.to_string()))?,
            group_interval: parse_duration(&defaults.route.group_interval)
                .map_err(|e| Error::Validation(e.to_string()))?,
            repeat_interval: parse_duration(&defaults.route.repeat_interval)
                .map_err(|e| Error::Validation(e.to_string()))?,
        };
        compile_node(&cfg.route, &root_opts, "", cfg)
    }

    /// Depth first, left to right. Returns the nodes whose options apply to
    /// this label set; an alert can land in several of them.
    pub fn matches(&self, labels: &LabelSet) -> Vec<&Route> {
        if !self.matchers.matches(labels) {
            return Vec::new();
        }
        let mut out = Vec::new();
        for child in &self.routes {
            let sub = child.matches(labels);
            let contributed = !sub.is_empty();
            out.extend(sub);
            if contributed && !child.continue_matching {
                break;
            }
        }
        if out.is_empty() {
            out.push(self);
        }
        out
    }

    pub fn fingerprint(&self) -> u64 {
        fnv::new().sum64(&self.key)
    }

    /// The label values this route groups by, rendered into a group key.
    pub fn group_labels(&self, labels: &LabelSet) -> LabelSet {
        if self.opts.group_by_all {
            return labels.clone();
        }
        self.opts
            .group_by
            .iter()
            .filter_map(|name| {
                labels
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }

    /// Walk the tree collecting every referenced receiver name.
    pub fn receivers(&self) -> Vec<String> {
        let mut out = vec![self.opts.receiver.clone()];
        for child in &self.routes {
            out.extend(child.receivers());
        }
        out.sort();
        out.dedup();
        out
    }
}

fn compile_node(
    node: &RouteConfig,
    parent: &RouteOpts,
    parent_key: &str,
    cfg: &AlertingConfig,
) -> Result<Route> {
    let receiver = if node.receiver.is_empty() {
        parent.receiver.clone()
    } else {
        node.receiver.clone()
    };
    if receiver.is_empty() {
        return Err(Error::Validation(format!(
            "route {parent_key:?} has no receiver and none to inherit"
        )));
    }
    if cfg.receiver(&receiver).is_none() {
        return Err(Error::Validation(format!(
            "route references undeclared receiver {receiver:?}"
        )));
    }

    let (group_by, group_by_all) = match &node.group_by {
        None => (parent.group_by.clone(), parent.group_by_all),
        Some(names) if names.iter().any(|n| n == "...") => {
            if names.len() != 1 {
                return Err(Error::Validation(
                    "group_by \"...\" cannot be combined with label names".to_string(),
                ));
            }
            (Vec::new(), true)
        }
        Some(names) => {
            let mut names = names.clone();
            names.sort();
            if names.iter().dedup().count() != names.len() {
                return Err(Error::Validation("duplicate group_by label".to_string()));
            }
            if names.iter().any(|n| n.is_empty()) {
                return Err(Error::Validation("empty group_by label".to_string()));
            }
            (names, false)
        }
    };

    let opts = RouteOpts {
        receiver,
        group_by,
        group_by_all,
        group_wait: opt_duration(&node.group_wait, parent.group_wait)?,
        group_interval: opt_duration(&node.group_interval, parent.group_interval)?,
        repeat_interval: opt_duration(&node.repeat_interval, parent.repeat_interval)?,
    };
    if opts.group_interval.is_zero() {
        return Err(Error::Validation("group_interval must be > 0".to_string()));
    }

    let matchers = CompiledMatchers::compile(&node.matchers)
        .map_err(|e| Error::Validation(e.to_string()))?;
    let key = format!(
        "{parent_key}/{}:{{{}}}",
        opts.receiver,
        node.matchers.iter().map(|m| m.to_string()).join(",")
    );

    let routes = node
        .routes
        .iter()
        .map(|child| compile_node(child, &opts, &key, cfg))
        .collect::<Result<Vec<_>>>()?;

    Ok(Route {
        key,
        opts,
        continue_matching: node.continue_matching,
        matchers,
        routes,
    })
}

fn opt_duration(v: &Option<String>, fallback: Duration) -> Result<Duration> {
    match v {
        None => Ok(fallback),
        Some(s) => parse_duration(s).map_err(|e| Error::Validation(e.to_string())),
    }
}
