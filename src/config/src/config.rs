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

use std::sync::Arc;

use arc_swap::ArcSwap;
use dotenv_config::EnvConfig;
use dotenvy::dotenv_override;
use once_cell::sync::Lazy;

use crate::utils::time::parse_duration;

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from(Arc::new(init())));

pub fn get_config() -> Arc<Config> {
    CONFIG.load().clone()
}

pub fn refresh_config() -> Result<(), anyhow::Error> {
    CONFIG.store(Arc::new(init()));
    Ok(())
}

pub fn init() -> Config {
    dotenv_override().ok();
    let mut cfg = Config::init().unwrap();
    if let Err(e) = check_config(&mut cfg) {
        panic!("config error: {e}");
    }
    cfg
}

fn check_config(cfg: &mut Config) -> Result<(), anyhow::Error> {
    // normalize data dir
    if cfg.common.data_dir.is_empty() {
        cfg.common.data_dir = "./data/".to_string();
    }
    if !cfg.common.data_dir.ends_with('/') {
        cfg.common.data_dir = format!("{}/", cfg.common.data_dir);
    }

    if cfg.limit.subscriber_queue_capacity == 0 {
        cfg.limit.subscriber_queue_capacity = 2048;
    }

    if cfg.alerts.resolve_timeout <= 0 {
        return Err(anyhow::anyhow!("AM_ALERTS_RESOLVE_TIMEOUT must be > 0"));
    }
    if cfg.alerts.resolve_retention < 0 {
        return Err(anyhow::anyhow!("AM_ALERTS_RESOLVE_RETENTION must be >= 0"));
    }
    if cfg.silences.retention <= 0 || cfg.nflog.retention <= 0 {
        return Err(anyhow::anyhow!("store retention must be > 0"));
    }
    if cfg.silences.maintenance_interval <= 0 || cfg.nflog.maintenance_interval <= 0 {
        return Err(anyhow::anyhow!("store maintenance interval must be > 0"));
    }

    // route timer defaults must parse
    for (name, v) in [
        ("AM_ROUTE_GROUP_WAIT", &cfg.route.group_wait),
        ("AM_ROUTE_GROUP_INTERVAL", &cfg.route.group_interval),
        ("AM_ROUTE_REPEAT_INTERVAL", &cfg.route.repeat_interval),
    ] {
        parse_duration(v).map_err(|e| anyhow::anyhow!("{name}: {e}"))?;
    }

    if cfg.cluster.enabled && cfg.cluster.listen_addr.is_empty() {
        return Err(anyhow::anyhow!(
            "AM_CLUSTER_LISTEN_ADDR must be set when cluster mode is enabled"
        ));
    }
    if cfg.cluster.gossip_interval == 0 {
        cfg.cluster.gossip_interval = 1000;
    }

    Ok(())
}

#[derive(EnvConfig)]
pub struct Config {
    pub common: Common,
    pub limit: Limit,
    pub alerts: Alerts,
    pub silences: Silences,
    pub nflog: Nflog,
    pub cluster: Cluster,
    pub route: Route,
}

#[derive(EnvConfig)]
pub struct Common {
    #[env_config(name = "AM_DATA_DIR", default = "./data/")]
    pub data_dir: String,
    #[env_config(name = "AM_INSTANCE_NAME", default = "")]
    pub instance_name: String,
}

#[derive(EnvConfig)]
pub struct Limit {
    // per-subscriber queue; a subscriber falling this far behind is cut off
    #[env_config(name = "AM_SUBSCRIBER_QUEUE_CAPACITY", default = 2048)]
    pub subscriber_queue_capacity: usize,
}

#[derive(EnvConfig)]
pub struct Alerts {
    #[env_config(name = "AM_ALERTS_RESOLVE_TIMEOUT", default = 300)] // seconds
    pub resolve_timeout: i64,
    #[env_config(name = "AM_ALERTS_RESOLVE_RETENTION", default = 300)] // seconds
    pub resolve_retention: i64,
    #[env_config(name = "AM_ALERTS_GC_INTERVAL", default = 1800)] // seconds
    pub gc_interval: i64,
}

#[derive(EnvConfig)]
pub struct Silences {
    #[env_config(name = "AM_SILENCES_RETENTION", default = 432000)] // seconds, 120h
    pub retention: i64,
    #[env_config(name = "AM_SILENCES_MAINTENANCE_INTERVAL", default = 900)] // seconds
    pub maintenance_interval: i64,
    #[env_config(name = "AM_SILENCES_SNAPSHOT_FILE", default = "silences")]
    pub snapshot_file: String,
}

#[derive(EnvConfig)]
pub struct Nflog {
    #[env_config(name = "AM_NFLOG_RETENTION", default = 432000)] // seconds, 120h
    pub retention: i64,
    #[env_config(name = "AM_NFLOG_MAINTENANCE_INTERVAL", default = 900)] // seconds
    pub maintenance_interval: i64,
    #[env_config(name = "AM_NFLOG_SNAPSHOT_FILE", default = "nflog")]
    pub snapshot_file: String,
}

#[derive(EnvConfig)]
pub struct Cluster {
    #[env_config(name = "AM_CLUSTER_ENABLED", default = false)]
    pub enabled: bool,
    #[env_config(name = "AM_CLUSTER_NAME", default = "alertmesh")]
    pub name: String,
    #[env_config(name = "AM_CLUSTER_LISTEN_ADDR", default = "0.0.0.0:9094")]
    pub listen_addr: String,
    // comma separated host:port seed peers
    #[env_config(name = "AM_CLUSTER_SEEDS", default = "")]
    pub seeds: String,
    #[env_config(name = "AM_CLUSTER_GOSSIP_INTERVAL", default = 1000)] // milliseconds
    pub gossip_interval: u64,
    #[env_config(name = "AM_CLUSTER_SETTLE_TIMEOUT", default = 10)] // seconds
    pub settle_timeout: i64,
    // each peer waits position * peer_timeout before sending
    #[env_config(name = "AM_CLUSTER_PEER_TIMEOUT", default = 15)] // seconds
    pub peer_timeout: i64,
}

#[derive(EnvConfig)]
pub struct Route {
    #[env_config(name = "AM_ROUTE_GROUP_WAIT", default = "30s")]
    pub group_wait: String,
    #[env_config(name = "AM_ROUTE_GROUP_INTERVAL", default = "5m")]
    pub group_interval: String,
    #[env_config(name = "AM_ROUTE_REPEAT_INTERVAL", default = "4h")]
    pub repeat_interval: String,
}

impl Cluster {
    pub fn seed_addrs(&self) -> Vec<String> {
        self.seeds
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
