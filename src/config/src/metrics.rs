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

use once_cell::sync::Lazy;
use prometheus::{
    HistogramVec, IntCounterVec, IntGauge, register_histogram_vec, register_int_counter_vec,
    register_int_gauge,
};

pub static ALERTS_RECEIVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "alertmesh_alerts_received_total",
        "Alerts received by the provider",
        &["status"]
    )
    .unwrap()
});

pub static ALERTS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "alertmesh_alerts_active",
        "Alerts currently held by the provider"
    )
    .unwrap()
});

pub static SUBSCRIBER_OVERFLOW_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "alertmesh_subscriber_overflow_total",
        "Subscriptions severed because the subscriber queue was full",
        &["subscriber"]
    )
    .unwrap()
});

pub static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "alertmesh_notifications_total",
        "Notification attempts by receiver and outcome",
        &["receiver", "status"]
    )
    .unwrap()
});

pub static NOTIFICATION_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "alertmesh_notification_latency_seconds",
        "Wall time of successful notifier calls",
        &["receiver"]
    )
    .unwrap()
});

pub static DISPATCHER_GROUPS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "alertmesh_dispatcher_aggregation_groups",
        "Live aggregation groups in the dispatcher"
    )
    .unwrap()
});

pub static SILENCES_GOSSIP_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "alertmesh_silences_gossip_total",
        "Silence CRDT gossip messages",
        &["direction"]
    )
    .unwrap()
});

pub static NFLOG_GOSSIP_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "alertmesh_nflog_gossip_total",
        "Notification log CRDT gossip messages",
        &["direction"]
    )
    .unwrap()
});

pub static SNAPSHOT_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "alertmesh_snapshot_errors_total",
        "Snapshot persistence failures by store",
        &["store"]
    )
    .unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        ALERTS_RECEIVED_TOTAL.with_label_values(&["valid"]).inc();
        ALERTS_RECEIVED_TOTAL.with_label_values(&["valid"]).inc();
        assert!(ALERTS_RECEIVED_TOTAL.with_label_values(&["valid"]).get() >= 2);
        DISPATCHER_GROUPS.set(3);
        assert_eq!(DISPATCHER_GROUPS.get(), 3);
    }
}
