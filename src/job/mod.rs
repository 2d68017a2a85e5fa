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

//! Background task wiring. Every loop owns a child of the engine's
//! cancellation token and exits cleanly when the engine stops.

use std::sync::Arc;

use infra::errors::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::service::{alerts::Alerts, inhibit::Inhibitor, nflog::Nflog, silences::Silences};

pub fn spawn_alerts_gc(alerts: Arc<Alerts>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("[JOB] alert gc loop started");
        alerts.run_gc(cancel).await;
        log::info!("[JOB] alert gc loop stopped");
    })
}

pub fn spawn_silences_maintenance(
    silences: Arc<Silences>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("[JOB] silences maintenance loop started");
        silences.run_maintenance(cancel).await;
        log::info!("[JOB] silences maintenance loop stopped");
    })
}

pub fn spawn_silences_gossip(
    silences: Arc<Silences>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        silences.run_gossip(cancel).await;
    })
}

pub fn spawn_nflog_maintenance(nflog: Arc<Nflog>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("[JOB] nflog maintenance loop started");
        nflog.run_maintenance(cancel).await;
        log::info!("[JOB] nflog maintenance loop stopped");
    })
}

pub fn spawn_nflog_gossip(nflog: Arc<Nflog>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        nflog.run_gossip(cancel).await;
    })
}

pub fn spawn_inhibitor_feed(
    inhibitor: Arc<Inhibitor>,
    alerts: &Alerts,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let sub = alerts.subscribe("inhibitor")?;
    Ok(tokio::spawn(async move {
        log::info!("[JOB] inhibitor feed started");
        inhibitor.run(sub, cancel).await;
        log::info!("[JOB] inhibitor feed stopped");
    }))
}
