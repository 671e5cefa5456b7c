/*
 * Copyright © 2025, United States Government, as represented by the Administrator of
 * the National Aeronautics and Space Administration. All rights reserved.
 *
 * The “ODIN” software is licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License. You may obtain a copy
 * of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

use std::{collections::BTreeMap, net::IpAddr, sync::Arc};
use chrono::{DateTime,Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{trace,warn};

use crate::codec::Decoded;
use crate::publisher::SnapshotPublisher;
use crate::telemetry::{VehicleSnapshot,VehicleTrack};

/// the aggregate we publish after each applied message, keyed by port number (as string)
#[derive(Serialize,Debug,Clone,Default,PartialEq)]
pub struct TelemetrySnapshot {
    pub telemetry_data: BTreeMap<String,VehicleSnapshot>,
}

impl TelemetrySnapshot {
    pub fn get (&self, port: u16)->Option<&VehicleSnapshot> { self.telemetry_data.get( &port.to_string()) }
    pub fn len (&self)->usize { self.telemetry_data.len() }
    pub fn is_empty (&self)->bool { self.telemetry_data.is_empty() }
}

/// the per-port vehicle store
/// All updates of a port go through its map entry, which is locked for the duration of one message. Readers
/// of the store (publication) therefore never see a partially applied message
pub struct TelemetryAggregator {
    vehicles: DashMap<u16,VehicleTrack>,
    publisher: Arc<dyn SnapshotPublisher>,
}

impl TelemetryAggregator {
    pub fn new (publisher: Arc<dyn SnapshotPublisher>)->Self {
        TelemetryAggregator { vehicles: DashMap::new(), publisher }
    }

    /// apply a decoded message without publishing
    pub fn apply (&self, port: u16, sender: IpAddr, decoded: &Decoded, now: DateTime<Utc>) {
        let gcs_ip = sender.to_string();
        let mut track = self.vehicles.entry( port).or_insert_with(|| VehicleTrack::new( port));
        track.apply( &gcs_ip, decoded, now);
        trace!("port {}: applied {}", port, decoded);
    }

    /// apply a decoded message and publish the resulting aggregate
    /// Publication failures are logged and otherwise ignored
    pub fn ingest (&self, port: u16, sender: IpAddr, decoded: &Decoded, now: DateTime<Utc>) {
        self.apply( port, sender, decoded, now); // entry lock is released here

        let snapshot = self.snapshot_all();
        if let Err(e) = self.publisher.publish( &snapshot) {
            warn!("failed to publish telemetry update for port {}: {}", port, e);
        }
    }

    pub fn snapshot (&self, port: u16)->Option<VehicleSnapshot> {
        self.vehicles.get( &port).map(|track| track.snapshot().clone())
    }

    pub fn snapshot_all (&self)->TelemetrySnapshot {
        let telemetry_data = self.vehicles.iter()
            .map(|e| (e.key().to_string(), e.value().snapshot().clone()))
            .collect();
        TelemetrySnapshot { telemetry_data }
    }

    /// a copy of the full track state (including derived quantity timers) of a port
    pub fn track (&self, port: u16)->Option<VehicleTrack> {
        self.vehicles.get( &port).map(|track| track.value().clone())
    }

    pub fn ports (&self)->Vec<u16> {
        let mut ports: Vec<u16> = self.vehicles.iter().map(|e| *e.key()).collect();
        ports.sort_unstable();
        ports
    }

    pub fn len (&self)->usize { self.vehicles.len() }

    pub fn is_empty (&self)->bool { self.vehicles.is_empty() }
}
