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

//! a hub that collects MAVLink telemetry of UAVs that send to a changing set of UDP ports, and publishes the
//! aggregated vehicle states to websocket clients
//!
//! Idle ports are watched by a single [`scanner::PortScanner`] thread. The first datagram on a port leases it
//! to a [`reader::ReaderPool`] reader that owns the port until it becomes idle, feeding decoded messages into
//! the [`aggregator::TelemetryAggregator`]

pub mod errors;
pub mod config;
pub mod registry;
pub mod lease;
pub mod net;
pub mod codec;
pub mod telemetry;
pub mod aggregator;
pub mod publisher;
pub mod reader;
pub mod scanner;
pub mod service;

pub use errors::{OdinUavError,Result};
pub use config::{UavConfig,load_config,parse_config};
pub use registry::PortRegistry;
pub use lease::{LeaseTable,LeaseState,LeaseGuard,ReaderHandle};
pub use codec::{Decoded,TelemetryMsg,TelemetryDecoder,MavlinkDecoder};
pub use telemetry::{VehicleSnapshot,VehicleTrack,Waypoint,HomeLocation};
pub use aggregator::{TelemetryAggregator,TelemetrySnapshot};
pub use publisher::{SnapshotPublisher,WsPublisher};
pub use reader::{ReaderPool,ReaderContext,HandoffOutcome,ExitReason};
pub use scanner::{PortScanner,ScannerHandle,ScanWaker};
pub use service::UavService;
