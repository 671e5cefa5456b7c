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

use std::{fs, net::SocketAddr, path::Path, time::Duration};
use serde::{Serialize,Deserialize};
use crate::errors::{OdinUavError,Result,config_error};

/// the runtime configuration of a UAV telemetry hub
/// all fields have defaults so that config files only need to list what differs, e.g.
/// ```ron
/// UavConfig(
///     ports: [14550, 14551],
///     listener_timeout_ms: 10000,
/// )
/// ```
#[derive(Deserialize,Serialize,Debug,Clone)]
#[serde(default)]
pub struct UavConfig {
    pub ports: Vec<u32>,             // initial ports to watch
    pub thread_pool_size: usize,     // max number of concurrently active vehicle readers
    pub listener_timeout_ms: u64,    // inactivity after which a reader gives its port back to the scanner
    pub scanner_timeout_ms: u64,     // max wait of the scanner before it re-reconciles its watch set
    pub buffer_size: usize,          // receive buffer (max datagram size)
    pub max_ports: usize,            // registry capacity
    pub min_port: u16,
    pub max_port: u16,
    pub server_addr: String,         // where the websocket/admin server listens
    pub ws_path: String,             // route of the telemetry websocket
    pub publish_capacity: usize,     // broadcast queue depth per websocket subscriber
    pub shutdown_grace_ms: u64,      // how long we wait for readers to drain on shutdown
}

impl Default for UavConfig {
    fn default()->Self {
        UavConfig {
            ports: vec![1500, 1501, 1502],
            thread_pool_size: 100,
            listener_timeout_ms: 30_000,
            scanner_timeout_ms: 5_000,
            buffer_size: 1024,
            max_ports: 100,
            min_port: 1,
            max_port: 65535,
            server_addr: "0.0.0.0:8080".to_string(),
            ws_path: "/telemetry".to_string(),
            publish_capacity: 64,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl UavConfig {
    #[inline] pub fn listener_timeout (&self)->Duration { Duration::from_millis( self.listener_timeout_ms) }
    #[inline] pub fn scanner_timeout (&self)->Duration { Duration::from_millis( self.scanner_timeout_ms) }
    #[inline] pub fn shutdown_grace (&self)->Duration { Duration::from_millis( self.shutdown_grace_ms) }

    pub fn server_socket_addr (&self)->Result<SocketAddr> {
        self.server_addr.parse().map_err(|e| config_error!("invalid server_addr '{}': {}", self.server_addr, e))
    }

    /// check the settings that would otherwise only fail at runtime
    pub fn validate (&self)->Result<()> {
        if self.min_port > self.max_port {
            return Err( config_error!("min_port {} > max_port {}", self.min_port, self.max_port))
        }
        if self.min_port == 0 {
            return Err( config_error!("min_port has to be > 0"))
        }
        if self.thread_pool_size == 0 { return Err( config_error!("thread_pool_size has to be > 0")) }
        if self.buffer_size == 0 { return Err( config_error!("buffer_size has to be > 0")) }
        if self.publish_capacity == 0 { return Err( config_error!("publish_capacity has to be > 0")) }
        if self.listener_timeout_ms == 0 || self.scanner_timeout_ms == 0 {
            return Err( config_error!("listener_timeout_ms and scanner_timeout_ms have to be > 0"))
        }
        if !self.ws_path.starts_with('/') {
            return Err( config_error!("ws_path has to start with '/': {}", self.ws_path))
        }
        self.server_socket_addr()?;
        Ok(())
    }
}

pub fn parse_config (src: &str)->Result<UavConfig> {
    let config: UavConfig = ron::from_str(src)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config<P: AsRef<Path>> (path: P)->Result<UavConfig> {
    let path = path.as_ref();
    let src = fs::read_to_string(path)
        .map_err(|e| config_error!("failed to read config {:?}: {}", path, e))?;
    parse_config( &src)
}
