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

use std::{collections::BTreeSet, sync::{RwLock,RwLockReadGuard,RwLockWriteGuard}};
use tracing::{info,warn,debug};
use crate::config::UavConfig;

/// the set of UDP ports we watch for incoming vehicle telemetry
/// This is shared between the scanner thread (reader) and whoever adds or removes ports at runtime.
/// Mutations are serialized by the lock, which is what guarantees we never exceed `max_ports`
#[derive(Debug)]
pub struct PortRegistry {
    max_ports: usize,
    min_port: u16,
    max_port: u16,
    ports: RwLock<BTreeSet<u16>>,
}

impl PortRegistry {
    pub fn new (max_ports: usize, min_port: u16, max_port: u16)->Self {
        PortRegistry { max_ports, min_port, max_port, ports: RwLock::new( BTreeSet::new()) }
    }

    pub fn from_config (config: &UavConfig)->Self {
        PortRegistry::new( config.max_ports, config.min_port, config.max_port)
    }

    pub fn max_ports (&self)->usize { self.max_ports }

    pub fn is_valid_port (&self, port: u32)->bool {
        port >= self.min_port as u32 && port <= self.max_port as u32
    }

    /// add candidate ports, returning the ones that were actually added
    /// Invalid ports and ports that would exceed the capacity are logged and skipped, ports that are
    /// already registered are ignored
    pub fn add<I> (&self, candidates: I)->Vec<u16> where I: IntoIterator<Item=u32> {
        let mut added = Vec::new();
        let mut ports = self.write_ports();

        for port in candidates {
            if ports.len() >= self.max_ports {
                warn!("cannot add port {}: maximum port limit ({}) reached", port, self.max_ports);
                continue;
            }
            if !self.is_valid_port( port) {
                warn!("invalid port {}: port must be between {} and {}", port, self.min_port, self.max_port);
                continue;
            }

            let port = port as u16; // safe since max_port is a u16
            if ports.insert( port) {
                info!("added port {} to scan list", port);
                added.push( port);
            } else {
                debug!("port {} is already in the scan list, skipping", port);
            }
        }

        added
    }

    /// remove ports, returning the ones that were registered
    pub fn remove<I> (&self, candidates: I)->Vec<u16> where I: IntoIterator<Item=u32> {
        let mut removed = Vec::new();
        let mut ports = self.write_ports();

        for port in candidates {
            if let Ok(port) = u16::try_from( port) {
                if ports.remove( &port) {
                    info!("removed port {} from scan list", port);
                    removed.push( port);
                    continue;
                }
            }
            debug!("port {} not in scan list, skipping", port);
        }

        removed
    }

    pub fn contains (&self, port: u16)->bool { self.read_ports().contains(&port) }

    /// a copy of the current port set, which allows callers to iterate without holding the lock
    pub fn list (&self)->BTreeSet<u16> { self.read_ports().clone() }

    pub fn len (&self)->usize { self.read_ports().len() }

    pub fn is_empty (&self)->bool { self.len() == 0 }

    // a panicking writer cannot leave the set in an inconsistent state so we ignore poisoning
    fn read_ports (&self)->RwLockReadGuard<'_,BTreeSet<u16>> {
        self.ports.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_ports (&self)->RwLockWriteGuard<'_,BTreeSet<u16>> {
        self.ports.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
