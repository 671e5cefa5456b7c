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

use std::{fmt, sync::{Arc, atomic::{AtomicU64,Ordering}}};
use chrono::{DateTime,Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use tokio_util::sync::CancellationToken;
use tracing::{debug,info};

use crate::net::wake_listener;

/// the handle through which we can stop the reader that owns a port
#[derive(Debug,Clone)]
pub struct ReaderHandle {
    pub port: u16,
    pub id: u64,
    pub started: DateTime<Utc>,
    cancel: CancellationToken,
}

impl ReaderHandle {
    pub fn is_stopped (&self)->bool { self.cancel.is_cancelled() }

    pub fn cancel_token (&self)->&CancellationToken { &self.cancel }

    /// ask the reader to terminate
    /// Readers spend most of their time blocked in a receive with a long timeout, so we also send them an
    /// empty datagram to return from it right away
    pub fn stop (&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            if let Err(e) = wake_listener( self.port) {
                debug!("failed to wake listener on port {}: {}", self.port, e);
            }
        }
    }
}

impl fmt::Display for ReaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "ReaderHandle( port: {}, id: {}, started: {})", self.port, self.id, self.started)
    }
}

/// the state of a port as seen by the lease table
#[derive(Debug,Clone)]
pub enum LeaseState {
    Free,
    Listening(ReaderHandle)
}

impl LeaseState {
    pub fn is_free (&self)->bool { matches!( self, LeaseState::Free) }
}

/// the single source of truth for which port is owned by a reader
/// A port without entry is free. The `Free -> Listening` transition is a test-and-set on the map entry,
/// i.e. concurrent detections for the same port see exactly one winner
#[derive(Debug,Default)]
pub struct LeaseTable {
    leases: DashMap<u16,ReaderHandle>,
    next_id: AtomicU64,
}

impl LeaseTable {
    pub fn new ()->Self { LeaseTable::default() }

    /// try to lease `port`, returning the handle of the new lease if the port was free
    pub fn try_acquire (&self, port: u16)->Option<ReaderHandle> {
        match self.leases.entry( port) {
            Entry::Occupied(_) => None,
            Entry::Vacant(e) => {
                let id = self.next_id.fetch_add( 1, Ordering::Relaxed);
                let handle = ReaderHandle { port, id, started: Utc::now(), cancel: CancellationToken::new() };
                e.insert( handle.clone());
                debug!("leased port {} (id {})", port, id);
                Some(handle)
            }
        }
    }

    /// return `port` to the free state. Only the lease holder (identified by `id`) can do this
    pub fn release (&self, port: u16, id: u64)->bool {
        let released = self.leases.remove_if( &port, |_,handle| handle.id == id).is_some();
        if released { debug!("released lease for port {} (id {})", port, id) }
        released
    }

    pub fn state (&self, port: u16)->LeaseState {
        match self.leases.get( &port) {
            Some(handle) => LeaseState::Listening( handle.value().clone()),
            None => LeaseState::Free
        }
    }

    pub fn is_listening (&self, port: u16)->bool { self.leases.contains_key( &port) }

    pub fn active_ports (&self)->Vec<u16> {
        let mut ports: Vec<u16> = self.leases.iter().map(|e| *e.key()).collect();
        ports.sort_unstable();
        ports
    }

    pub fn len (&self)->usize { self.leases.len() }

    pub fn is_empty (&self)->bool { self.leases.is_empty() }

    /// stop all current lease holders. Leases are not removed here - that is done by the readers when
    /// they exit (see [`LeaseGuard`])
    pub fn stop_all (&self) {
        let handles: Vec<ReaderHandle> = self.leases.iter().map(|e| e.value().clone()).collect();
        for handle in &handles {
            info!("stopping listener on port {}", handle.port);
            handle.stop();
        }
    }
}

/// RAII guard owned by the reader task that releases its lease exactly once, no matter how the reader exits
pub struct LeaseGuard {
    leases: Arc<LeaseTable>,
    port: u16,
    id: u64,
}

impl LeaseGuard {
    pub fn new (leases: Arc<LeaseTable>, handle: &ReaderHandle)->Self {
        LeaseGuard { leases, port: handle.port, id: handle.id }
    }
}

impl Drop for LeaseGuard {
    fn drop (&mut self) {
        self.leases.release( self.port, self.id);
    }
}
