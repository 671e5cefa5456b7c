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

//! the port scanner watches all registered ports that are not owned by a reader with one readiness
//! poll on a single thread. The first datagram on a port hands it over to a reader

use std::{collections::HashMap, io::ErrorKind, sync::Arc, thread::{self,JoinHandle}, time::Duration};
use dashmap::DashSet;
use mio::{Events, Interest, Poll, Token, Waker, net::UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug,error,info,warn};

use crate::errors::{OdinUavError,Result};
use crate::lease::LeaseTable;
use crate::net::{Datagram,bind_udp};
use crate::reader::{HandoffOutcome,ReaderPool};
use crate::registry::PortRegistry;

const WAKE_TOKEN: Token = Token(usize::MAX);
const EVENT_CAPACITY: usize = 128;

/// wakes up the scanner so that it reconciles its watch set right away (e.g. after a port was released)
#[derive(Debug,Clone)]
pub struct ScanWaker(Arc<Waker>);

impl ScanWaker {
    pub fn wake (&self) {
        if let Err(e) = self.0.wake() {
            debug!("failed to wake port scanner: {}", e);
        }
    }
}

pub struct PortScanner {
    poll: Poll,
    waker: ScanWaker,
    registry: Arc<PortRegistry>,
    leases: Arc<LeaseTable>,
    pool: Arc<ReaderPool>,
    watched: HashMap<u16,UdpSocket>,
    monitored: Arc<DashSet<u16>>, // mirror of `watched` keys for other threads
    buf: Vec<u8>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl PortScanner {
    pub fn new (registry: Arc<PortRegistry>, leases: Arc<LeaseTable>, pool: Arc<ReaderPool>,
                timeout: Duration, buffer_size: usize, cancel: CancellationToken)->Result<Self> {
        let poll = Poll::new()?;
        let waker = ScanWaker( Arc::new( Waker::new( poll.registry(), WAKE_TOKEN)?));

        Ok( PortScanner {
            poll, waker, registry, leases, pool,
            watched: HashMap::new(),
            monitored: Arc::new( DashSet::new()),
            buf: vec![0u8; buffer_size],
            timeout, cancel
        })
    }

    pub fn waker (&self)->ScanWaker { self.waker.clone() }

    /// run the scanner loop on its own thread
    pub fn spawn (self)->Result<ScannerHandle> {
        let waker = self.waker.clone();
        let cancel = self.cancel.clone();
        let monitored = self.monitored.clone();
        let join = thread::Builder::new()
            .name("port-scanner".to_string())
            .spawn( move || self.run())?;

        Ok( ScannerHandle { waker, cancel, monitored, join })
    }

    /// the scanner loop, which runs until the cancel token is triggered or the poll fails
    pub fn run (mut self)->Result<()> {
        info!("port scanner started");
        let mut events = Events::with_capacity( EVENT_CAPACITY);

        let result = loop {
            if self.cancel.is_cancelled() { break Ok(()) }

            self.reconcile();

            if let Err(e) = self.poll.poll( &mut events, Some(self.timeout)) {
                if e.kind() == ErrorKind::Interrupted { continue }
                if self.cancel.is_cancelled() { break Ok(()) }
                error!("port scanner poll failed: {}", e);
                break Err(e.into())
            }

            for event in events.iter() {
                match event.token() {
                    WAKE_TOKEN => {} // just reconcile
                    Token(port) => self.handle_readable( port as u16)
                }
            }
        };

        self.close_all();
        info!("port scanner terminated");
        result
    }

    /// watch every registered port that has neither a socket nor a lease, stop watching ports that were removed
    fn reconcile (&mut self) {
        let ports = self.registry.list();

        let removed: Vec<u16> = self.watched.keys().filter(|p| !ports.contains(*p)).copied().collect();
        for port in removed {
            self.unwatch( port);
            info!("stopped monitoring port {}", port);
        }

        for port in ports {
            if !self.watched.contains_key( &port) && !self.leases.is_listening( port) {
                self.watch( port);
            }
        }
    }

    fn watch (&mut self, port: u16) {
        match bind_udp( port, true) {
            Ok(socket) => {
                let mut socket = UdpSocket::from_std( socket);
                match self.poll.registry().register( &mut socket, Token(port as usize), Interest::READABLE) {
                    Ok(()) => {
                        self.watched.insert( port, socket);
                        self.monitored.insert( port);
                        info!("monitoring port {}", port);
                    }
                    Err(e) => debug!("failed to register port {}: {}", port, e)
                }
            }
            Err(e) => debug!("cannot bind port {}, retrying on next pass: {}", port, e)
        }
    }

    fn unwatch (&mut self, port: u16) {
        self.monitored.remove( &port);
        if let Some(mut socket) = self.watched.remove( &port) {
            if let Err(e) = self.poll.registry().deregister( &mut socket) {
                debug!("failed to deregister port {}: {}", port, e);
            }
        }
    }

    fn handle_readable (&mut self, port: u16) {
        let Some(socket) = self.watched.get( &port) else { return };

        let (len,sender) = match socket.recv_from( &mut self.buf) {
            Ok(res) => res,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return,
            Err(e) => {
                debug!("receive on port {} failed: {}", port, e);
                return
            }
        };

        if len == 0 {
            self.drain( port);
            return
        }

        let datagram = Datagram::new( &self.buf[..len], sender);
        let watched = &mut self.watched;
        let monitored = &self.monitored;
        let registry = self.poll.registry();

        let outcome = self.pool.try_handoff( port, datagram, || {
            monitored.remove( &port);
            if let Some(mut socket) = watched.remove( &port) {
                if let Err(e) = registry.deregister( &mut socket) {
                    debug!("failed to deregister port {}: {}", port, e);
                }
            }
        });

        match outcome {
            HandoffOutcome::Spawned => info!("first packet on port {} from {}, handed off to listener", port, sender),
            HandoffOutcome::LeaseTaken => {
                debug!("port {} already has a listener, ignoring detection", port);
                self.drain( port);
            }
            HandoffOutcome::PoolExhausted => {
                warn!("no listener available for port {} ({} active)", port, self.pool.active());
                self.drain( port);
            }
        }
    }

    // readiness is edge triggered, so we have to empty the socket if we keep it
    fn drain (&mut self, port: u16) {
        if let Some(socket) = self.watched.get( &port) {
            loop {
                match socket.recv_from( &mut self.buf) {
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(_) => break
                }
            }
        }
    }

    fn close_all (&mut self) {
        let ports: Vec<u16> = self.watched.keys().copied().collect();
        for port in ports {
            self.unwatch( port);
        }
    }
}

/// control handle of a running scanner thread
pub struct ScannerHandle {
    waker: ScanWaker,
    cancel: CancellationToken,
    monitored: Arc<DashSet<u16>>,
    join: JoinHandle<Result<()>>,
}

impl ScannerHandle {
    pub fn waker (&self)->ScanWaker { self.waker.clone() }

    pub fn stop (&self) {
        self.cancel.cancel();
        self.waker.wake();
    }

    /// the ports that currently have a scanner socket, in ascending order
    pub fn monitored_ports (&self)->Vec<u16> {
        let mut ports: Vec<u16> = self.monitored.iter().map(|p| *p).collect();
        ports.sort_unstable();
        ports
    }

    pub fn is_finished (&self)->bool { self.join.is_finished() }

    /// wait for the scanner thread to terminate. This does not stop it
    pub fn join (self)->Result<()> {
        self.join.join().map_err(|_| OdinUavError::OpFailedError( "port scanner panicked".to_string()))?
    }
}
