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

//! vehicle readers and the bounded pool they run on
//!
//! A reader owns the socket of one port after the scanner has seen the first datagram on it. It runs a
//! blocking receive loop until the port was idle for `listener_timeout`, it gets stopped, or it runs into
//! an I/O error. In all cases the lease of the port is released when the reader exits, which is what
//! returns the port to the scanner

use std::{io::ErrorKind, net::SocketAddr, sync::{Arc,OnceLock}, time::{Duration,Instant}};
use chrono::Utc;
use tokio::{runtime::Handle, sync::Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug,error,info,trace};

use crate::aggregator::TelemetryAggregator;
use crate::codec::TelemetryDecoder;
use crate::errors::Result;
use crate::lease::{LeaseGuard,LeaseTable};
use crate::net::{Datagram,bind_udp};
use crate::scanner::ScanWaker;

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum HandoffOutcome {
    /// lease acquired and reader spawned with the datagram
    Spawned,
    /// somebody else holds the lease, the detection is a duplicate
    LeaseTaken,
    /// all readers busy, port stays with the scanner
    PoolExhausted,
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum ExitReason {
    Idle,
    Stopped,
}

/// what all readers share
pub struct ReaderContext {
    pub decoder: Arc<dyn TelemetryDecoder>,
    pub aggregator: Arc<TelemetryAggregator>,
    pub listener_timeout: Duration,
    pub buffer_size: usize,
}

impl ReaderContext {
    /// decode a datagram and feed the messages into the aggregator, returning the number of messages.
    /// Datagrams that fail to decode are dropped
    pub fn process (&self, port: u16, data: &[u8], sender: SocketAddr)->usize {
        if data.is_empty() { return 0 } // wakeup

        match self.decoder.decode( data) {
            Ok(msgs) => {
                let now = Utc::now();
                for msg in &msgs {
                    trace!("port {} from {}: {}", port, sender, msg);
                    self.aggregator.ingest( port, sender.ip(), msg, now);
                }
                msgs.len()
            }
            Err(e) => {
                debug!("port {}: dropped datagram from {}: {}", port, sender, e);
                0
            }
        }
    }
}

/// the blocking receive loop of a reader. `first` is the datagram the scanner received on this port. It is
/// processed before we bind, so that it is not lost if we can't get the socket
/// Only non-empty datagrams count as traffic. The read timeout is the time left until the idle deadline
pub fn run_reader (ctx: &ReaderContext, port: u16, first: Datagram, cancel: &CancellationToken)->Result<ExitReason> {
    ctx.process( port, &first.data, first.sender);

    let socket = bind_udp( port, false)?;
    info!("listener started on port {}", port);

    let mut buf = vec![0u8; ctx.buffer_size];
    let mut last_traffic = Instant::now();

    loop {
        if cancel.is_cancelled() { return Ok(ExitReason::Stopped) }

        let remaining = ctx.listener_timeout.saturating_sub( last_traffic.elapsed());
        if remaining.is_zero() { return Ok(ExitReason::Idle) }
        socket.set_read_timeout( Some(remaining))?;

        match socket.recv_from( &mut buf) {
            Ok((len,sender)) => {
                if cancel.is_cancelled() { return Ok(ExitReason::Stopped) }
                if len > 0 {
                    last_traffic = Instant::now();
                    ctx.process( port, &buf[..len], sender);
                }
            }
            Err(e) if matches!( e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {} // deadline checked above
            Err(e) => return Err(e.into())
        }
    }
}

/// runs readers as blocking tasks of a tokio runtime. The number of concurrently active readers is
/// capped by a semaphore
pub struct ReaderPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    size: usize,
    leases: Arc<LeaseTable>,
    ctx: Arc<ReaderContext>,
    scan_waker: Arc<OnceLock<ScanWaker>>,
}

impl ReaderPool {
    pub fn new (runtime: Handle, size: usize, leases: Arc<LeaseTable>, ctx: Arc<ReaderContext>)->Self {
        ReaderPool {
            runtime,
            permits: Arc::new( Semaphore::new( size)),
            size,
            leases,
            ctx,
            scan_waker: Arc::new( OnceLock::new()),
        }
    }

    /// the waker readers use to notify the scanner when they give back their port. Can only be set once
    pub fn set_scan_waker (&self, waker: ScanWaker) {
        if self.scan_waker.set( waker).is_err() {
            debug!("scan waker already set");
        }
    }

    pub fn size (&self)->usize { self.size }

    pub fn available (&self)->usize { self.permits.available_permits() }

    pub fn active (&self)->usize { self.size.saturating_sub( self.available()) }

    pub fn leases (&self)->&Arc<LeaseTable> { &self.leases }

    /// transfer `port` from the scanner to a new reader, passing on the datagram that was received on it
    /// `release_watch` is called once the lease is ours and has to close the scanner socket of this port
    /// before the reader binds its own. If the pool is exhausted or the lease is taken nothing happens
    pub fn try_handoff<F> (&self, port: u16, datagram: Datagram, release_watch: F)->HandoffOutcome where F: FnOnce() {
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            return HandoffOutcome::PoolExhausted
        };
        let Some(handle) = self.leases.try_acquire( port) else {
            return HandoffOutcome::LeaseTaken // permit goes back when dropped
        };

        release_watch();

        let guard = LeaseGuard::new( self.leases.clone(), &handle);
        let ctx = self.ctx.clone();
        let scan_waker = self.scan_waker.clone();

        self.runtime.spawn_blocking( move || {
            let _permit = permit;
            match run_reader( &ctx, port, datagram, handle.cancel_token()) {
                Ok(ExitReason::Idle) => info!("listener on port {} idle for {:?}, releasing port", port, ctx.listener_timeout),
                Ok(ExitReason::Stopped) => info!("listener on port {} stopped", port),
                Err(e) => error!("listener on port {} terminated: {}", port, e),
            }

            drop( guard); // socket is already closed at this point
            if let Some(waker) = scan_waker.get() { waker.wake() }
        });

        HandoffOutcome::Spawned
    }
}
