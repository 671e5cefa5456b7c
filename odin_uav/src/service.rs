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

use std::sync::Arc;
use tokio::runtime::{Builder,Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{error,info,warn};

use crate::aggregator::TelemetryAggregator;
use crate::codec::TelemetryDecoder;
use crate::config::UavConfig;
use crate::errors::{OdinUavError,Result};
use crate::lease::LeaseTable;
use crate::publisher::{ServerState,WsPublisher,build_router,serve};
use crate::reader::{ReaderContext,ReaderPool};
use crate::registry::PortRegistry;
use crate::scanner::{PortScanner,ScanWaker,ScannerHandle};

/// blocking threads on top of the reader pool size, for runtime internals such as file or DNS I/O
const BLOCKING_SLACK: usize = 4;

/// a running telemetry hub: scanner thread, reader pool and web server
/// Dropping the service shuts it down, `shutdown()` does the same but reports scanner errors
pub struct UavService {
    config: UavConfig,
    runtime: Option<Runtime>,
    cancel: CancellationToken,

    registry: Arc<PortRegistry>,
    leases: Arc<LeaseTable>,
    publisher: Arc<WsPublisher>,
    aggregator: Arc<TelemetryAggregator>,
    pool: Arc<ReaderPool>,
    scan_waker: ScanWaker,
    scanner: Option<ScannerHandle>,
}

impl UavService {
    pub fn start (config: UavConfig, decoder: Arc<dyn TelemetryDecoder>)->Result<Self> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .thread_name("uav-worker")
            .max_blocking_threads( config.thread_pool_size + BLOCKING_SLACK)
            .enable_all()
            .build()?;
        let cancel = CancellationToken::new();

        let registry = Arc::new( PortRegistry::from_config( &config));
        registry.add( config.ports.iter().copied());

        let leases = Arc::new( LeaseTable::new());
        let publisher = Arc::new( WsPublisher::new( config.publish_capacity));
        let aggregator = Arc::new( TelemetryAggregator::new( publisher.clone()));

        let ctx = Arc::new( ReaderContext {
            decoder,
            aggregator: aggregator.clone(),
            listener_timeout: config.listener_timeout(),
            buffer_size: config.buffer_size,
        });
        let pool = Arc::new( ReaderPool::new( runtime.handle().clone(), config.thread_pool_size, leases.clone(), ctx));

        let scanner = PortScanner::new( registry.clone(), leases.clone(), pool.clone(),
                                        config.scanner_timeout(), config.buffer_size, cancel.clone())?;
        let scan_waker = scanner.waker();
        pool.set_scan_waker( scan_waker.clone());

        let state = ServerState {
            publisher: publisher.clone(),
            registry: registry.clone(),
            leases: leases.clone(),
            scan_waker: Some(scan_waker.clone()),
        };
        let router = build_router( state, &config.ws_path);
        let addr = config.server_socket_addr()?;
        let server_cancel = cancel.clone();
        runtime.spawn( async move {
            if let Err(e) = serve( addr, router, server_cancel).await {
                error!("server on {} failed: {}", addr, e);
            }
        });

        let scanner = Some( scanner.spawn()?);
        info!("UAV telemetry hub started with {} ports, max {} active listeners", registry.len(), config.thread_pool_size);

        Ok( UavService { config, runtime: Some(runtime), cancel, registry, leases, publisher, aggregator, pool, scan_waker, scanner })
    }

    pub fn config (&self)->&UavConfig { &self.config }
    pub fn registry (&self)->&Arc<PortRegistry> { &self.registry }
    pub fn leases (&self)->&Arc<LeaseTable> { &self.leases }
    pub fn publisher (&self)->&Arc<WsPublisher> { &self.publisher }
    pub fn aggregator (&self)->&Arc<TelemetryAggregator> { &self.aggregator }
    pub fn pool (&self)->&Arc<ReaderPool> { &self.pool }
    pub fn cancel_token (&self)->&CancellationToken { &self.cancel }

    /// ports the scanner is waiting on, i.e. registered ports without an active listener
    pub fn monitored_ports (&self)->Vec<u16> {
        self.scanner.as_ref().map( |s| s.monitored_ports()).unwrap_or_default()
    }

    /// add ports at runtime, returning the ones that were accepted
    pub fn add_ports<I> (&self, ports: I)->Vec<u16> where I: IntoIterator<Item=u32> {
        let added = self.registry.add( ports);
        if !added.is_empty() { self.scan_waker.wake() }
        added
    }

    pub fn remove_ports<I> (&self, ports: I)->Vec<u16> where I: IntoIterator<Item=u32> {
        let removed = self.registry.remove( ports);
        if !removed.is_empty() { self.scan_waker.wake() }
        removed
    }

    /// block the calling thread until we get a ctrl-c or the service is cancelled
    pub fn block_on_ctrl_c (&self)->Result<()> {
        let runtime = self.runtime.as_ref().ok_or_else(|| OdinUavError::OpFailedError( "service already shut down".to_string()))?;
        let cancel = self.cancel.clone();

        runtime.block_on( async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    res.map( |_| info!("received ctrl-c")).map_err( OdinUavError::from)
                }
                _ = cancel.cancelled() => Ok(())
            }
        })
    }

    /// ordered shutdown: scanner first, then readers, then the runtime with a grace period
    pub fn shutdown (mut self)->Result<()> {
        self.terminate()
    }

    fn terminate (&mut self)->Result<()> {
        let Some(runtime) = self.runtime.take() else { return Ok(()) };
        info!("shutting down UAV telemetry hub");

        self.cancel.cancel();

        let mut result = Ok(());
        if let Some(scanner) = self.scanner.take() {
            scanner.stop();
            result = scanner.join();
        }

        self.leases.stop_all();
        runtime.shutdown_timeout( self.config.shutdown_grace());

        if !self.leases.is_empty() {
            warn!("abandoned listeners on ports {:?}", self.leases.active_ports());
        }
        info!("UAV telemetry hub terminated");
        result
    }
}

impl Drop for UavService {
    fn drop (&mut self) {
        if let Err(e) = self.terminate() {
            error!("error during shutdown: {}", e);
        }
    }
}
