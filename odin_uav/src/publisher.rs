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

//! publication of telemetry snapshots to websocket clients, plus the HTTP routes to inspect and change
//! the set of watched ports

use std::{net::SocketAddr, sync::{Arc,Mutex}};
use axum::{
    Json, Router,
    extract::{State, ws::{Message,WebSocket,WebSocketUpgrade}, connect_info::ConnectInfo},
    response::Response,
    routing::get,
};
use futures::{SinkExt,StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug,info};

use crate::aggregator::TelemetrySnapshot;
use crate::errors::{OdinUavError,Result};
use crate::lease::LeaseTable;
use crate::registry::PortRegistry;
use crate::scanner::ScanWaker;

/// the outbound side of the aggregator. Implementations must not block
pub trait SnapshotPublisher: Send + Sync {
    fn publish (&self, snapshot: &TelemetrySnapshot)->Result<()>;
}

/* #region websocket publisher **********************************************************************************/

/// serializes each snapshot once and broadcasts the JSON text to all connected websockets
pub struct WsPublisher {
    tx: broadcast::Sender<String>,
    last: Mutex<Option<String>>,
}

impl WsPublisher {
    pub fn new (capacity: usize)->Self {
        let (tx,_) = broadcast::channel( capacity);
        WsPublisher { tx, last: Mutex::new(None) }
    }

    pub fn subscribe (&self)->broadcast::Receiver<String> { self.tx.subscribe() }

    pub fn subscriber_count (&self)->usize { self.tx.receiver_count() }

    /// the JSON of the last published snapshot, which is what new clients get first
    pub fn last_published (&self)->Option<String> {
        self.last.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl SnapshotPublisher for WsPublisher {
    fn publish (&self, snapshot: &TelemetrySnapshot)->Result<()> {
        let json = serde_json::to_string( snapshot)?;
        *self.last.lock().map_err(|e| OdinUavError::PublishError( e.to_string()))? = Some(json.clone());

        // no subscribers is not an error, there just is nobody to tell
        if self.tx.send( json).is_err() {
            debug!("no websocket subscribers");
        }
        Ok(())
    }
}

/* #endregion websocket publisher */

/* #region server ***********************************************************************************************/

#[derive(Clone)]
pub struct ServerState {
    pub publisher: Arc<WsPublisher>,
    pub registry: Arc<PortRegistry>,
    pub leases: Arc<LeaseTable>,
    pub scan_waker: Option<ScanWaker>,
}

#[derive(Serialize,Debug,Clone,PartialEq)]
pub struct PortStatus {
    pub watched: Vec<u16>,
    pub active: Vec<u16>,
}

pub fn build_router (state: ServerState, ws_path: &str)->Router {
    Router::new()
        .route( ws_path, get( ws_handler))
        .route( "/ports", get( get_ports).post( add_ports).delete( remove_ports))
        .with_state( state)
}

/// run the server until `cancel` is triggered
pub async fn serve (addr: SocketAddr, router: Router, cancel: CancellationToken)->Result<()> {
    let listener = tokio::net::TcpListener::bind( addr).await?;
    info!("serving http://{}", addr);

    axum::serve( listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown( async move { cancel.cancelled().await })
        .await?;

    info!("server on {} terminated", addr);
    Ok(())
}

async fn ws_handler (ws: WebSocketUpgrade, ConnectInfo(addr): ConnectInfo<SocketAddr>, State(state): State<ServerState>)->Response {
    ws.on_upgrade( move |socket| handle_socket( socket, addr, state.publisher))
}

async fn handle_socket (ws: WebSocket, remote_addr: SocketAddr, publisher: Arc<WsPublisher>) {
    info!("websocket connected: {}", remote_addr);

    let mut rx = publisher.subscribe(); // before we send the last snapshot so that we don't miss updates
    let (mut ws_sender, mut ws_receiver) = ws.split();

    if let Some(json) = publisher.last_published() {
        if ws_sender.send( Message::text( json)).await.is_err() {
            info!("websocket disconnected: {}", remote_addr);
            return
        }
    }

    let mut send_task = tokio::spawn( async move {
        loop {
            match rx.recv().await {
                Ok(json) => {
                    if ws_sender.send( Message::text( json)).await.is_err() { break }
                }
                Err(RecvError::Lagged(n)) => debug!("websocket {} lagging, skipped {} updates", remote_addr, n),
                Err(RecvError::Closed) => break
            }
        }
    });

    // we don't expect anything from clients, this is only to detect when they close
    let mut recv_task = tokio::spawn( async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if let Message::Close(_) = msg { break }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("websocket disconnected: {}", remote_addr);
}

async fn get_ports (State(state): State<ServerState>)->Json<PortStatus> {
    let watched = state.registry.list().into_iter().collect();
    let active = state.leases.active_ports();
    Json( PortStatus { watched, active })
}

async fn add_ports (State(state): State<ServerState>, Json(ports): Json<Vec<u32>>)->Json<Vec<u16>> {
    let added = state.registry.add( ports);
    if !added.is_empty() {
        if let Some(waker) = &state.scan_waker { waker.wake() }
    }
    Json(added)
}

async fn remove_ports (State(state): State<ServerState>, Json(ports): Json<Vec<u32>>)->Json<Vec<u16>> {
    let removed = state.registry.remove( ports);
    if !removed.is_empty() {
        if let Some(waker) = &state.scan_waker { waker.wake() }
    }
    Json(removed)
}

/* #endregion server */
