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

#![allow(unused)]

use std::{net::UdpSocket, sync::Arc, thread, time::{Duration,Instant}};
use mavlink::{MavHeader, ardupilotmega::*};
use odin_uav::{MavlinkDecoder, UavConfig, UavService};

// run with "cargo test --test test_service -- --nocapture"

fn free_port ()->u16 {
    UdpSocket::bind( "127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn wait_until<F> (timeout: Duration, mut cond: F)->bool where F: FnMut()->bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() { return true }
        thread::sleep( Duration::from_millis(20));
    }
    cond()
}

fn frame (msg: &MavMessage)->Vec<u8> {
    let mut buf = Vec::new();
    mavlink::write_v2_msg( &mut buf, MavHeader { system_id: 42, component_id: 1, sequence: 0 }, msg).unwrap();
    buf
}

fn position_frame (lat: i32)->Vec<u8> {
    frame( &MavMessage::GLOBAL_POSITION_INT( GLOBAL_POSITION_INT_DATA { lat, lon: -1_220_000_000, relative_alt: 1_000, ..Default::default() }))
}

fn test_config (ports: Vec<u32>)->UavConfig {
    UavConfig {
        ports,
        thread_pool_size: 4,
        listener_timeout_ms: 400,
        scanner_timeout_ms: 100,
        server_addr: "127.0.0.1:0".to_string(),
        shutdown_grace_ms: 1000,
        ..UavConfig::default()
    }
}

#[test]
fn test_scan_handoff_and_release() {
    let port = free_port();
    let service = UavService::start( test_config( vec![port as u32]), Arc::new( MavlinkDecoder::new())).unwrap();
    let client = UdpSocket::bind( "127.0.0.1:0").unwrap();

    // first contact, we keep sending until the scanner has its socket
    let contacted = wait_until( Duration::from_secs(3), || {
        client.send_to( &position_frame( 370_000_000), ("127.0.0.1", port)).unwrap();
        service.aggregator().snapshot( port).is_some()
    });
    assert!( contacted);
    assert!( service.leases().is_listening( port));

    let snap = service.aggregator().snapshot( port).unwrap();
    println!("first contact: {:?}", snap);
    assert_eq!( snap.system_id, 42);
    assert_eq!( snap.latitude, 37.0);

    // idle timeout gives the port back to the scanner
    assert!( wait_until( Duration::from_secs(3), || service.leases().is_empty()));

    // and the next datagram starts a new listener
    let recontacted = wait_until( Duration::from_secs(3), || {
        client.send_to( &position_frame( 380_000_000), ("127.0.0.1", port)).unwrap();
        service.aggregator().snapshot( port).map(|s| s.latitude == 38.0).unwrap_or(false)
    });
    assert!( recontacted);

    // the derived distance spans both listener sessions
    assert!( service.aggregator().snapshot( port).unwrap().dist_traveled > 100_000.0);
    assert!( service.publisher().last_published().is_some());

    service.shutdown().unwrap();
}

#[test]
fn test_single_datagram_reaches_listener() {
    let port = free_port();
    let service = UavService::start( test_config( vec![port as u32]), Arc::new( MavlinkDecoder::new())).unwrap();
    let client = UdpSocket::bind( "127.0.0.1:0").unwrap();

    assert!( wait_until( Duration::from_secs(3), || service.monitored_ports().contains( &port)));

    // exactly one datagram, which has to make it through the scanner into the listener
    client.send_to( &position_frame( 370_000_000), ("127.0.0.1", port)).unwrap();
    assert!( wait_until( Duration::from_secs(2), || service.aggregator().snapshot( port).is_some()));
    assert_eq!( service.aggregator().snapshot( port).unwrap().latitude, 37.0);
    assert!( !service.monitored_ports().contains( &port));

    // same for the first datagram after the listener went idle
    assert!( wait_until( Duration::from_secs(3), || service.leases().is_empty() && service.monitored_ports().contains( &port)));
    client.send_to( &position_frame( 380_000_000), ("127.0.0.1", port)).unwrap();
    assert!( wait_until( Duration::from_secs(2), || {
        service.aggregator().snapshot( port).map(|s| s.latitude == 38.0).unwrap_or(false)
    }));

    service.shutdown().unwrap();
}

#[test]
fn test_runtime_ports() {
    let service = UavService::start( test_config( vec![]), Arc::new( MavlinkDecoder::new())).unwrap();
    assert!( service.registry().is_empty());

    let port = free_port();
    assert_eq!( service.add_ports( vec![port as u32, 0]), vec![port]);

    let client = UdpSocket::bind( "127.0.0.1:0").unwrap();
    let contacted = wait_until( Duration::from_secs(3), || {
        client.send_to( &position_frame( 370_000_000), ("127.0.0.1", port)).unwrap();
        service.aggregator().snapshot( port).is_some()
    });
    assert!( contacted);

    assert_eq!( service.remove_ports( vec![port as u32]), vec![port]);
    assert!( service.registry().is_empty());

    // shutdown stops the active listener
    let start = Instant::now();
    service.shutdown().unwrap();
    println!("shutdown took {:?}", start.elapsed());
    assert!( start.elapsed() < Duration::from_secs(3));
}
