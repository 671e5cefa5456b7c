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

//! UDP socket helpers shared by the port scanner and the vehicle readers

use std::{io, net::{Ipv4Addr,SocketAddr,UdpSocket}};
use socket2::{Domain,Protocol,Socket,Type};

/// a received datagram together with its sender, which is what the scanner hands over to a reader
#[derive(Debug,Clone)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub sender: SocketAddr,
}

impl Datagram {
    pub fn new (data: &[u8], sender: SocketAddr)->Self { Datagram { data: data.to_vec(), sender } }
}

/// bind a UDP socket to 0.0.0.0:❬port❭ with SO_REUSEADDR set
/// The scanner and the reader for the same port bind one after the other, and we don't want to depend
/// on how fast the OS recycles the address in between
pub fn bind_udp (port: u16, nonblocking: bool)->io::Result<UdpSocket> {
    let socket = Socket::new( Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(nonblocking)?;

    let addr = SocketAddr::from( (Ipv4Addr::UNSPECIFIED, port));
    socket.bind( &addr.into())?;

    Ok( socket.into())
}

/// send an empty datagram to a local port, which is how we interrupt a reader that is blocked in recv
pub fn wake_listener (port: u16)->io::Result<()> {
    let socket = UdpSocket::bind( (Ipv4Addr::LOCALHOST, 0))?;
    socket.send_to( &[], (Ipv4Addr::LOCALHOST, port))?;
    Ok(())
}
