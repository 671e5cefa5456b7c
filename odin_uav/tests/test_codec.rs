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

use mavlink::{MavHeader, ardupilotmega::*};
use odin_uav::codec::{MavlinkDecoder,TelemetryDecoder,TelemetryMsg};

// run with "cargo test --test test_codec -- --nocapture"

fn frame (system_id: u8, msg: &MavMessage)->Vec<u8> {
    let mut buf = Vec::new();
    let header = MavHeader { system_id, component_id: 1, sequence: 0 };
    mavlink::write_v2_msg( &mut buf, header, msg).unwrap();
    buf
}

fn frame_v1 (system_id: u8, msg: &MavMessage)->Vec<u8> {
    let mut buf = Vec::new();
    let header = MavHeader { system_id, component_id: 1, sequence: 0 };
    mavlink::write_v1_msg( &mut buf, header, msg).unwrap();
    buf
}

fn global_position ()->MavMessage {
    MavMessage::GLOBAL_POSITION_INT( GLOBAL_POSITION_INT_DATA {
        lat: 371_234_567,
        lon: -1_221_234_567,
        relative_alt: 12_000,
        vx: 300, vy: 400, vz: -50,
        hdg: 9000,
        ..Default::default()
    })
}

#[test]
fn test_decode_position() {
    let bytes = frame( 7, &global_position());
    println!("frame: {} bytes", bytes.len());

    let msgs = MavlinkDecoder::new().decode( &bytes).unwrap();
    println!("decoded: {:?}", msgs);

    assert_eq!( msgs.len(), 1);
    assert_eq!( msgs[0].system_id, 7);
    assert_eq!( msgs[0].msg, TelemetryMsg::GlobalPosition {
        lat: 371_234_567, lon: -1_221_234_567, relative_alt: 12_000, vx: 300, vy: 400, vz: -50, hdg: 9000
    });
}

#[test]
fn test_decode_multiple_frames() {
    let mut bytes = frame( 1, &global_position());
    bytes.extend( frame( 1, &MavMessage::VFR_HUD( VFR_HUD_DATA { airspeed: 12.0, groundspeed: 11.5, heading: 270, ..Default::default() })));
    bytes.extend( frame( 1, &MavMessage::HEARTBEAT( HEARTBEAT_DATA::default())));

    let msgs = MavlinkDecoder::new().decode( &bytes).unwrap();
    for m in &msgs { println!("{}", m); }

    assert_eq!( msgs.len(), 3);
    assert!( matches!( msgs[1].msg, TelemetryMsg::VfrHud { heading: 270, .. }));
    assert_eq!( msgs[2].msg, TelemetryMsg::Other { msg_id: 0 }); // heartbeat is not processed
}

#[test]
fn test_decode_v1_frames() {
    let bytes = frame_v1( 3, &global_position());
    println!("v1 frame: {} bytes, magic {:#x}", bytes.len(), bytes[0]);
    assert_eq!( bytes[0], 0xfe);

    let msgs = MavlinkDecoder::new().decode( &bytes).unwrap();
    assert_eq!( msgs.len(), 1);
    assert_eq!( msgs[0].system_id, 3);
    assert!( matches!( msgs[0].msg, TelemetryMsg::GlobalPosition { lat: 371_234_567, hdg: 9000, .. }));

    // v1 and v2 frames mixed in one datagram
    let mut bytes = frame_v1( 3, &MavMessage::WIND( WIND_DATA { speed: 2.0, ..Default::default() }));
    bytes.extend( frame( 3, &global_position()));
    bytes.extend( frame_v1( 3, &MavMessage::MISSION_COUNT( MISSION_COUNT_DATA { count: 2, ..Default::default() })));

    let msgs: Vec<TelemetryMsg> = MavlinkDecoder::new().decode( &bytes).unwrap().into_iter().map(|d| d.msg).collect();
    assert_eq!( msgs.len(), 3);
    assert_eq!( msgs[0], TelemetryMsg::Wind { speed: 2.0 });
    assert!( matches!( msgs[1], TelemetryMsg::GlobalPosition { .. }));
    assert_eq!( msgs[2], TelemetryMsg::MissionCount { count: 2 });
}

#[test]
fn test_decode_servo_extensions() {
    let msg = MavMessage::SERVO_OUTPUT_RAW( SERVO_OUTPUT_RAW_DATA {
        servo3_raw: 1600,
        servo9_raw: 1100,
        servo12_raw: 1900,
        servo16_raw: 1500,
        ..Default::default()
    });
    let msgs = MavlinkDecoder::new().decode( &frame( 1, &msg)).unwrap();

    match &msgs[0].msg {
        TelemetryMsg::ServoOutput { channels } => {
            assert_eq!( channels[2], 1600);
            assert_eq!( channels[8], 1100);
            assert_eq!( channels[11], 1900);
            assert_eq!( channels[15], 1500);
        }
        other => panic!("unexpected message {:?}", other)
    }
}

#[test]
fn test_decode_mission_and_wind() {
    let mut bytes = frame( 1, &MavMessage::MISSION_COUNT( MISSION_COUNT_DATA { count: 4, ..Default::default() }));
    bytes.extend( frame( 1, &MavMessage::MISSION_ITEM_INT( MISSION_ITEM_INT_DATA { seq: 0, x: 370_000_000, y: -1_220_000_000, z: 30.0, ..Default::default() })));
    bytes.extend( frame( 1, &MavMessage::WIND( WIND_DATA { speed: 3.5, ..Default::default() })));

    let msgs: Vec<TelemetryMsg> = MavlinkDecoder::new().decode( &bytes).unwrap().into_iter().map(|d| d.msg).collect();
    assert_eq!( msgs, vec![
        TelemetryMsg::MissionCount { count: 4 },
        TelemetryMsg::MissionItem { seq: 0, x: 370_000_000, y: -1_220_000_000, z: 30.0 },
        TelemetryMsg::Wind { speed: 3.5 },
    ]);
}

#[test]
fn test_decode_garbage() {
    let decoder = MavlinkDecoder::new();

    // no frame at all
    let res = decoder.decode( b"this is not a MAVLink frame");
    println!("garbage: {:?}", res);
    assert!( res.map(|msgs| msgs.is_empty()).unwrap_or(true));

    // corrupted frame followed by a valid one
    let mut bytes = frame( 1, &global_position());
    let n = bytes.len();
    bytes[n-1] ^= 0xff; // break checksum
    bytes.extend( frame( 2, &global_position()));

    let msgs = decoder.decode( &bytes).unwrap();
    assert_eq!( msgs.len(), 1);
    assert_eq!( msgs[0].system_id, 2);
}
