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

//! the boundary to the MAVLink codec
//! We only keep the fields we use, in their raw protocol encoding. Conversion into engineering units
//! happens when they are applied to a vehicle (see `telemetry`)

use std::{fmt, io::Cursor};
use mavlink::{MAV_STX, MAV_STX_V2, Message, peek_reader::PeekReader, error::MessageReadError, ardupilotmega::MavMessage};
use crate::errors::{OdinUavError,Result,decode_error};

/// the decoded message kinds we process. Everything else ends up as `Other`
#[derive(Debug,Clone,PartialEq)]
pub enum TelemetryMsg {
    /// GLOBAL_POSITION_INT - lat/lon in degE7, relative altitude in mm, velocities in cm/s, heading in cdeg
    GlobalPosition { lat: i32, lon: i32, relative_alt: i32, vx: i16, vy: i16, vz: i16, hdg: u16 },
    /// SYS_STATUS - battery voltage in mV, current in cA
    SysStatus { voltage_battery: u16, current_battery: i16 },
    /// VFR_HUD - speeds in m/s, heading in deg
    VfrHud { airspeed: f32, groundspeed: f32, climb: f32, heading: i16 },
    /// WIND (ardupilotmega) - speed in m/s
    Wind { speed: f32 },
    /// GPS_RAW_INT - eph is HDOP * 100
    GpsRaw { eph: u16 },
    /// ATTITUDE - radians
    Attitude { roll: f32, pitch: f32, yaw: f32 },
    /// SERVO_OUTPUT_RAW - PWM values of channels 1..16
    ServoOutput { channels: [u16;16] },
    /// MISSION_COUNT
    MissionCount { count: u16 },
    /// MISSION_ITEM_INT - x/y in degE7, z in m
    MissionItem { seq: u16, x: i32, y: i32, z: f32 },
    /// NAV_CONTROLLER_OUTPUT - waypoint distance in m, target bearing in deg
    NavController { wp_dist: u16, target_bearing: i16 },

    Other { msg_id: u32 }
}

impl TelemetryMsg {
    pub fn name (&self)->&'static str {
        match self {
            TelemetryMsg::GlobalPosition{..} => "GlobalPosition",
            TelemetryMsg::SysStatus{..} => "SysStatus",
            TelemetryMsg::VfrHud{..} => "VfrHud",
            TelemetryMsg::Wind{..} => "Wind",
            TelemetryMsg::GpsRaw{..} => "GpsRaw",
            TelemetryMsg::Attitude{..} => "Attitude",
            TelemetryMsg::ServoOutput{..} => "ServoOutput",
            TelemetryMsg::MissionCount{..} => "MissionCount",
            TelemetryMsg::MissionItem{..} => "MissionItem",
            TelemetryMsg::NavController{..} => "NavController",
            TelemetryMsg::Other{..} => "Other"
        }
    }
}

impl From<&MavMessage> for TelemetryMsg {
    fn from (msg: &MavMessage)->Self {
        match msg {
            MavMessage::GLOBAL_POSITION_INT(d) => TelemetryMsg::GlobalPosition {
                lat: d.lat, lon: d.lon, relative_alt: d.relative_alt, vx: d.vx, vy: d.vy, vz: d.vz, hdg: d.hdg
            },
            MavMessage::SYS_STATUS(d) => TelemetryMsg::SysStatus { voltage_battery: d.voltage_battery, current_battery: d.current_battery },
            MavMessage::VFR_HUD(d) => TelemetryMsg::VfrHud { airspeed: d.airspeed, groundspeed: d.groundspeed, climb: d.climb, heading: d.heading },
            MavMessage::WIND(d) => TelemetryMsg::Wind { speed: d.speed },
            MavMessage::GPS_RAW_INT(d) => TelemetryMsg::GpsRaw { eph: d.eph },
            MavMessage::ATTITUDE(d) => TelemetryMsg::Attitude { roll: d.roll, pitch: d.pitch, yaw: d.yaw },
            MavMessage::SERVO_OUTPUT_RAW(d) => TelemetryMsg::ServoOutput {
                channels: [
                    d.servo1_raw, d.servo2_raw, d.servo3_raw, d.servo4_raw, d.servo5_raw, d.servo6_raw, d.servo7_raw, d.servo8_raw,
                    d.servo9_raw, d.servo10_raw, d.servo11_raw, d.servo12_raw, d.servo13_raw, d.servo14_raw, d.servo15_raw, d.servo16_raw
                ]
            },
            MavMessage::MISSION_COUNT(d) => TelemetryMsg::MissionCount { count: d.count },
            MavMessage::MISSION_ITEM_INT(d) => TelemetryMsg::MissionItem { seq: d.seq, x: d.x, y: d.y, z: d.z },
            MavMessage::NAV_CONTROLLER_OUTPUT(d) => TelemetryMsg::NavController { wp_dist: d.wp_dist, target_bearing: d.target_bearing },
            other => TelemetryMsg::Other { msg_id: other.message_id() }
        }
    }
}

/// a decoded message plus the system id of its origin
#[derive(Debug,Clone,PartialEq)]
pub struct Decoded {
    pub system_id: u8,
    pub msg: TelemetryMsg,
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "{}( sys: {} )", self.msg.name(), self.system_id)
    }
}

/// what the readers use to turn datagrams into messages
pub trait TelemetryDecoder: Send + Sync + 'static {
    /// decode all messages contained in one datagram. An error means the datagram had to be dropped,
    /// which is never fatal for the reader
    fn decode (&self, datagram: &[u8])->Result<Vec<Decoded>>;
}

/// MAVLink decoder for the ardupilotmega dialect (which includes the common message set)
/// Accepts v1 and v2 frames, also mixed within the same datagram
#[derive(Debug,Default,Clone,Copy)]
pub struct MavlinkDecoder;

impl MavlinkDecoder {
    pub fn new ()->Self { MavlinkDecoder }
}

impl TelemetryDecoder for MavlinkDecoder {
    fn decode (&self, datagram: &[u8])->Result<Vec<Decoded>> {
        let mut reader = PeekReader::new( Cursor::new( datagram));
        let mut decoded = Vec::new();
        let mut last_error: Option<String> = None;

        // each pass consumes at least one byte, which bounds the loop
        for _ in 0..=datagram.len() {
            let Ok(magic) = reader.peek_exact(1).map(|b| b[0]) else { break }; // end of datagram

            let res = match magic {
                MAV_STX_V2 => mavlink::read_v2_msg::<MavMessage,_>( &mut reader),
                MAV_STX => mavlink::read_v1_msg::<MavMessage,_>( &mut reader),
                _ => { reader.consume(1); continue } // not at a frame start
            };

            match res {
                Ok((header,msg)) => {
                    decoded.push( Decoded { system_id: header.system_id, msg: TelemetryMsg::from( &msg) })
                }
                Err(MessageReadError::Parse(e)) => last_error = Some( e.to_string()),
                Err(MessageReadError::Io(_)) => break // truncated frame at end of datagram
            }
        }

        match last_error {
            Some(e) if decoded.is_empty() => Err( decode_error!("no valid MAVLink frame in {} byte datagram: {}", datagram.len(), e)),
            _ => Ok(decoded)
        }
    }
}
