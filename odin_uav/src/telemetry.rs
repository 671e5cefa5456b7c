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

//! per-vehicle telemetry state and the derived quantities we compute from it
//! All time dependent functions take an explicit `now` so that they can be tested without a clock

use chrono::{DateTime,Utc};
use geo::{Distance, Point};
use geo::algorithm::line_measures::metric_spaces::Haversine;
use serde::Serialize;
use uom::si::{
    f64::{Angle,ElectricCurrent,ElectricPotential,Length,Velocity},
    angle::{degree,radian}, electric_current::{ampere,centiampere}, electric_potential::{millivolt,volt},
    length::{meter,millimeter}, velocity::{centimeter_per_second,meter_per_second}
};

use crate::codec::{Decoded,TelemetryMsg};

/// relative altitude above which a vehicle is considered to be airborne
pub const AIRBORNE_ALTITUDE: f64 = 0.5; // [m]

/// channel 3 (throttle) PWM value above which the vehicle is flying under power
pub const THROTTLE_ACTIVE_PWM: u16 = 1050;

pub const UNKNOWN_GCS_IP: &str = "Unknown";

// protocol values that mean "not known"
const UNKNOWN_HDG: u16 = u16::MAX;
const UNKNOWN_VOLTAGE: u16 = u16::MAX;
const UNKNOWN_CURRENT: i16 = -1;
const UNKNOWN_EPH: u16 = u16::MAX;

/* #region helpers **********************************************************************************************/

/// great circle distance between two points given in degrees
pub fn haversine_distance (lat1: f64, lon1: f64, lat2: f64, lon2: f64)->Length {
    let dist = Haversine.distance( Point::new( lon1, lat1), Point::new( lon2, lat2));
    Length::new::<meter>(dist)
}

#[inline]
pub fn round2 (v: f64)->f64 { (v * 100.0).round() / 100.0 }

/// elapsed seconds between two timestamps, clamped to 0 if the clock went backwards
pub fn secs_between (from: DateTime<Utc>, to: DateTime<Utc>)->f64 {
    let millis = (to - from).num_milliseconds();
    if millis > 0 { millis as f64 / 1000.0 } else { 0.0 }
}

#[inline]
fn degrees_from_radians (rad: f32)->f64 { Angle::new::<radian>( rad as f64).get::<degree>() }

/* #endregion helpers */

/* #region state machines ***************************************************************************************/

/// accumulates the time spent in an active phase (e.g. airborne)
/// Each rising edge records a start time, the running total is `accumulated + (now - start)` while active and
/// is frozen at the falling edge. Multiple active phases add up
#[derive(Debug,Clone,Default)]
pub struct PhaseTimer {
    start: Option<DateTime<Utc>>,
    accumulated: f64,
    total: f64,
}

impl PhaseTimer {
    pub fn is_active (&self)->bool { self.start.is_some() }

    /// feed a new sample and return the total active seconds
    pub fn update (&mut self, active: bool, now: DateTime<Utc>)->f64 {
        match (self.start, active) {
            (None, true) => {
                self.start = Some(now);
                self.total = self.accumulated;
            }
            (Some(start), true) => {
                self.total = self.accumulated + secs_between( start, now);
            }
            (Some(start), false) => {
                self.accumulated += secs_between( start, now);
                self.total = self.accumulated;
                self.start = None;
            }
            (None, false) => {}
        }
        self.total
    }

    pub fn total (&self)->f64 { self.total }
}

/// accumulates throttle-on time on every sample while active, not just on transitions
/// The interval between the last sample and `now` counts if the previous sample was active. The falling
/// sample therefore does not add anything
#[derive(Debug,Clone,Default)]
pub struct ThrottleAccumulator {
    last_active: Option<DateTime<Utc>>,
    total: f64,
}

impl ThrottleAccumulator {
    pub fn is_active (&self)->bool { self.last_active.is_some() }

    pub fn update (&mut self, active: bool, now: DateTime<Utc>)->f64 {
        if active {
            if let Some(last) = self.last_active {
                self.total += secs_between( last, now);
            }
            self.last_active = Some(now);
        } else {
            self.last_active = None;
        }
        self.total
    }

    pub fn total (&self)->f64 { self.total }
}

/* #endregion state machines */

/* #region snapshot *********************************************************************************************/

#[derive(Serialize,Debug,Clone,Copy,PartialEq,Default)]
pub struct Waypoint {
    pub seq: u16,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

#[derive(Serialize,Debug,Clone,Copy,PartialEq,Default)]
pub struct HomeLocation {
    pub lat: f64,
    pub lon: f64,
}

/// what we publish for each vehicle. Units are degrees, meters, m/s, V, A and seconds
#[derive(Serialize,Debug,Clone,PartialEq)]
#[serde(rename_all="camelCase")]
pub struct VehicleSnapshot {
    pub port: u16,
    pub system_id: u8,
    pub gcs_ip: String,

    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading: f64,
    pub ground_speed: f64,
    pub vertical_speed: f64,

    pub airspeed: f64,
    pub wind_velocity: f64,
    pub gps_hdop: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,

    pub battery_voltage: f64,
    pub battery_current: f64,

    pub waypoints: Vec<Waypoint>,
    pub waypoints_count: usize,
    pub home_location: HomeLocation,

    pub flight_status: u8,
    pub time_in_air: f64,
    pub auto_time: f64,
    pub throttle_active: bool,
    pub throttle_time_in_air: f64,
    pub dist_traveled: f64,
    pub dist_to_home: f64,
    pub wp_dist: f64,
    pub target_heading: f64,
    pub previous_heading: f64,

    #[serde(rename="ch3percent")] pub ch3_percent: f64,
    #[serde(rename="ch3out")] pub ch3_out: u16,
    #[serde(rename="ch9out")] pub ch9_out: u16,
    #[serde(rename="ch10out")] pub ch10_out: u16,
    #[serde(rename="ch11out")] pub ch11_out: u16,
    #[serde(rename="ch12out")] pub ch12_out: u16,

    pub tot: f64,
    pub toh: f64,

    pub timestamp: i64, // epoch millis of last update
}

impl VehicleSnapshot {
    pub fn new (port: u16)->Self {
        VehicleSnapshot {
            port, system_id: 0, gcs_ip: UNKNOWN_GCS_IP.to_string(),
            latitude: 0.0, longitude: 0.0, altitude: 0.0, heading: 0.0, ground_speed: 0.0, vertical_speed: 0.0,
            airspeed: 0.0, wind_velocity: 0.0, gps_hdop: 0.0, roll: 0.0, pitch: 0.0, yaw: 0.0,
            battery_voltage: 0.0, battery_current: 0.0,
            waypoints: Vec::new(), waypoints_count: 0, home_location: HomeLocation::default(),
            flight_status: 0, time_in_air: 0.0, auto_time: 0.0, throttle_active: false, throttle_time_in_air: 0.0,
            dist_traveled: 0.0, dist_to_home: 0.0, wp_dist: 0.0, target_heading: 0.0, previous_heading: 0.0,
            ch3_percent: 0.0, ch3_out: 0, ch9_out: 0, ch10_out: 0, ch11_out: 0, ch12_out: 0,
            tot: 0.0, toh: 0.0,
            timestamp: 0
        }
    }
}

/* #endregion snapshot */

/* #region track ************************************************************************************************/

/// the mutable state of one vehicle: the published snapshot plus what we need to derive its fields
#[derive(Debug,Clone)]
pub struct VehicleTrack {
    snapshot: VehicleSnapshot,
    home: Option<HomeLocation>,
    last_fix: Option<(f64,f64)>,
    airborne: PhaseTimer,
    flight: PhaseTimer,
    throttle: ThrottleAccumulator,
}

impl VehicleTrack {
    pub fn new (port: u16)->Self {
        VehicleTrack {
            snapshot: VehicleSnapshot::new( port),
            home: None,
            last_fix: None,
            airborne: PhaseTimer::default(),
            flight: PhaseTimer::default(),
            throttle: ThrottleAccumulator::default(),
        }
    }

    pub fn port (&self)->u16 { self.snapshot.port }
    pub fn snapshot (&self)->&VehicleSnapshot { &self.snapshot }
    pub fn home (&self)->Option<HomeLocation> { self.home }
    pub fn is_airborne (&self)->bool { self.airborne.is_active() }
    pub fn is_flying (&self)->bool { self.flight.is_active() }

    /// fold one decoded message into this track. Every message updates origin and timestamp
    pub fn apply (&mut self, gcs_ip: &str, decoded: &Decoded, now: DateTime<Utc>) {
        self.snapshot.system_id = decoded.system_id;
        if self.snapshot.gcs_ip != gcs_ip { self.snapshot.gcs_ip = gcs_ip.to_string(); }
        self.snapshot.timestamp = now.timestamp_millis();

        match &decoded.msg {
            TelemetryMsg::GlobalPosition{ lat, lon, relative_alt, vx, vy, vz, hdg } => {
                self.apply_position( *lat, *lon, *relative_alt, *vx, *vy, *vz, *hdg, now)
            }
            TelemetryMsg::SysStatus{ voltage_battery, current_battery } => self.apply_sys_status( *voltage_battery, *current_battery),
            TelemetryMsg::VfrHud{ airspeed, groundspeed, climb, heading } => self.apply_vfr_hud( *airspeed, *groundspeed, *climb, *heading),
            TelemetryMsg::Wind{ speed } => self.snapshot.wind_velocity = *speed as f64,
            TelemetryMsg::GpsRaw{ eph } => {
                if *eph != UNKNOWN_EPH { self.snapshot.gps_hdop = *eph as f64 / 100.0 }
            }
            TelemetryMsg::Attitude{ roll, pitch, yaw } => {
                self.snapshot.roll = round2( degrees_from_radians( *roll));
                self.snapshot.pitch = round2( degrees_from_radians( *pitch));
                self.snapshot.yaw = round2( degrees_from_radians( *yaw));
            }
            TelemetryMsg::ServoOutput{ channels } => self.apply_servo_output( channels, now),
            TelemetryMsg::MissionCount{ count } => {
                self.snapshot.waypoints = Vec::with_capacity( *count as usize);
                self.snapshot.waypoints_count = *count as usize;
            }
            TelemetryMsg::MissionItem{ seq, x, y, z } => self.apply_mission_item( *seq, *x, *y, *z),
            TelemetryMsg::NavController{ wp_dist, target_bearing } => {
                self.snapshot.wp_dist = *wp_dist as f64;
                self.snapshot.target_heading = *target_bearing as f64;
            }
            TelemetryMsg::Other{..} => {}
        }
    }

    fn apply_position (&mut self, lat: i32, lon: i32, relative_alt: i32, vx: i16, vy: i16, vz: i16, hdg: u16, now: DateTime<Utc>) {
        let lat = lat as f64 / 1e7;
        let lon = lon as f64 / 1e7;
        let alt = Length::new::<millimeter>( relative_alt as f64).get::<meter>();

        let snap = &mut self.snapshot;
        snap.latitude = lat;
        snap.longitude = lon;
        snap.altitude = alt;

        if hdg != UNKNOWN_HDG {
            self.set_heading( hdg as f64 / 100.0);
        }

        let snap = &mut self.snapshot;
        let vx = Velocity::new::<centimeter_per_second>( vx as f64);
        let vy = Velocity::new::<centimeter_per_second>( vy as f64);
        snap.ground_speed = vx.get::<meter_per_second>().hypot( vy.get::<meter_per_second>());
        // NED frame, positive vz is descending
        snap.vertical_speed = -Velocity::new::<centimeter_per_second>( vz as f64).get::<meter_per_second>();

        if let Some((last_lat,last_lon)) = self.last_fix {
            snap.dist_traveled += haversine_distance( last_lat, last_lon, lat, lon).get::<meter>();
        }
        self.last_fix = Some((lat,lon));

        if let Some(home) = self.home {
            snap.dist_to_home = haversine_distance( lat, lon, home.lat, home.lon).get::<meter>();
        }

        snap.time_in_air = self.airborne.update( alt > AIRBORNE_ALTITUDE, now);
    }

    fn set_heading (&mut self, heading: f64) {
        if heading != self.snapshot.heading {
            self.snapshot.previous_heading = self.snapshot.heading;
            self.snapshot.heading = heading;
        }
    }

    fn apply_sys_status (&mut self, voltage_battery: u16, current_battery: i16) {
        if voltage_battery != UNKNOWN_VOLTAGE {
            self.snapshot.battery_voltage = ElectricPotential::new::<millivolt>( voltage_battery as f64).get::<volt>();
        }
        if current_battery != UNKNOWN_CURRENT {
            self.snapshot.battery_current = ElectricCurrent::new::<centiampere>( current_battery as f64).get::<ampere>();
        }
    }

    fn apply_vfr_hud (&mut self, airspeed: f32, groundspeed: f32, climb: f32, heading: i16) {
        self.snapshot.airspeed = airspeed as f64;
        self.snapshot.ground_speed = groundspeed as f64;
        self.snapshot.vertical_speed = climb as f64;
        self.set_heading( heading as f64);

        let snap = &mut self.snapshot;
        let gs = snap.ground_speed;
        snap.tot = if gs > 0.0 { round2( snap.wp_dist / gs) } else { 0.0 };
        snap.toh = if gs > 0.0 { round2( snap.dist_to_home / gs) } else { 0.0 };
    }

    fn apply_servo_output (&mut self, channels: &[u16;16], now: DateTime<Utc>) {
        let ch3 = channels[2];
        let active = ch3 > THROTTLE_ACTIVE_PWM;

        let snap = &mut self.snapshot;
        snap.ch3_out = ch3;
        snap.ch3_percent = round2( (ch3 as f64 - 1000.0) / 1000.0 * 100.0);
        snap.ch9_out = channels[8];
        snap.ch10_out = channels[9];
        snap.ch11_out = channels[10];
        snap.ch12_out = channels[11];

        snap.flight_status = if active { 1 } else { 0 };
        snap.auto_time = self.flight.update( active, now);
        snap.throttle_active = active;
        snap.throttle_time_in_air = self.throttle.update( active, now);
    }

    fn apply_mission_item (&mut self, seq: u16, x: i32, y: i32, z: f32) {
        let lat = x as f64 / 1e7;
        let lon = y as f64 / 1e7;
        let alt = z as f64;

        if lat == 0.0 && lon == 0.0 && alt == 0.0 { return } // placeholder item

        self.snapshot.waypoints.push( Waypoint { seq, lat, lon, alt });

        if seq == 0 {
            let home = HomeLocation { lat, lon };
            self.home = Some(home);
            self.snapshot.home_location = home;
            if let Some((last_lat,last_lon)) = self.last_fix {
                self.snapshot.dist_to_home = haversine_distance( last_lat, last_lon, lat, lon).get::<meter>();
            }
        }
    }
}

/* #endregion track */
