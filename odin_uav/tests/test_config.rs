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

use odin_uav::config::{UavConfig,parse_config};

// run with "cargo test --test test_config -- --nocapture"

#[test]
fn test_defaults() {
    let config = parse_config( "UavConfig()").unwrap();
    println!("{:#?}", config);

    assert_eq!( config.ports, vec![1500, 1501, 1502]);
    assert_eq!( config.thread_pool_size, 100);
    assert_eq!( config.listener_timeout_ms, 30_000);
    assert_eq!( config.buffer_size, 1024);
    assert_eq!( config.ws_path, "/telemetry");
}

#[test]
fn test_partial_config() {
    let src = r#"
        UavConfig(
            ports: [14550, 14551],
            listener_timeout_ms: 10000,
            server_addr: "127.0.0.1:9090",
        )
    "#;
    let config = parse_config( src).unwrap();
    assert_eq!( config.ports, vec![14550, 14551]);
    assert_eq!( config.listener_timeout().as_millis(), 10_000);
    assert_eq!( config.scanner_timeout_ms, 5_000);
    assert_eq!( config.server_socket_addr().unwrap().port(), 9090);
}

#[test]
fn test_invalid_config() {
    let res = parse_config( "UavConfig( min_port: 2000, max_port: 1000 )");
    println!("inverted port range: {:?}", res);
    assert!( res.is_err());

    assert!( parse_config( "UavConfig( thread_pool_size: 0 )").is_err());
    assert!( parse_config( r#"UavConfig( server_addr: "localhost" )"#).is_err());
    assert!( parse_config( "UavConfig( ports: [1500,").is_err()); // syntax
}

#[test]
fn test_sample_config() {
    let config = odin_uav::load_config( concat!( env!("CARGO_MANIFEST_DIR"), "/configs/uav_hub.ron")).unwrap();
    assert!( config.validate().is_ok());
}
