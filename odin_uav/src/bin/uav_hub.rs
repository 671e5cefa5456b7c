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

use std::{path::PathBuf, sync::Arc};
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use odin_uav::{MavlinkDecoder, UavConfig, UavService, load_config};

#[derive(Parser, Debug)]
#[command(version, about, long_about = "collect MAVLink telemetry from UDP ports and publish it over websocket")]
pub struct Args {
    /// RON config file (defaults are used if not set)
    #[arg(short,long)]
    pub config: Option<PathBuf>,

    /// ports to watch, replacing the ones from the config
    #[arg(num_args=0..)]
    pub ports: Vec<u32>,
}

fn main()->Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter( EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config( path)?,
        None => UavConfig::default()
    };
    if !args.ports.is_empty() {
        config.ports = args.ports.clone();
    }

    let service = UavService::start( config, Arc::new( MavlinkDecoder::new()))?;
    service.block_on_ctrl_c()?;
    service.shutdown()?;

    Ok(())
}
