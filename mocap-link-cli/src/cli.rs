use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use mocap_link_core::{SessionConfiguration, StartingAngle};
use mocap_link_io::SimulationConfig;

#[derive(Parser)]
#[command(
    name = "mocap-link",
    version,
    about = "Stream, republish and record motion capture data",
    long_about = "Connects to a capture server, republishes frames and trigger codes on a UDP outlet,\n\
                  and writes one CSV per body when the capture stops. Runs against the built-in\n\
                  simulated capture server."
)]
pub struct Cli {
    /// Capture server host
    #[arg(long, env = "MOCAP_LINK_HOST")]
    pub host: Option<String>,

    /// Capture server RT port
    #[arg(long, env = "MOCAP_LINK_PORT")]
    pub port: Option<u16>,

    /// RT protocol version requested on connect
    #[arg(long)]
    pub protocol_version: Option<String>,

    /// Starting angle of the tracked body in degrees (-90, -45, 0, 45, 90)
    #[arg(long, allow_hyphen_values = true)]
    pub angle: Option<StartingAngle>,

    /// Bodies whose name contains this text drive angle triggers
    #[arg(long)]
    pub tracked_body: Option<String>,

    /// Outlet stream name
    #[arg(long)]
    pub stream_name: Option<String>,

    /// Destination prefix; each body is written to <OUTPUT>_<body>.csv
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON session configuration; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Outlet target for UDP datagrams
    #[arg(long, default_value = "127.0.0.1:16571")]
    pub udp: SocketAddr,

    /// Simulated marker labels
    #[arg(long, value_delimiter = ',', default_values_t = vec!["toe".to_string(), "heel".to_string()])]
    pub sim_markers: Vec<String>,

    /// Simulated rigid body names
    #[arg(long, value_delimiter = ',', default_values_t = vec!["skate".to_string()])]
    pub sim_bodies: Vec<String>,

    /// Simulated frame rate in Hz
    #[arg(long, default_value_t = 100.0)]
    pub sim_rate: f64,

    /// Simulated yaw sweep in degrees per second
    #[arg(long, default_value_t = 45.0)]
    pub sim_yaw_rate: f64,

    /// Frames before the simulated capture stops (0 runs until Ctrl-C)
    #[arg(long, default_value_t = 500)]
    pub sim_frames: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Configuration file values (or defaults) with flags applied on top.
    pub fn session_config(&self) -> Result<SessionConfiguration, String> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
                serde_json::from_str(&json)
                    .map_err(|e| format!("invalid configuration {}: {}", path.display(), e))?
            }
            None => SessionConfiguration::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(version) = &self.protocol_version {
            config.protocol_version = version.clone();
        }
        if let Some(angle) = self.angle {
            config.starting_angle = angle;
        }
        if let Some(pattern) = &self.tracked_body {
            config.tracked_body = pattern.clone();
        }
        if let Some(name) = &self.stream_name {
            config.stream_name = name.clone();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            markers: self.sim_markers.clone(),
            rigid_bodies: self.sim_bodies.clone(),
            frame_rate_hz: self.sim_rate,
            yaw_rate_deg_per_sec: self.sim_yaw_rate,
            stop_after_frames: (self.sim_frames > 0).then_some(self.sim_frames),
            ..Default::default()
        }
    }
}
