use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DEVICE_ID: u32 = 0;
pub const DEFAULT_FRAME_ID: &str = "thermal_link";
pub const DEFAULT_PUBLISH_RATE: f64 = 30.0;

/// Command line surface of `thermal_node`.
#[derive(Parser, Debug, Default)]
#[command(
    name = "thermal_node",
    about = "Capture a TC001 thermal camera, apply JET and publish sensor_msgs/Image"
)]
pub struct Args {
    /// V4L2 device index; the node opens /dev/video<N>
    #[arg(long, env = "THERMAL_DEVICE_ID")]
    pub device_id: Option<u32>,

    /// Frame id stamped into every published image
    #[arg(long, env = "THERMAL_FRAME_ID")]
    pub frame_id: Option<String>,

    /// Publish rate in Hz
    #[arg(long, env = "THERMAL_PUBLISH_RATE")]
    pub publish_rate: Option<f64>,

    /// TOML file providing any of device_id, frame_id, publish_rate
    #[arg(long, env = "THERMAL_PARAMS_FILE")]
    pub params_file: Option<PathBuf>,

    /// Parameter override in ROS syntax, e.g. `-p publish_rate:=10.0`
    #[arg(short = 'p', long = "param", value_name = "NAME:=VALUE")]
    pub params: Vec<String>,

    /// Accepted for `ros2 run` compatibility; has no effect
    #[arg(long = "ros-args", hide = true)]
    pub ros_args: bool,

    /// List V4L2 capture devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read params file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse params file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("malformed parameter override {0:?} (expected NAME:=VALUE)")]
    MalformedOverride(String),
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("invalid value {value:?} for parameter {name}")]
    InvalidValue { name: String, value: String },
    #[error("publish_rate must be a positive, finite number of Hz (got {0})")]
    InvalidRate(f64),
    #[error("frame_id must not be empty")]
    EmptyFrameId,
}

/// Parameters as they may appear in a `--params-file`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParamsFile {
    device_id: Option<u32>,
    frame_id: Option<String>,
    publish_rate: Option<f64>,
}

/// Node configuration, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// V4L2 device index (default: 0).
    pub device_id: u32,
    /// Frame id for outgoing images (default: "thermal_link").
    pub frame_id: String,
    /// Publish rate in Hz (default: 30.0).
    pub publish_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            frame_id: DEFAULT_FRAME_ID.to_string(),
            publish_rate: DEFAULT_PUBLISH_RATE,
        }
    }
}

impl Config {
    /// Resolve configuration: defaults, then params file, then flags/env,
    /// then `-p name:=value` overrides. The result is validated.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = &args.params_file {
            config.merge_file(path)?;
        }
        if let Some(id) = args.device_id {
            config.device_id = id;
        }
        if let Some(frame_id) = &args.frame_id {
            config.frame_id = frame_id.clone();
        }
        if let Some(rate) = args.publish_rate {
            config.publish_rate = rate;
        }
        for param in &args.params {
            config.apply_override(param)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ParamsFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(id) = file.device_id {
            self.device_id = id;
        }
        if let Some(frame_id) = file.frame_id {
            self.frame_id = frame_id;
        }
        if let Some(rate) = file.publish_rate {
            self.publish_rate = rate;
        }
        Ok(())
    }

    /// Apply one `name:=value` override.
    pub fn apply_override(&mut self, param: &str) -> Result<(), ConfigError> {
        let (name, value) = param
            .split_once(":=")
            .ok_or_else(|| ConfigError::MalformedOverride(param.to_string()))?;
        let name = name.trim();
        let value = value.trim();

        let invalid = || ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        };

        match name {
            "device_id" => self.device_id = value.parse().map_err(|_| invalid())?,
            // ROS accepts quoted strings on the command line.
            "frame_id" => self.frame_id = value.trim_matches(&['"', '\''][..]).to_string(),
            "publish_rate" => self.publish_rate = value.parse().map_err(|_| invalid())?,
            other => return Err(ConfigError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_id.is_empty() {
            return Err(ConfigError::EmptyFrameId);
        }
        self.period().map(|_| ())
    }

    /// Timer period, `1 / publish_rate` seconds.
    pub fn period(&self) -> Result<Duration, ConfigError> {
        let rate = self.publish_rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::InvalidRate(rate));
        }
        match Duration::try_from_secs_f64(1.0 / rate) {
            Ok(period) if !period.is_zero() => Ok(period),
            _ => Err(ConfigError::InvalidRate(rate)),
        }
    }

    /// `/dev/video{device_id}`.
    pub fn device_path(&self) -> String {
        thermal_hw::device_path(self.device_id)
    }
}
