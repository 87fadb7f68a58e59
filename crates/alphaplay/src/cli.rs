use std::path::PathBuf;

use clap::{Parser, Subcommand};
use playerconfig::PowerSetting;

#[derive(Parser, Debug)]
#[command(
    name = "alphaplay",
    author,
    version,
    about = "Dual-channel alpha sequence player",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub play: PlayArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct PlayArgs {
    /// Clip name from the config, or a directory of packed PNG frames.
    #[arg(value_name = "CLIP|DIR")]
    pub clip: Option<String>,

    /// Player config file; can also be supplied via the `ALPHAPLAY_CONFIG` env var.
    #[arg(long, env = "ALPHAPLAY_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Sequence playback rate in frames per second.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Plays per start (0 = repeat forever).
    #[arg(long, value_name = "COUNT")]
    pub loops: Option<u32>,

    /// Logical container width the clip is laid out to.
    #[arg(long, value_name = "WIDTH")]
    pub width: Option<f64>,

    /// Optional cap on render-loop frequency (0 = follow the display).
    #[arg(long, value_name = "FPS")]
    pub max_fps: Option<f32>,

    /// GPU power preference: `high-performance` or `low-power`.
    #[arg(long, value_name = "POWER", value_parser = parse_power)]
    pub power: Option<PowerSetting>,

    /// Open paused on the first frame instead of autoplaying.
    #[arg(long)]
    pub paused: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode RGBA PNGs as packed dual-channel frames.
    Pack(PackArgs),
    /// Composite one packed frame offscreen and write the RGBA result.
    Export(ExportArgs),
    /// Inspect the player configuration.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct PackArgs {
    /// RGBA PNG file, or a directory of them.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    /// Output PNG file, or a directory when INPUT is one.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Packed PNG frame.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    /// Where to write the composited RGBA PNG.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
    /// Logical output width (defaults to the carried picture width).
    #[arg(long, value_name = "WIDTH")]
    pub width: Option<f64>,
    /// Pixel density applied to the output (capped at 2.0).
    #[arg(long, value_name = "DENSITY", default_value_t = 1.0)]
    pub density: f64,
    /// Rasterise on the CPU instead of the GPU.
    #[arg(long)]
    pub software: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the config directory and the file that would be loaded.
    Where {
        #[arg(long, env = "ALPHAPLAY_CONFIG", value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print the loaded configuration as TOML.
    Show {
        #[arg(long, env = "ALPHAPLAY_CONFIG", value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_power(value: &str) -> Result<PowerSetting, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "high" | "high-performance" | "performance" => Ok(PowerSetting::HighPerformance),
        "low" | "low-power" | "battery" => Ok(PowerSetting::LowPower),
        "" => Err("power preference must not be empty".to_string()),
        _ => Err(format!(
            "unknown power preference '{}'; use high-performance or low-power",
            value.trim()
        )),
    }
}
