use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Playback rate used when neither clip nor defaults set one.
pub const DEFAULT_FPS: f32 = 30.0;
/// Logical container width used when neither clip nor defaults set one.
pub const DEFAULT_CONTAINER_WIDTH: f64 = 375.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerSetting {
    #[default]
    HighPerformance,
    LowPower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gpu,
    Software,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub clips: BTreeMap<String, Clip>,
    /// Directory relative clip paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    pub clip: Option<String>,
    pub autoplay: Option<bool>,
    /// Plays per start; `0` (or `"infinite"`) repeats forever.
    #[serde(default, deserialize_with = "deserialize_loops_opt")]
    pub loops: Option<u32>,
    pub fps: Option<f32>,
    pub container_width: Option<f64>,
    pub power: Option<PowerSetting>,
    pub backend: Option<BackendKind>,
    pub pause_when_hidden: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Clip {
    /// Directory of packed PNG frames, played in file-name order.
    pub frames: PathBuf,
    #[serde(default)]
    pub fps: Option<f32>,
    #[serde(default, deserialize_with = "deserialize_loops_opt")]
    pub loops: Option<u32>,
    #[serde(default)]
    pub autoplay: Option<bool>,
    #[serde(default)]
    pub container_width: Option<f64>,
}

/// A clip with every setting filled in from the clip, then the defaults,
/// then the built-in fallbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClip {
    pub name: String,
    pub frames: PathBuf,
    pub fps: f32,
    pub loops: u32,
    pub autoplay: bool,
    pub container_width: f64,
    pub power: PowerSetting,
    pub backend: BackendKind,
    pub pause_when_hidden: bool,
}

impl ResolvedClip {
    pub fn is_infinite(&self) -> bool {
        self.loops == 0
    }
}

fn deserialize_loops_opt<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<u32>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a loop count or \"infinite\"")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            match v.trim().to_ascii_lowercase().as_str() {
                "infinite" | "forever" | "loop" => Ok(Some(0)),
                other => other
                    .parse::<u32>()
                    .map(Some)
                    .map_err(|_| E::custom(format!("invalid loop count '{v}'"))),
            }
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u32::try_from(v)
                .map(Some)
                .map_err(|_| E::custom(format!("loop count {v} is too large")))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("loop count must be non-negative"));
            }
            self.visit_u64(v as u64)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl PlayerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PlayerConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates a config file; relative clip paths resolve
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn clip(&self, name: &str) -> Option<&Clip> {
        self.clips.get(name)
    }

    pub fn default_clip(&self) -> Option<&str> {
        self.defaults.clip.as_deref()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        validate_fps("defaults.fps", self.defaults.fps)?;
        validate_width("defaults.container_width", self.defaults.container_width)?;

        for (name, clip) in &self.clips {
            if clip.frames.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "clip '{name}' must name a frames directory"
                )));
            }
            validate_fps(&format!("clip '{name}' fps"), clip.fps)?;
            validate_width(
                &format!("clip '{name}' container_width"),
                clip.container_width,
            )?;
        }

        if let Some(default_clip) = &self.defaults.clip {
            if !self.clips.contains_key(default_clip) {
                return Err(ConfigError::Invalid(format!(
                    "defaults.clip references unknown clip '{default_clip}'"
                )));
            }
        }

        Ok(())
    }

    /// Settings for a named clip.
    pub fn resolve_clip(&self, name: &str) -> Option<ResolvedClip> {
        let clip = self.clips.get(name)?;
        let frames = match &self.base_dir {
            Some(base) if clip.frames.is_relative() => base.join(&clip.frames),
            _ => clip.frames.clone(),
        };
        let mut resolved = self.resolve_frames(name, frames);
        if let Some(fps) = clip.fps {
            resolved.fps = fps;
        }
        if let Some(loops) = clip.loops {
            resolved.loops = loops;
        }
        if let Some(autoplay) = clip.autoplay {
            resolved.autoplay = autoplay;
        }
        if let Some(width) = clip.container_width {
            resolved.container_width = width;
        }
        Some(resolved)
    }

    /// Settings for an ad-hoc frames directory that has no clip entry.
    pub fn resolve_frames(&self, name: &str, frames: PathBuf) -> ResolvedClip {
        let defaults = &self.defaults;
        ResolvedClip {
            name: name.to_owned(),
            frames,
            fps: defaults.fps.unwrap_or(DEFAULT_FPS),
            loops: defaults.loops.unwrap_or(0),
            autoplay: defaults.autoplay.unwrap_or(true),
            container_width: defaults.container_width.unwrap_or(DEFAULT_CONTAINER_WIDTH),
            power: defaults.power.unwrap_or_default(),
            backend: defaults.backend.unwrap_or_default(),
            pause_when_hidden: defaults.pause_when_hidden.unwrap_or(true),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            defaults: Defaults::default(),
            clips: BTreeMap::new(),
            base_dir: None,
        }
    }
}

fn validate_fps(field: &str, fps: Option<f32>) -> Result<(), ConfigError> {
    match fps {
        Some(fps) if !(fps.is_finite() && fps > 0.0) => Err(ConfigError::Invalid(format!(
            "{field} must be greater than zero"
        ))),
        _ => Ok(()),
    }
}

fn validate_width(field: &str, width: Option<f64>) -> Result<(), ConfigError> {
    match width {
        Some(width) if !(width.is_finite() && width > 0.0) => Err(ConfigError::Invalid(
            format!("{field} must be greater than zero"),
        )),
        _ => Ok(()),
    }
}
