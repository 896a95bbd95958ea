use std::{sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct WorkspaceId(Arc<str>);
impl WorkspaceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for WorkspaceId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}
impl From<String> for WorkspaceId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}
impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One virtual desktop as reported by the workspace binary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceDescriptor {
    #[serde(rename = "workspace")]
    pub id: WorkspaceId,
}

/// The focused window. `window_id` is opaque and only handed back to the
/// workspace binary when focusing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowDescriptor {
    #[serde(rename = "window-id", deserialize_with = "de_window_id")]
    pub window_id: String,
    #[serde(rename = "window-title")]
    pub title: String,
    #[serde(rename = "app-name")]
    pub app_name: String,
}

fn de_window_id<'de, D: serde::Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Str(String),
    }
    Ok(match RawId::deserialize(de)? {
        RawId::Num(n) => n.to_string(),
        RawId::Str(s) => s,
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum MediaTrackState {
    Playing {
        artist: String,
        title: String,
    },
    #[default]
    NotPlaying,
    Unavailable,
}
impl MediaTrackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing { .. })
    }
}

// Wire shape used by the command surface: `{isPlaying, artist?, title?}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaTrackWire {
    is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}
impl Serialize for MediaTrackState {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Playing { artist, title } => MediaTrackWire {
                is_playing: true,
                artist: Some(artist.clone()),
                title: Some(title.clone()),
            },
            Self::NotPlaying | Self::Unavailable => MediaTrackWire {
                is_playing: false,
                artist: None,
                title: None,
            },
        };
        wire.serialize(ser)
    }
}
impl<'de> Deserialize<'de> for MediaTrackState {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let MediaTrackWire {
            is_playing,
            artist,
            title,
        } = MediaTrackWire::deserialize(de)?;
        Ok(match (is_playing, artist, title) {
            (true, Some(artist), Some(title)) => Self::Playing { artist, title },
            (true, ..) => Self::Unavailable,
            (false, ..) => Self::NotPlaying,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerState {
    #[serde(rename = "level")]
    pub level_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging: Option<bool>,
}
impl PowerState {
    /// Shown whenever the power query cannot be read.
    pub const FALLBACK: Self = Self {
        level_percent: 100,
        charging: Some(true),
    };

    pub fn new(level_percent: u8, charging: Option<bool>) -> Self {
        Self {
            level_percent: level_percent.min(100),
            charging,
        }
    }

    pub fn bucket(&self) -> BatteryLevel {
        match self.level_percent {
            75.. => BatteryLevel::Full,
            40.. => BatteryLevel::Medium,
            15.. => BatteryLevel::Low,
            _ => BatteryLevel::Warning,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatteryLevel {
    Full,
    Medium,
    Low,
    Warning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkState {
    Disconnected,
    NoInternet,
    Low,
    Medium,
    High,
}

/// Tells surfaces to re-pull everything. Carries nothing but the time it was issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshSignal {
    pub issued_at: Instant,
}
impl RefreshSignal {
    pub fn now() -> Self {
        Self {
            issued_at: Instant::now(),
        }
    }
}
