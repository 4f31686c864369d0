//! Per-document rotation/zoom record
//!
//! Stored as `angle~zoom~version`. Records written by another format version
//! are rejected so a format change never reinterprets old fields.

use std::fmt;

/// Current encoding version of the view-state record
pub const VIEW_STATE_VERSION: u32 = 2;

pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 5.0;
/// Zoom changes smaller than this are ignored
pub const ZOOM_EPSILON: f32 = 0.001;

const FIELD_SEPARATOR: char = '~';

/// Clockwise page rotation in quarter turns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    #[must_use]
    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    #[must_use]
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    /// +90 degrees, wrapping at 360
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    /// Width and height trade places at 90 and 270
    #[must_use]
    pub fn is_sideways(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Clamp a requested zoom level. `None` for NaN.
#[must_use]
pub fn clamp_zoom(zoom: f32) -> Option<f32> {
    if zoom.is_nan() {
        None
    } else {
        Some(zoom.clamp(MIN_ZOOM, MAX_ZOOM))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewStateError {
    #[error("malformed view state {0:?}")]
    Malformed(String),

    #[error("view state version {found} is not the current format")]
    VersionMismatch { found: String },
}

/// Decoded view-state record
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PersistedViewState {
    pub rotation: Rotation,
    pub zoom: f32,
    pub version: u32,
}

impl Default for PersistedViewState {
    fn default() -> Self {
        Self {
            rotation: Rotation::Deg0,
            zoom: 1.0,
            version: VIEW_STATE_VERSION,
        }
    }
}

impl PersistedViewState {
    #[must_use]
    pub fn new(rotation: Rotation, zoom: f32) -> Self {
        Self {
            rotation,
            zoom,
            version: VIEW_STATE_VERSION,
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse a stored record. The version tag is checked before anything
    /// else so old records are reported as such even if their other fields
    /// no longer parse.
    pub fn decode(raw: &str) -> Result<Self, ViewStateError> {
        let malformed = || ViewStateError::Malformed(raw.to_string());

        let fields: Vec<&str> = raw.trim().split(FIELD_SEPARATOR).collect();
        let [angle, zoom, version] = fields.as_slice() else {
            return Err(malformed());
        };

        let version = version.trim();
        if version != VIEW_STATE_VERSION.to_string() {
            return Err(ViewStateError::VersionMismatch {
                found: version.to_string(),
            });
        }

        let rotation = angle
            .trim()
            .parse::<u16>()
            .ok()
            .and_then(Rotation::from_degrees)
            .ok_or_else(malformed)?;
        let zoom = zoom
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|z| z.is_finite())
            .and_then(clamp_zoom)
            .ok_or_else(malformed)?;

        Ok(Self::new(rotation, zoom))
    }
}

impl fmt::Display for PersistedViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            self.rotation.degrees(),
            self.zoom,
            self.version
        )
    }
}
