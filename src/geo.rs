//! Geographic value types shared by positioning, routing, and rendering.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lon)
    }
}

macro_rules! flag_set {
    ($name:ident { $($flag:ident = $bit:expr => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u8);

        impl $name {
            pub const NONE: Self = Self(0);
            $(pub const $flag: Self = Self($bit);)+

            pub fn contains(self, other: Self) -> bool {
                other.0 != 0 && self.0 & other.0 == other.0
            }

            pub fn labels(self) -> Vec<&'static str> {
                let mut labels = Vec::new();
                $(if self.contains(Self::$flag) {
                    labels.push($label);
                })+
                labels
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

flag_set!(PositionSources {
    CACHE = 1 << 0 => "CACHE",
    FUSION = 1 << 1 => "FUSION",
    HARDWARE = 1 << 2 => "HARDWARE",
    INDOOR = 1 << 3 => "INDOOR",
    OFFLINE = 1 << 4 => "OFFLINE",
    ONLINE = 1 << 5 => "ONLINE",
});

flag_set!(PositionTechnologies {
    BLE = 1 << 0 => "BLE",
    CELL = 1 << 1 => "CELL",
    GNSS = 1 << 2 => "GNSS",
    WIFI = 1 << 3 => "WIFI",
    SENSORS = 1 << 4 => "SENSORS",
});

/// One position fix as reported by the positioning source. Immutable once delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coordinate: Coordinate,
    #[serde(default)]
    pub altitude_m: Option<f64>,
    /// Horizontal uncertainty radius in meters.
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub sources: PositionSources,
    #[serde(default)]
    pub technologies: PositionTechnologies,
    #[serde(default)]
    pub building_name: Option<String>,
    #[serde(default)]
    pub building_id: Option<String>,
    #[serde(default)]
    pub floor_id: Option<String>,
}

impl Position {
    /// A bare fix carrying only a coordinate.
    pub fn at(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            altitude_m: None,
            accuracy_m: None,
            heading_deg: None,
            speed_mps: None,
            sources: PositionSources::NONE,
            technologies: PositionTechnologies::NONE,
            building_name: None,
            building_id: None,
            floor_id: None,
        }
    }

    /// Multi-line summary for the position info panel. Unknown fields are omitted.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let sources = self.sources.labels();
        if !sources.is_empty() {
            let _ = writeln!(out, "Position Source: {}", sources.join(" "));
        }
        let technologies = self.technologies.labels();
        if !technologies.is_empty() {
            let _ = writeln!(out, "Position Technology: {}", technologies.join(" "));
        }
        let _ = writeln!(out, "Coordinate: {}", self.coordinate);
        if let Some(accuracy) = self.accuracy_m {
            let _ = writeln!(out, "Uncertainty: {accuracy:.2}m");
        }
        if let Some(altitude) = self.altitude_m {
            let _ = writeln!(out, "Altitude: {altitude:.2}m");
        }
        if let Some(heading) = self.heading_deg {
            let _ = writeln!(out, "Heading: {heading:.2}");
        }
        if let Some(speed) = self.speed_mps {
            let _ = writeln!(out, "Speed: {speed:.2}m/s");
        }
        if let Some(name) = &self.building_name {
            match &self.building_id {
                Some(id) => {
                    let _ = writeln!(out, "Building: {name} ({id})");
                }
                None => {
                    let _ = writeln!(out, "Building: {name}");
                }
            }
        }
        if let Some(floor) = &self.floor_id {
            let _ = writeln!(out, "Floor ID: {floor}");
        }
        out.truncate(out.trim_end().len());
        out
    }
}

/// Positioning technique requested from the positioning source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationMethod {
    Gps,
    Network,
    Indoor,
    GpsNetwork,
    #[default]
    GpsNetworkIndoor,
}

impl fmt::Display for LocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LocationMethod::Gps => "GPS",
            LocationMethod::Network => "NETWORK",
            LocationMethod::Indoor => "INDOOR",
            LocationMethod::GpsNetwork => "GPS_NETWORK",
            LocationMethod::GpsNetworkIndoor => "GPS_NETWORK_INDOOR",
        };
        write!(f, "{label}")
    }
}

/// Availability reported alongside a location-method change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Available,
    OutOfService,
    TemporarilyUnavailable,
}
