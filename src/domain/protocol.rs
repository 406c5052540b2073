// Testing protocols and their specimen-count ceilings

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "cube_compression_testing")]
    CubeCompression,
    #[serde(rename = "cube_frost_testing")]
    CubeFrost,
    #[serde(rename = "beam_compression_testing")]
    BeamCompression,
    #[serde(rename = "beam_flexural_testing")]
    BeamFlexural,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::CubeCompression,
        Protocol::CubeFrost,
        Protocol::BeamCompression,
        Protocol::BeamFlexural,
    ];

    /// Canonical tag stored in sessions and the registry
    pub fn tag(&self) -> &'static str {
        match self {
            Protocol::CubeCompression => "cube_compression_testing",
            Protocol::CubeFrost => "cube_frost_testing",
            Protocol::BeamCompression => "beam_compression_testing",
            Protocol::BeamFlexural => "beam_flexural_testing",
        }
    }

    /// Label shown by the laboratory front-ends
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::CubeCompression => "Rezistență la Compresiune Cuburi",
            Protocol::CubeFrost => "Gelivitate Cuburi",
            Protocol::BeamCompression => "Rezistență la Compresiune Prisme",
            Protocol::BeamFlexural => "Rezistență la Încovoiere Prisme",
        }
    }

    /// Accepts either the canonical tag or the front-end label
    pub fn from_label(value: &str) -> Option<Protocol> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.tag() == value || p.label() == value)
    }

    pub fn max_set_size(&self) -> u32 {
        match self {
            Protocol::CubeCompression | Protocol::CubeFrost => 20,
            Protocol::BeamCompression => 10,
            Protocol::BeamFlexural => 15,
        }
    }

    /// Cube protocols weigh every specimen before pressing it
    pub fn is_cube(&self) -> bool {
        matches!(self, Protocol::CubeCompression | Protocol::CubeFrost)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
