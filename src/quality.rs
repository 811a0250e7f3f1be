use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codecs::Codec;
use crate::error::RunnerError;

/// Inclusive bounds a quality value must fall within.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityRange {
    pub min: u8,
    pub max: u8,
}

impl QualityRange {
    pub fn new(min: u8, max: u8) -> Result<Self, RunnerError> {
        if min > max {
            return Err(RunnerError::InvalidQualityRange { min, max });
        }
        Ok(QualityRange { min, max })
    }

    pub fn contains(&self, value: u8) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for QualityRange {
    fn default() -> Self {
        QualityRange { min: 18, max: 32 }
    }
}

/// CRF value; lower is higher fidelity and a larger file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8, range: &QualityRange) -> Result<Self, RunnerError> {
        if range.contains(value) {
            Ok(Quality(value))
        } else {
            Err(RunnerError::QualityOutOfRange { value, min: range.min, max: range.max })
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn tier(&self) -> QualityTier {
        match self.0 {
            v if v < 21 => QualityTier::HighQuality,
            v if v < 26 => QualityTier::Balanced,
            _ => QualityTier::MaxCompression,
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRF {}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QualityTier {
    HighQuality,
    Balanced,
    MaxCompression,
}

impl Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::HighQuality => write!(f, "High Quality (Big Files)"),
            QualityTier::Balanced => write!(f, "Balanced"),
            QualityTier::MaxCompression => write!(f, "Max Compression (Small Files)"),
        }
    }
}

/// Speed/efficiency trade-off, translated per codec into the encoder's own
/// preset vocabulary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Fast,
    #[default]
    Balanced,
    MaxCompression,
}

impl Preset {
    pub fn parameter(&self, codec: Codec) -> String {
        match codec {
            Codec::H264 | Codec::HEVC => String::from(match self {
                Preset::Fast => "ultrafast",
                Preset::Balanced => "faster",
                Preset::MaxCompression => "slow",
            }),
            Codec::AV1 => match self {
                Preset::Fast => 12,
                Preset::Balanced => 8,
                Preset::MaxCompression => 4,
            }
            .to_string(),
        }
    }
}

impl FromStr for Preset {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "fast" => Ok(Preset::Fast),
            "balanced" => Ok(Preset::Balanced),
            "max-compression" | "max" => Ok(Preset::MaxCompression),
            _ => Err(RunnerError::UnknownOption { kind: "preset", value: String::from(s) }),
        }
    }
}

impl Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preset::Fast => write!(f, "fast"),
            Preset::Balanced => write!(f, "balanced"),
            Preset::MaxCompression => write!(f, "max-compression"),
        }
    }
}
