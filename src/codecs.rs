use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    H264,
    HEVC,
    AV1,
}

impl Codec {
    /// Value passed to `-c:v`.
    pub fn encoder_library(&self) -> &'static str {
        match self {
            Codec::H264 => "libx264",
            Codec::HEVC => "libx265",
            Codec::AV1 => "libsvtav1",
        }
    }
}

impl FromStr for Codec {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h264" | "x264" => Ok(Codec::H264),
            "hevc" | "h265" | "x265" => Ok(Codec::HEVC),
            "av1" => Ok(Codec::AV1),
            _ => Err(RunnerError::UnknownOption { kind: "codec", value: String::from(s) }),
        }
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Codec::AV1), "av1");
        assert_eq!(format!("{}", Codec::HEVC), "hevc");
        assert_eq!(format!("{}", Codec::H264), "h264");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("HEVC".parse::<Codec>().unwrap(), Codec::HEVC);
        assert_eq!("x264".parse::<Codec>().unwrap(), Codec::H264);
        assert!("vp9".parse::<Codec>().is_err());
    }
}
