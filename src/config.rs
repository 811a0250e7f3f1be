use std::ffi::OsString;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codecs::Codec;
use crate::error::RunnerError;
use crate::quality::{Preset, Quality, QualityRange};

pub const DEFAULT_CONCURRENCY: usize = 3;

/// What happens to the audio streams of each input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum AudioMode {
    Copy,
    Reencode { codec: String, bitrate: String },
}

impl AudioMode {
    pub fn aac(bitrate: &str) -> Self {
        AudioMode::Reencode {
            codec: String::from("aac"),
            bitrate: String::from(bitrate),
        }
    }

    pub fn parameters(&self) -> Vec<String> {
        match self {
            AudioMode::Copy => vec![String::from("-c:a"), String::from("copy")],
            AudioMode::Reencode { codec, bitrate } => vec![
                String::from("-c:a"), codec.clone(),
                String::from("-b:a"), bitrate.clone(),
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub binary: PathBuf,
    pub codec: Codec,
    pub preset: Preset,
    pub audio: AudioMode,
    pub quality_range: QualityRange,
    pub quality: u8,
}

impl EncoderConfig {
    pub fn quality(&self) -> Result<Quality, RunnerError> {
        Quality::new(self.quality, &self.quality_range)
    }
}

/// Where each output file is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum Destination {
    /// A fixed-named subdirectory next to each source file.
    BesideSource { subdirectory: String },
    Directory { path: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLayout {
    pub destination: Destination,
    pub prefix: String,
}

impl OutputLayout {
    /// `<destination>/<prefix><source file name>`
    pub fn output_path(&self, source: &Path) -> Result<PathBuf, RunnerError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| RunnerError::NoFileName { path: source.to_path_buf() })?;
        let mut name = OsString::from(&self.prefix);
        name.push(file_name);

        let dir = match &self.destination {
            Destination::Directory { path } => path.clone(),
            Destination::BesideSource { subdirectory } => source
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(subdirectory),
        };
        Ok(dir.join(name))
    }

    /// Name of the per-source subdirectory, if outputs are placed beside sources.
    pub fn subdirectory(&self) -> Option<&str> {
        match &self.destination {
            Destination::BesideSource { subdirectory } => Some(subdirectory.as_str()),
            Destination::Directory { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub concurrency: usize,
    pub encoder: EncoderConfig,
    pub output: OutputLayout,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Profile::Standard.config()
    }
}

/// Named bundles of defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Balanced preset, AAC audio at 128k, quality 18-32.
    #[default]
    Standard,
    /// Fastest preset, audio passed through untouched, quality 20-32.
    Turbo,
}

impl Profile {
    pub fn config(&self) -> RunnerConfig {
        match self {
            Profile::Standard => RunnerConfig {
                concurrency: DEFAULT_CONCURRENCY,
                encoder: EncoderConfig {
                    binary: PathBuf::from("ffmpeg"),
                    codec: Codec::H264,
                    preset: Preset::Balanced,
                    audio: AudioMode::aac("128k"),
                    quality_range: QualityRange { min: 18, max: 32 },
                    quality: 23,
                },
                output: OutputLayout {
                    destination: Destination::BesideSource {
                        subdirectory: String::from("Compressed_Reels"),
                    },
                    prefix: String::from("comp_"),
                },
            },
            Profile::Turbo => RunnerConfig {
                concurrency: DEFAULT_CONCURRENCY,
                encoder: EncoderConfig {
                    binary: PathBuf::from("ffmpeg"),
                    codec: Codec::H264,
                    preset: Preset::Fast,
                    audio: AudioMode::Copy,
                    quality_range: QualityRange { min: 20, max: 32 },
                    quality: 26,
                },
                output: OutputLayout {
                    destination: Destination::BesideSource {
                        subdirectory: String::from("Turbo_Reels"),
                    },
                    prefix: String::from("turbo_"),
                },
            },
        }
    }
}

impl FromStr for Profile {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(Profile::Standard),
            "turbo" => Ok(Profile::Turbo),
            _ => Err(RunnerError::UnknownOption { kind: "profile", value: String::from(s) }),
        }
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

/// Partial configuration, as read from a config file or the command line.
/// Set fields replace the matching field of the config they are applied to.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub profile: Option<Profile>,
    pub concurrency: Option<usize>,
    pub binary: Option<PathBuf>,
    pub codec: Option<Codec>,
    pub preset: Option<Preset>,
    pub audio: Option<AudioMode>,
    pub quality_range: Option<QualityRange>,
    pub quality: Option<u8>,
    pub output_dir: Option<PathBuf>,
    pub subdirectory: Option<String>,
    pub prefix: Option<String>,
}

impl ConfigOverrides {
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| RunnerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(&self, config: &mut RunnerConfig) {
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(binary) = &self.binary {
            config.encoder.binary = binary.clone();
        }
        if let Some(codec) = self.codec {
            config.encoder.codec = codec;
        }
        if let Some(preset) = self.preset {
            config.encoder.preset = preset;
        }
        if let Some(audio) = &self.audio {
            config.encoder.audio = audio.clone();
        }
        if let Some(range) = self.quality_range {
            config.encoder.quality_range = range;
        }
        if let Some(quality) = self.quality {
            config.encoder.quality = quality;
        }
        if let Some(subdirectory) = &self.subdirectory {
            config.output.destination = Destination::BesideSource {
                subdirectory: subdirectory.clone(),
            };
        }
        if let Some(dir) = &self.output_dir {
            config.output.destination = Destination::Directory { path: dir.clone() };
        }
        if let Some(prefix) = &self.prefix {
            config.output.prefix = prefix.clone();
        }
    }
}

/// Layers the profile, the config file and the command line, in that order
/// of increasing precedence, then validates the result.
pub fn resolve(file: Option<&ConfigOverrides>, cli: &ConfigOverrides) -> Result<RunnerConfig, RunnerError> {
    let profile = cli
        .profile
        .or_else(|| file.and_then(|f| f.profile))
        .unwrap_or_default();
    let mut config = profile.config();
    if let Some(file) = file {
        file.apply(&mut config);
    }
    cli.apply(&mut config);

    if config.concurrency == 0 {
        return Err(RunnerError::InvalidConcurrency);
    }
    QualityRange::new(config.encoder.quality_range.min, config.encoder.quality_range.max)?;
    config.encoder.quality()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_beside_source() {
        let layout = Profile::Standard.config().output;
        assert_eq!(
            layout.output_path(Path::new("/videos/trip/clip.mp4")).unwrap(),
            PathBuf::from("/videos/trip/Compressed_Reels/comp_clip.mp4"));
    }

    #[test]
    fn test_output_path_explicit_directory() {
        let layout = OutputLayout {
            destination: Destination::Directory { path: PathBuf::from("/out") },
            prefix: String::from("turbo_"),
        };
        assert_eq!(
            layout.output_path(Path::new("/videos/clip.MOV")).unwrap(),
            PathBuf::from("/out/turbo_clip.MOV"));
        assert!(layout.output_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_audio_parameters() {
        assert_eq!(AudioMode::Copy.parameters(), vec!["-c:a", "copy"]);
        assert_eq!(AudioMode::aac("128k").parameters(), vec!["-c:a", "aac", "-b:a", "128k"]);
    }

    #[test]
    fn test_profiles_differ_in_audio_and_range() {
        let standard = Profile::Standard.config();
        let turbo = Profile::Turbo.config();
        assert_eq!(standard.encoder.audio, AudioMode::aac("128k"));
        assert_eq!(turbo.encoder.audio, AudioMode::Copy);
        assert_eq!(turbo.encoder.quality_range, QualityRange { min: 20, max: 32 });
        assert_eq!(standard.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_resolve_precedence() {
        let file: ConfigOverrides = serde_json::from_str(r#"{
            "profile": "turbo",
            "quality": 30,
            "concurrency": 2,
            "audio": { "mode": "reencode", "codec": "libopus", "bitrate": "96k" }
        }"#).unwrap();
        let cli = ConfigOverrides {
            quality: Some(28),
            output_dir: Some(PathBuf::from("/out")),
            ..Default::default()
        };
        let config = resolve(Some(&file), &cli).unwrap();
        assert_eq!(config.encoder.preset, Preset::Fast);
        assert_eq!(config.encoder.quality, 28);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.encoder.audio, AudioMode::Reencode {
            codec: String::from("libopus"),
            bitrate: String::from("96k"),
        });
        assert_eq!(config.output.destination, Destination::Directory { path: PathBuf::from("/out") });
        assert_eq!(config.output.prefix, "turbo_");
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        let zero = ConfigOverrides { concurrency: Some(0), ..Default::default() };
        assert!(matches!(resolve(None, &zero), Err(RunnerError::InvalidConcurrency)));

        let turbo_too_low = ConfigOverrides {
            profile: Some(Profile::Turbo),
            quality: Some(18),
            ..Default::default()
        };
        assert!(matches!(resolve(None, &turbo_too_low), Err(RunnerError::QualityOutOfRange { .. })));
    }

    #[test]
    fn test_unknown_config_field_is_rejected() {
        assert!(serde_json::from_str::<ConfigOverrides>(r#"{ "workers": 4 }"#).is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        match ConfigOverrides::load(&path) {
            Err(RunnerError::Config { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected {:?}", other),
        }
    }
}
