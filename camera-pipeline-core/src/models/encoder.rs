use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::config::CaptureMode;
use super::error::PipelineError;
use super::format::{Encoding, Rational, DEFAULT_BITRATE};

/// Which hardware encoder a policy drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    Video,
    Image,
}

impl EncoderKind {
    pub fn for_capture_mode(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Still => Self::Image,
            CaptureMode::Video => Self::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum H264Profile {
    Baseline,
    Main,
    High,
}

impl H264Profile {
    /// `profile_idc` as carried in the stream's SPS.
    pub fn idc(&self) -> u32 {
        match self {
            Self::Baseline => 66,
            Self::Main => 77,
            Self::High => 100,
        }
    }
}

impl TryFrom<u32> for H264Profile {
    type Error = PipelineError;

    fn try_from(idc: u32) -> Result<Self, Self::Error> {
        match idc {
            66 => Ok(Self::Baseline),
            77 => Ok(Self::Main),
            100 => Ok(Self::High),
            other => Err(PipelineError::FormatRejected(format!(
                "no H.264 profile for profile_idc {}",
                other
            ))),
        }
    }
}

impl FromStr for H264Profile {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "main" => Ok(Self::Main),
            "high" => Ok(Self::High),
            other => Err(PipelineError::FormatRejected(format!(
                "unknown H.264 profile: {}",
                other
            ))),
        }
    }
}

/// H.264 level, named by its `level_idc` (e.g. 4.2 is `42`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum H264Level {
    L2,
    L21,
    L22,
    L3,
    L31,
    L32,
    L4,
    L41,
    L42,
    L5,
    L51,
}

impl H264Level {
    pub fn idc(&self) -> u32 {
        match self {
            Self::L2 => 20,
            Self::L21 => 21,
            Self::L22 => 22,
            Self::L3 => 30,
            Self::L31 => 31,
            Self::L32 => 32,
            Self::L4 => 40,
            Self::L41 => 41,
            Self::L42 => 42,
            Self::L5 => 50,
            Self::L51 => 51,
        }
    }
}

impl TryFrom<u32> for H264Level {
    type Error = PipelineError;

    fn try_from(idc: u32) -> Result<Self, Self::Error> {
        Ok(match idc {
            20 => Self::L2,
            21 => Self::L21,
            22 => Self::L22,
            30 => Self::L3,
            31 => Self::L31,
            32 => Self::L32,
            40 => Self::L4,
            41 => Self::L41,
            42 => Self::L42,
            50 => Self::L5,
            51 => Self::L51,
            other => {
                return Err(PipelineError::FormatRejected(format!(
                    "no H.264 level for level_idc {}",
                    other
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileLevel {
    pub profile: H264Profile,
    pub level: H264Level,
}

/// Stream-shaping switches of the video encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderFlags {
    /// Input buffers are not modified after submission.
    pub immutable_input: bool,
    /// Repeat SPS/PPS before every keyframe.
    pub inline_header: bool,
    /// Include VUI timing information in the SPS.
    pub sps_timing: bool,
    /// Emit motion vectors alongside the encoded frames.
    pub inline_vectors: bool,
}

impl Default for EncoderFlags {
    fn default() -> Self {
        Self {
            immutable_input: true,
            inline_header: false,
            sps_timing: false,
            inline_vectors: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct H264Settings {
    pub bitrate: u32,
    /// Informational only: the output rate is negotiated over the tunnel.
    pub frame_rate: Rational,
    pub profile: H264Profile,
    pub level: H264Level,
    pub flags: EncoderFlags,
}

impl Default for H264Settings {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            frame_rate: Rational::new(30, 1),
            profile: H264Profile::High,
            level: H264Level::L42,
            flags: EncoderFlags::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JpegSettings {
    /// Quantisation quality, 1–100.
    pub quality: u32,
}

impl Default for JpegSettings {
    fn default() -> Self {
        Self { quality: 85 }
    }
}

/// Codec selection plus the codec-specific parameter record.
///
/// Consumed by [`crate::processing::negotiation::apply_encoder_policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "lowercase")]
pub enum EncoderPolicy {
    H264(H264Settings),
    Jpeg(JpegSettings),
    Png,
}

impl EncoderPolicy {
    pub fn kind(&self) -> EncoderKind {
        match self {
            Self::H264(_) => EncoderKind::Video,
            Self::Jpeg(_) | Self::Png => EncoderKind::Image,
        }
    }

    pub fn output_encoding(&self) -> Encoding {
        match self {
            Self::H264(_) => Encoding::H264,
            Self::Jpeg(_) => Encoding::Jpeg,
            Self::Png => Encoding::Png,
        }
    }

    /// Policy used when none is configured: PNG stills, H.264 video.
    pub fn default_for(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Still => Self::Png,
            CaptureMode::Video => Self::H264(H264Settings::default()),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            Self::H264(settings) => {
                if settings.bitrate == 0 {
                    return Err(PipelineError::InvalidArgument(
                        "H.264 bitrate must be positive".into(),
                    ));
                }
            }
            Self::Jpeg(settings) => {
                if !(1..=100).contains(&settings.quality) {
                    return Err(PipelineError::InvalidArgument(format!(
                        "JPEG quality out of range: {}",
                        settings.quality
                    )));
                }
            }
            Self::Png => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_idc_mapping_round_trips_for_known_levels() {
        assert_eq!(H264Level::try_from(42).unwrap(), H264Level::L42);
        assert_eq!(H264Level::L42.idc(), 42);
        assert_eq!(H264Level::try_from(20).unwrap(), H264Level::L2);
    }

    #[test]
    fn unmapped_profile_or_level_is_rejected() {
        assert!(matches!(
            H264Level::try_from(43),
            Err(PipelineError::FormatRejected(_))
        ));
        assert!(matches!(
            H264Profile::try_from(88),
            Err(PipelineError::FormatRejected(_))
        ));
        assert!(matches!(
            "extended".parse::<H264Profile>(),
            Err(PipelineError::FormatRejected(_))
        ));
    }

    #[test]
    fn policy_kind_follows_codec() {
        assert_eq!(EncoderPolicy::Png.kind(), EncoderKind::Image);
        assert_eq!(
            EncoderPolicy::Jpeg(JpegSettings::default()).kind(),
            EncoderKind::Image
        );
        assert_eq!(
            EncoderPolicy::default_for(CaptureMode::Video).kind(),
            EncoderKind::Video
        );
    }

    #[test]
    fn default_h264_settings() {
        let settings = H264Settings::default();
        assert_eq!(settings.bitrate, 17_000_000);
        assert_eq!(settings.profile, H264Profile::High);
        assert_eq!(settings.level, H264Level::L42);
        assert!(settings.flags.immutable_input);
        assert!(!settings.flags.inline_header);
    }

    #[test]
    fn validate_rejects_bad_jpeg_quality() {
        let policy = EncoderPolicy::Jpeg(JpegSettings { quality: 0 });
        assert!(policy.validate().is_err());
        assert!(EncoderPolicy::Png.validate().is_ok());
    }

    #[test]
    fn policy_serializes_with_codec_tag() {
        let json = serde_json::to_string(&EncoderPolicy::Png).unwrap();
        assert_eq!(json, r#"{"codec":"png"}"#);
    }
}
