use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::encoder::{EncoderKind, EncoderPolicy};
use super::error::PipelineError;
use super::format::{Encoding, Rational};
use super::params::{CameraParameters, TimestampMode};

/// Sensor readout modes of the camera module.
///
/// The numbering matches the firmware's custom sensor config index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorMode {
    Invalid,
    /// 1920×1080, 16:9 cropped.
    Mode1,
    /// 3280×2464, 4:3 full sensor, up to 15 fps.
    Mode2,
    /// 3280×2464, 4:3 full sensor, long exposure.
    Mode3,
    /// 1640×1232, 4:3 binned.
    Mode4,
    /// 1640×922, 16:9 binned.
    Mode5,
    /// 1282×720, 16:9 binned and cropped.
    Mode6,
    /// 640×480, 4:3 binned and cropped.
    Mode7,
}

impl SensorMode {
    pub const ALL: [SensorMode; 7] = [
        Self::Mode1,
        Self::Mode2,
        Self::Mode3,
        Self::Mode4,
        Self::Mode5,
        Self::Mode6,
        Self::Mode7,
    ];

    pub fn index(&self) -> u32 {
        match self {
            Self::Invalid => 0,
            Self::Mode1 => 1,
            Self::Mode2 => 2,
            Self::Mode3 => 3,
            Self::Mode4 => 4,
            Self::Mode5 => 5,
            Self::Mode6 => 6,
            Self::Mode7 => 7,
        }
    }

    pub fn from_index(index: u32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.index() == index)
            .unwrap_or(Self::Invalid)
    }

    /// Picture width and height; `(0, 0)` for [`SensorMode::Invalid`].
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Invalid => (0, 0),
            Self::Mode1 => (1920, 1080),
            Self::Mode2 | Self::Mode3 => (3280, 2464),
            Self::Mode4 => (1640, 1232),
            Self::Mode5 => (1640, 922),
            Self::Mode6 => (1282, 720),
            Self::Mode7 => (640, 480),
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

impl fmt::Display for SensorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{}x{}", w, h)
    }
}

/// Parses `WIDTHxHEIGHT`; the first mode with those dimensions wins.
impl FromStr for SensorMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PipelineError::InvalidArgument(format!("invalid sensor mode: {}", s));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let w: u32 = w.trim().parse().map_err(|_| invalid())?;
        let h: u32 = h.trim().parse().map_err(|_| invalid())?;
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.dimensions() == (w, h))
            .ok_or_else(invalid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Still,
    Video,
}

impl FromStr for CaptureMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "still" => Ok(Self::Still),
            "video" => Ok(Self::Video),
            other => Err(PipelineError::InvalidArgument(format!(
                "unknown capture mode: {}",
                other
            ))),
        }
    }
}

/// Optional splitter stage between the capture port and the encoder.
///
/// Splitter output 0 always feeds the encoder. With `raw_tap` set, output 1
/// is delivered uncompressed through callbacks to the session's raw sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub raw_tap: bool,
    pub raw_encoding: Encoding,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            raw_tap: false,
            raw_encoding: Encoding::I420,
        }
    }
}

/// Camera-wide configuration committed through the control port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub max_stills_w: u32,
    pub max_stills_h: u32,
    pub stills_yuv422: bool,
    pub one_shot_stills: bool,
    pub max_preview_video_w: u32,
    pub max_preview_video_h: u32,
    pub num_preview_video_frames: u32,
    pub stills_capture_circular_buffer_height: u32,
    pub fast_preview_resume: bool,
    pub use_stc_timestamp: TimestampMode,
}

impl CameraConfig {
    /// Stills and preview both sized to the sensor mode.
    pub fn for_sensor_mode(mode: SensorMode) -> Self {
        let (w, h) = mode.dimensions();
        Self {
            max_stills_w: w,
            max_stills_h: h,
            stills_yuv422: false,
            one_shot_stills: true,
            max_preview_video_w: w,
            max_preview_video_h: h,
            num_preview_video_frames: 3,
            stills_capture_circular_buffer_height: 0,
            fast_preview_resume: false,
            use_stc_timestamp: TimestampMode::RawStc,
        }
    }
}

/// Everything needed to run the standard pipeline setup sequence.
#[derive(Debug, Clone)]
pub struct SessionConfiguration {
    /// Camera module index on the device (default: 0).
    pub camera_num: u32,

    /// Sensor readout mode; determines frame dimensions.
    pub sensor_mode: SensorMode,

    /// Still or video capture; selects the encoder kind.
    pub capture_mode: CaptureMode,

    /// Frame rate of the preview and video ports (0/1 lets the tunnel decide).
    pub frame_rate: Rational,

    /// Encoder policy, or None for the capture mode's default.
    pub encoder: Option<EncoderPolicy>,

    /// Insert a splitter between the capture port and the encoder.
    pub router: Option<RouterConfig>,

    /// Absorb the preview output in a null sink (default: true).
    pub preview: bool,

    /// Camera control values applied after open, or None to keep the device defaults.
    pub camera_params: Option<CameraParameters>,

    /// Longest wait for one frame, or None to wait indefinitely.
    pub capture_timeout: Option<Duration>,

    /// Pause between consecutive still captures.
    pub still_settle: Duration,
}

impl SessionConfiguration {
    pub fn encoder_policy(&self) -> EncoderPolicy {
        self.encoder
            .unwrap_or_else(|| EncoderPolicy::default_for(self.capture_mode))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.sensor_mode.is_valid() {
            return Err("sensor mode is not set".into());
        }
        if self.frame_rate.den == 0 {
            return Err("frame rate denominator must be non-zero".into());
        }
        let policy = self.encoder_policy();
        if policy.kind() != EncoderKind::for_capture_mode(self.capture_mode) {
            return Err(format!(
                "{:?} encoder policy does not fit {:?} capture",
                policy.kind(),
                self.capture_mode
            ));
        }
        policy.validate().map_err(|e| e.to_string())?;
        if let Some(params) = &self.camera_params {
            params.validate()?;
        }
        Ok(())
    }
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        Self {
            camera_num: 0,
            sensor_mode: SensorMode::Mode1,
            capture_mode: CaptureMode::Still,
            frame_rate: Rational::negotiated(),
            encoder: None,
            router: None,
            preview: true,
            camera_params: None,
            capture_timeout: None,
            still_settle: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::encoder::{H264Settings, JpegSettings};

    #[test]
    fn sensor_mode_parses_dimensions() {
        assert_eq!("1920x1080".parse::<SensorMode>().unwrap(), SensorMode::Mode1);
        assert_eq!("640X480".parse::<SensorMode>().unwrap(), SensorMode::Mode7);
        // Two modes share the full-sensor size; the first is chosen.
        assert_eq!("3280x2464".parse::<SensorMode>().unwrap(), SensorMode::Mode2);
    }

    #[test]
    fn sensor_mode_rejects_unknown_sizes() {
        assert!("1920x1081".parse::<SensorMode>().is_err());
        assert!("wide".parse::<SensorMode>().is_err());
        assert!("0x0".parse::<SensorMode>().is_err());
    }

    #[test]
    fn sensor_mode_index_round_trip() {
        for mode in SensorMode::ALL {
            assert_eq!(SensorMode::from_index(mode.index()), mode);
        }
        assert_eq!(SensorMode::from_index(42), SensorMode::Invalid);
        assert_eq!(SensorMode::Mode6.to_string(), "1282x720");
    }

    #[test]
    fn camera_config_follows_sensor_mode() {
        let config = CameraConfig::for_sensor_mode(SensorMode::Mode4);
        assert_eq!((config.max_stills_w, config.max_stills_h), (1640, 1232));
        assert_eq!(config.num_preview_video_frames, 3);
        assert!(config.one_shot_stills);
    }

    #[test]
    fn default_configuration_is_valid() {
        assert!(SessionConfiguration::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_invalid_sensor_mode() {
        let config = SessionConfiguration {
            sensor_mode: SensorMode::Invalid,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_policy_mode_mismatch() {
        let config = SessionConfiguration {
            capture_mode: CaptureMode::Still,
            encoder: Some(EncoderPolicy::H264(H264Settings::default())),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfiguration {
            capture_mode: CaptureMode::Video,
            encoder: Some(EncoderPolicy::Jpeg(JpegSettings::default())),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_denominator() {
        let config = SessionConfiguration {
            frame_rate: Rational::new(30, 0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
