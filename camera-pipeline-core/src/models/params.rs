use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::config::CameraConfig;
use super::encoder::ProfileLevel;
use super::error::PipelineError;
use super::format::Rational;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwbMode {
    Off,
    Auto,
    Sunlight,
    Cloudy,
    Shade,
    Tungsten,
    Fluorescent,
    Incandescent,
    Flash,
    Horizon,
}

impl FromStr for AwbMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "off" => Self::Off,
            "auto" => Self::Auto,
            "sunlight" => Self::Sunlight,
            "cloudy" => Self::Cloudy,
            "shade" => Self::Shade,
            "tungsten" => Self::Tungsten,
            "fluorescent" => Self::Fluorescent,
            "incandescent" => Self::Incandescent,
            "flash" => Self::Flash,
            "horizon" => Self::Horizon,
            other => {
                return Err(PipelineError::InvalidArgument(format!(
                    "unknown AWB mode: {}",
                    other
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureMode {
    Off,
    Auto,
    Night,
    NightPreview,
    Backlight,
    Spotlight,
    Sports,
    Snow,
    Beach,
    VeryLong,
    FixedFps,
    Antishake,
    Fireworks,
}

impl FromStr for ExposureMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "off" => Self::Off,
            "auto" => Self::Auto,
            "night" => Self::Night,
            "nightpreview" => Self::NightPreview,
            "backlight" => Self::Backlight,
            "spotlight" => Self::Spotlight,
            "sports" => Self::Sports,
            "snow" => Self::Snow,
            "beach" => Self::Beach,
            "verylong" => Self::VeryLong,
            "fixedfps" => Self::FixedFps,
            "antishake" => Self::Antishake,
            "fireworks" => Self::Fireworks,
            other => {
                return Err(PipelineError::InvalidArgument(format!(
                    "unknown exposure mode: {}",
                    other
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraUseCase {
    Unknown,
    StillsCapture,
    VideoCapture,
}

/// Source of the buffer presentation timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    Zero,
    RawStc,
    ResetStc,
}

/// Identifies a parameter without its value, for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterId {
    CameraNum,
    SensorMode,
    CameraConfig,
    Capture,
    AwbMode,
    ExposureMode,
    Sharpness,
    Contrast,
    Brightness,
    Saturation,
    Iso,
    ShutterSpeed,
    UseCase,
    VideoProfile,
    ImmutableInput,
    InlineHeader,
    SpsTiming,
    InlineVectors,
    JpegQuality,
}

/// A typed control value set on a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    CameraNum(u32),
    /// Sensor mode index, see [`crate::SensorMode::index`].
    SensorMode(u32),
    CameraConfig(CameraConfig),
    Capture(bool),
    AwbMode(AwbMode),
    ExposureMode(ExposureMode),
    Sharpness(Rational),
    Contrast(Rational),
    Brightness(Rational),
    Saturation(Rational),
    /// 0 is auto.
    Iso(u32),
    /// Microseconds; 0 is auto.
    ShutterSpeed(u32),
    UseCase(CameraUseCase),
    VideoProfile(ProfileLevel),
    ImmutableInput(bool),
    InlineHeader(bool),
    SpsTiming(bool),
    InlineVectors(bool),
    JpegQuality(u32),
}

impl Parameter {
    pub fn id(&self) -> ParameterId {
        match self {
            Self::CameraNum(_) => ParameterId::CameraNum,
            Self::SensorMode(_) => ParameterId::SensorMode,
            Self::CameraConfig(_) => ParameterId::CameraConfig,
            Self::Capture(_) => ParameterId::Capture,
            Self::AwbMode(_) => ParameterId::AwbMode,
            Self::ExposureMode(_) => ParameterId::ExposureMode,
            Self::Sharpness(_) => ParameterId::Sharpness,
            Self::Contrast(_) => ParameterId::Contrast,
            Self::Brightness(_) => ParameterId::Brightness,
            Self::Saturation(_) => ParameterId::Saturation,
            Self::Iso(_) => ParameterId::Iso,
            Self::ShutterSpeed(_) => ParameterId::ShutterSpeed,
            Self::UseCase(_) => ParameterId::UseCase,
            Self::VideoProfile(_) => ParameterId::VideoProfile,
            Self::ImmutableInput(_) => ParameterId::ImmutableInput,
            Self::InlineHeader(_) => ParameterId::InlineHeader,
            Self::SpsTiming(_) => ParameterId::SpsTiming,
            Self::InlineVectors(_) => ParameterId::InlineVectors,
            Self::JpegQuality(_) => ParameterId::JpegQuality,
        }
    }
}

/// Image controls applied to the camera's control port.
///
/// Sharpness, contrast and saturation range over -1..=1, brightness over 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub awb_mode: AwbMode,
    pub exposure_mode: ExposureMode,
    pub sharpness: Rational,
    pub contrast: Rational,
    pub brightness: Rational,
    pub saturation: Rational,
    pub iso: u32,
    pub shutter_speed: u32,
    pub use_case: CameraUseCase,
}

impl CameraParameters {
    pub fn validate(&self) -> Result<(), String> {
        let signed = [
            ("sharpness", self.sharpness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ];
        for (name, value) in signed {
            if value.den == 0 || !(-1.0..=1.0).contains(&value.as_f64()) {
                return Err(format!("{} out of range: {}/{}", name, value.num, value.den));
            }
        }
        let b = self.brightness;
        if b.den == 0 || !(0.0..=1.0).contains(&b.as_f64()) {
            return Err(format!("brightness out of range: {}/{}", b.num, b.den));
        }
        if self.iso > 1600 {
            return Err(format!("ISO out of range: {}", self.iso));
        }
        Ok(())
    }

    /// The control parameters in the order they are applied.
    pub fn to_parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::AwbMode(self.awb_mode),
            Parameter::ExposureMode(self.exposure_mode),
            Parameter::Sharpness(self.sharpness),
            Parameter::Contrast(self.contrast),
            Parameter::Brightness(self.brightness),
            Parameter::Saturation(self.saturation),
            Parameter::Iso(self.iso),
            Parameter::ShutterSpeed(self.shutter_speed),
            Parameter::UseCase(self.use_case),
        ]
    }
}

impl Default for CameraParameters {
    fn default() -> Self {
        Self {
            awb_mode: AwbMode::Auto,
            exposure_mode: ExposureMode::Auto,
            sharpness: Rational::new(0, 1),
            contrast: Rational::new(0, 1),
            brightness: Rational::new(50, 100),
            saturation: Rational::new(0, 1),
            iso: 0,
            shutter_speed: 0,
            use_case: CameraUseCase::StillsCapture,
        }
    }
}
