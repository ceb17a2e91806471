use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use camera_pipeline_core::{
    AwbMode, CameraParameters, CameraUseCase, CaptureMode, EncoderPolicy, ExposureMode, H264Profile,
    H264Settings, JpegSettings, Rational, RouterConfig, SensorMode, SessionConfiguration,
};

#[derive(Parser)]
#[command(name = "picam-sensor")]
#[command(about = "Capture stills or video through the camera pipeline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture one or more still images
    Still {
        /// Sensor mode as WIDTHxHEIGHT
        #[arg(short, long, default_value = "1920x1080")]
        mode: SensorMode,

        /// Still image codec
        #[arg(long, value_enum, default_value_t = StillCodec::Png)]
        codec: StillCodec,

        /// JPEG quality (1-100)
        #[arg(long, default_value_t = 85)]
        quality: u32,

        /// Number of stills to take; with a file output each gets a numbered file
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Pause between stills in milliseconds
        #[arg(long, default_value_t = 1000)]
        settle_ms: u64,

        /// Also write uncompressed I420 frames to this file
        #[arg(long)]
        raw: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        camera: CameraArgs,
    },

    /// Record an H.264 elementary stream
    Video {
        /// Sensor mode as WIDTHxHEIGHT
        #[arg(short, long, default_value = "1920x1080")]
        mode: SensorMode,

        /// Recording duration in seconds
        #[arg(short, long, default_value_t = 10)]
        duration: u64,

        /// Frames per second
        #[arg(long, default_value_t = 30)]
        framerate: i32,

        /// Target bitrate in bits per second
        #[arg(long, default_value_t = 17_000_000)]
        bitrate: u32,

        /// H.264 profile (baseline, main, high)
        #[arg(long, default_value = "high")]
        profile: H264Profile,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        camera: CameraArgs,
    },

    /// List captures in the default capture directory
    List,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StillCodec {
    Png,
    Jpeg,
}

/// Where frames go. With neither flag set, a timestamped file is created
/// in the capture directory.
#[derive(Args)]
pub struct OutputArgs {
    /// Output file path
    #[arg(short, long, conflicts_with = "stream")]
    pub output: Option<PathBuf>,

    /// Send length-prefixed frames to HOST:PORT instead of a file
    #[arg(long)]
    pub stream: Option<String>,
}

#[derive(Args)]
pub struct CameraArgs {
    /// Camera module index
    #[arg(short, long, default_value_t = 0)]
    pub camera: u32,

    /// Seconds to wait for a frame before giving up
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Skip the preview null sink
    #[arg(long)]
    pub no_preview: bool,

    /// Automatic white balance mode
    #[arg(long)]
    pub awb: Option<AwbMode>,

    /// Exposure mode
    #[arg(long)]
    pub exposure: Option<ExposureMode>,

    /// ISO sensitivity (0 = auto)
    #[arg(long)]
    pub iso: Option<u32>,

    /// Shutter speed in microseconds (0 = auto)
    #[arg(long)]
    pub shutter: Option<u32>,

    /// Brightness in percent (0-100)
    #[arg(long)]
    pub brightness: Option<i32>,
}

impl CameraArgs {
    /// Camera parameters, or None when no image control was given.
    pub fn parameters(&self, mode: CaptureMode) -> Option<CameraParameters> {
        let any = self.awb.is_some()
            || self.exposure.is_some()
            || self.iso.is_some()
            || self.shutter.is_some()
            || self.brightness.is_some();
        if !any {
            return None;
        }

        let mut params = CameraParameters::default();
        if mode == CaptureMode::Video {
            params.use_case = CameraUseCase::VideoCapture;
        }
        if let Some(awb) = self.awb {
            params.awb_mode = awb;
        }
        if let Some(exposure) = self.exposure {
            params.exposure_mode = exposure;
        }
        if let Some(iso) = self.iso {
            params.iso = iso;
        }
        if let Some(shutter) = self.shutter {
            params.shutter_speed = shutter;
        }
        if let Some(brightness) = self.brightness {
            params.brightness = Rational::new(brightness, 100);
        }
        Some(params)
    }

    fn apply(&self, config: &mut SessionConfiguration) {
        config.camera_num = self.camera;
        config.preview = !self.no_preview;
        config.capture_timeout = Some(Duration::from_secs(self.timeout));
        config.camera_params = self.parameters(config.capture_mode);
    }
}

pub fn still_config(
    mode: SensorMode,
    codec: StillCodec,
    quality: u32,
    settle_ms: u64,
    raw_tap: bool,
    camera: &CameraArgs,
) -> SessionConfiguration {
    let encoder = match codec {
        StillCodec::Png => EncoderPolicy::Png,
        StillCodec::Jpeg => EncoderPolicy::Jpeg(JpegSettings { quality }),
    };
    let mut config = SessionConfiguration {
        sensor_mode: mode,
        capture_mode: CaptureMode::Still,
        encoder: Some(encoder),
        router: raw_tap.then(|| RouterConfig {
            raw_tap: true,
            ..Default::default()
        }),
        still_settle: Duration::from_millis(settle_ms),
        ..Default::default()
    };
    camera.apply(&mut config);
    config
}

pub fn video_config(
    mode: SensorMode,
    framerate: i32,
    bitrate: u32,
    profile: H264Profile,
    camera: &CameraArgs,
) -> SessionConfiguration {
    let frame_rate = Rational::new(framerate, 1);
    let mut config = SessionConfiguration {
        sensor_mode: mode,
        capture_mode: CaptureMode::Video,
        frame_rate,
        encoder: Some(EncoderPolicy::H264(H264Settings {
            bitrate,
            frame_rate,
            profile,
            ..Default::default()
        })),
        ..Default::default()
    };
    camera.apply(&mut config);
    config
}
