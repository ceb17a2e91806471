use std::fmt;

use serde::{Deserialize, Serialize};

use super::encoder::ProfileLevel;

/// Hardware requires frame widths padded to this many pixels.
pub const WIDTH_ALIGNMENT: u32 = 32;
/// Hardware requires frame heights padded to this many pixels.
pub const HEIGHT_ALIGNMENT: u32 = 16;

/// Bitrate applied to every encoder output before a codec-specific override.
pub const DEFAULT_BITRATE: u32 = 17_000_000;

/// Round `n` up to the next multiple of `alignment`.
pub fn align_up(n: u32, alignment: u32) -> u32 {
    if alignment == 0 {
        return n;
    }
    n.div_ceil(alignment) * alignment
}

/// Elementary stream encoding, identified on the wire by a FourCC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Vendor-internal image handle; only meaningful across a tunnel.
    Opaque,
    I420,
    Rgb24,
    Bgr24,
    H264,
    Mjpeg,
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl Encoding {
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::Opaque => *b"OPQV",
            Self::I420 => *b"I420",
            Self::Rgb24 => *b"RGB3",
            Self::Bgr24 => *b"BGR3",
            Self::H264 => *b"H264",
            Self::Mjpeg => *b"MJPG",
            Self::Jpeg => *b"JPEG",
            Self::Png => *b"PNG ",
            Self::Gif => *b"GIF ",
            Self::Bmp => *b"BMP ",
        }
    }

    /// Whether the encoding is produced by an encoder component.
    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            Self::H264 | Self::Mjpeg | Self::Jpeg | Self::Png | Self::Gif | Self::Bmp
        )
    }

    /// Conventional file extension for a stream of this encoding.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Opaque | Self::I420 => "yuv",
            Self::Rgb24 | Self::Bgr24 => "rgb",
            Self::H264 => "h264",
            Self::Mjpeg => "mjpeg",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.fourcc()))
    }
}

/// A rational number, used for frame rates and control values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Frame rate that leaves the decision to the connected peer.
    pub const fn negotiated() -> Self {
        Self { num: 0, den: 1 }
    }

    pub fn is_negotiated(&self) -> bool {
        self.num == 0
    }

    /// Floating-point value; zero when the denominator is zero.
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::negotiated()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Video geometry of a port: padded dimensions, visible crop, frame rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub crop: Rect,
    pub frame_rate: Rational,
}

impl VideoFormat {
    /// Geometry for a `width`×`height` picture, padded to hardware alignment
    /// with the crop covering exactly the visible picture.
    pub fn for_resolution(width: u32, height: u32, frame_rate: Rational) -> Self {
        Self {
            width: align_up(width, WIDTH_ALIGNMENT),
            height: align_up(height, HEIGHT_ALIGNMENT),
            crop: Rect {
                x: 0,
                y: 0,
                width: width as i32,
                height: height as i32,
            },
            frame_rate,
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.width % WIDTH_ALIGNMENT == 0 && self.height % HEIGHT_ALIGNMENT == 0
    }
}

/// Everything committed to a port in one format commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortFormat {
    pub encoding: Encoding,
    pub encoding_variant: Option<Encoding>,
    pub video: VideoFormat,
    /// Target bitrate in bits per second; zero for uncompressed ports.
    pub bitrate: u32,
    /// Only set on H.264 encoder outputs.
    pub profile: Option<ProfileLevel>,
}

impl PortFormat {
    pub fn new(encoding: Encoding, encoding_variant: Option<Encoding>, video: VideoFormat) -> Self {
        Self {
            encoding,
            encoding_variant,
            video,
            bitrate: 0,
            profile: None,
        }
    }
}

impl Default for PortFormat {
    fn default() -> Self {
        Self::new(Encoding::Opaque, None, VideoFormat::default())
    }
}

impl fmt::Display for PortFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.video;
        write!(
            f,
            "{} {}x{} @ {:.2} fps, crop={} {} {} {}",
            self.encoding,
            v.width,
            v.height,
            v.frame_rate.as_f64(),
            v.crop.x,
            v.crop.y,
            v.crop.width,
            v.crop.height
        )?;
        if self.bitrate > 0 {
            write!(f, ", {} bps", self.bitrate)?;
        }
        Ok(())
    }
}

/// Buffer count and size a port advertises: what it recommends and the least
/// it can work with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferRequirements {
    pub num_min: u32,
    pub num_recommended: u32,
    pub size_min: u32,
    pub size_recommended: u32,
}

impl BufferRequirements {
    /// `(count, size)` to allocate: the recommendation, raised to the minimum.
    pub fn resolve(&self) -> (u32, u32) {
        (
            self.num_recommended.max(self.num_min),
            self.size_recommended.max(self.size_min),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn align_up_pads_to_granularity() {
        assert_eq!(align_up(1920, 32), 1920);
        assert_eq!(align_up(1080, 16), 1088);
        assert_eq!(align_up(1282, 32), 1312);
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn resolution_is_aligned_with_exact_crop() {
        let video = VideoFormat::for_resolution(1920, 1080, Rational::new(30, 1));
        assert_eq!(video.width, 1920);
        assert_eq!(video.height, 1088);
        assert_eq!(video.crop.width, 1920);
        assert_eq!(video.crop.height, 1080);
        assert!(video.is_aligned());
    }

    #[test]
    fn buffer_count_takes_larger_of_recommended_and_minimum() {
        let low_recommendation = BufferRequirements {
            num_min: 3,
            num_recommended: 2,
            size_min: 1024,
            size_recommended: 4096,
        };
        assert_eq!(low_recommendation.resolve(), (3, 4096));

        let high_recommendation = BufferRequirements {
            num_min: 2,
            num_recommended: 5,
            size_min: 8192,
            size_recommended: 0,
        };
        assert_eq!(high_recommendation.resolve(), (5, 8192));
    }

    #[test]
    fn frame_rate_value() {
        assert_relative_eq!(Rational::new(30, 1).as_f64(), 30.0);
        assert_relative_eq!(Rational::new(30000, 1001).as_f64(), 29.97, epsilon = 1e-3);
        assert_relative_eq!(Rational::new(5, 0).as_f64(), 0.0);
        assert!(Rational::negotiated().is_negotiated());
    }

    #[test]
    fn encoding_fourcc_display() {
        assert_eq!(Encoding::H264.to_string(), "H264");
        assert_eq!(Encoding::Png.to_string(), "PNG ");
        assert!(Encoding::Jpeg.is_compressed());
        assert!(!Encoding::I420.is_compressed());
    }
}
