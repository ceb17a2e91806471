//! Synthetic encoded pictures.
//!
//! Each payload carries the real container markers of its encoding (JPEG
//! SOI/EOI, PNG signature and IHDR, H.264 Annex B start codes) around a
//! deterministic body, so a captured file is recognisable and two captures
//! of the same sequence number are byte-identical.

use camera_pipeline_core::models::format::Encoding;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
const ANNEX_B_START: [u8; 4] = [0, 0, 0, 1];

/// Every Nth H.264 frame is an IDR picture carrying SPS and PPS.
pub const H264_IDR_INTERVAL: u64 = 30;

/// Build the picture for frame `sequence` at `width`×`height`.
pub fn synthesize(encoding: Encoding, width: u32, height: u32, sequence: u64) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    match encoding {
        Encoding::Jpeg | Encoding::Mjpeg => jpeg(pixels / 20, sequence),
        Encoding::Png => png(width, height, pixels / 16, sequence),
        Encoding::H264 => h264(pixels / 50, sequence),
        Encoding::Gif => framed(b"GIF89a", b";", pixels / 16, sequence),
        Encoding::Bmp => framed(b"BM", b"", pixels * 3, sequence),
        Encoding::I420 | Encoding::Opaque => body(pixels * 3 / 2, sequence),
        Encoding::Rgb24 | Encoding::Bgr24 => body(pixels * 3, sequence),
    }
}

/// Whether frame `sequence` of an H.264 stream is a keyframe.
pub fn is_keyframe(encoding: Encoding, sequence: u64) -> bool {
    match encoding {
        Encoding::H264 => sequence % H264_IDR_INTERVAL == 0,
        _ => true,
    }
}

fn body(len: usize, sequence: u64) -> Vec<u8> {
    let seed = sequence as u8;
    // Values stay below 0xFF so JPEG bodies never contain a marker.
    (0..len).map(|i| (i as u8).wrapping_add(seed) % 0xfe).collect()
}

fn framed(head: &[u8], tail: &[u8], len: usize, sequence: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(head.len() + len + tail.len());
    out.extend_from_slice(head);
    out.extend(body(len, sequence));
    out.extend_from_slice(tail);
    out
}

fn jpeg(len: usize, sequence: u64) -> Vec<u8> {
    let mut out = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];
    out.extend_from_slice(b"JFIF\0");
    out.extend_from_slice(&[0x01, 0x02, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    out.extend(body(len, sequence));
    out.extend_from_slice(&[0xff, 0xd9]);
    out
}

fn png(width: u32, height: u32, len: usize, sequence: u64) -> Vec<u8> {
    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    // 8-bit truecolour, default compression/filter/interlace
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);

    let mut out = PNG_SIGNATURE.to_vec();
    png_chunk(&mut out, b"IHDR", &ihdr);
    png_chunk(&mut out, b"IDAT", &body(len, sequence));
    png_chunk(&mut out, b"IEND", &[]);
    out
}

/// Chunk layout only; the CRC field is zeroed.
fn png_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0; 4]);
}

fn h264(len: usize, sequence: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    if sequence % H264_IDR_INTERVAL == 0 {
        nal(&mut out, 0x67, &[100, 0, 42]);
        nal(&mut out, 0x68, &[0xce, 0x3c, 0x80]);
        nal(&mut out, 0x65, &escape(&body(len, sequence)));
    } else {
        nal(&mut out, 0x41, &escape(&body(len / 4, sequence)));
    }
    out
}

fn nal(out: &mut Vec<u8>, header: u8, payload: &[u8]) {
    out.extend_from_slice(&ANNEX_B_START);
    out.push(header);
    out.extend_from_slice(payload);
}

/// Insert emulation-prevention bytes so the payload never contains a start code.
fn escape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 64);
    let mut zeros = 0;
    for &byte in payload {
        if zeros >= 2 && byte <= 3 {
            out.push(3);
            zeros = 0;
        }
        out.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }
    out
}
