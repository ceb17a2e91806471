use crate::graph::component::Component;
use crate::models::encoder::{EncoderPolicy, H264Settings, JpegSettings, ProfileLevel};
use crate::models::error::PipelineError;
use crate::models::format::{PortFormat, Rational, DEFAULT_BITRATE};
use crate::models::params::Parameter;
use crate::traits::device::Device;

/// Configure an encoder's output from its input format and `policy`.
///
/// The output starts as a copy of the input, retargeted to the policy's
/// codec with the default bitrate and a negotiated frame rate. Codec-specific
/// settings are layered on top, recommitting whenever the format changes.
pub fn apply_encoder_policy<D: Device + ?Sized>(
    device: &D,
    encoder: &mut Component,
    policy: &EncoderPolicy,
) -> Result<(), PipelineError> {
    policy.validate()?;

    let mut format: PortFormat = encoder.input(0)?.format().clone();
    format.encoding = policy.output_encoding();
    format.encoding_variant = None;
    format.bitrate = DEFAULT_BITRATE;
    format.video.frame_rate = Rational::negotiated();
    format.profile = None;
    encoder.output_mut(0)?.commit_format(device, format)?;

    match policy {
        EncoderPolicy::H264(settings) => apply_h264(device, encoder, settings)?,
        EncoderPolicy::Jpeg(settings) => apply_jpeg(device, encoder, settings)?,
        EncoderPolicy::Png => {}
    }

    log::info!(
        "encoder configured: {} -> {}",
        encoder.input(0)?.format(),
        encoder.output(0)?.format()
    );
    Ok(())
}

fn apply_h264<D: Device + ?Sized>(
    device: &D,
    encoder: &mut Component,
    settings: &H264Settings,
) -> Result<(), PipelineError> {
    let profile = ProfileLevel {
        profile: settings.profile,
        level: settings.level,
    };

    let output = encoder.output_mut(0)?;
    let mut format = output.format().clone();
    format.bitrate = settings.bitrate;
    format.profile = Some(profile);
    output.commit_format(device, format)?;

    let output_ref = output.port_ref();
    device.set_parameter(output_ref, &Parameter::VideoProfile(profile))?;

    let flags = settings.flags;
    device.set_parameter(
        encoder.input(0)?.port_ref(),
        &Parameter::ImmutableInput(flags.immutable_input),
    )?;
    device.set_parameter(output_ref, &Parameter::InlineHeader(flags.inline_header))?;
    device.set_parameter(output_ref, &Parameter::SpsTiming(flags.sps_timing))?;
    device.set_parameter(output_ref, &Parameter::InlineVectors(flags.inline_vectors))?;

    // The encoder only picks up the profile on a fresh commit.
    let output = encoder.output_mut(0)?;
    let format = output.format().clone();
    output.commit_format(device, format)
}

fn apply_jpeg<D: Device + ?Sized>(
    device: &D,
    encoder: &mut Component,
    settings: &JpegSettings,
) -> Result<(), PipelineError> {
    let output = encoder.output(0)?.port_ref();
    device.set_parameter(output, &Parameter::JpegQuality(settings.quality))
}
