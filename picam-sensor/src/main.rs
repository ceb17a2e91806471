mod capture_state;
mod cli;
mod commands;
mod still_files;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=debug or RUST_LOG=camera_pipeline_core=trace
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Still {
            mode,
            codec,
            quality,
            count,
            settle_ms,
            raw,
            output,
            camera,
        } => {
            let config = cli::still_config(mode, codec, quality, settle_ms, raw.is_some(), &camera);
            commands::take_stills(config, count, &output, raw)
        }
        Commands::Video {
            mode,
            duration,
            framerate,
            bitrate,
            profile,
            output,
            camera,
        } => {
            let config = cli::video_config(mode, framerate, bitrate, profile, &camera);
            commands::record_video(config, duration, &output)
        }
        Commands::List => commands::list_captures(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("picam-sensor: {}", e);
            ExitCode::FAILURE
        }
    }
}
