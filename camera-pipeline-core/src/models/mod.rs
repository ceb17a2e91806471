pub mod component;
pub mod config;
pub mod diagnostics;
pub mod encoder;
pub mod error;
pub mod format;
pub mod frame;
pub mod params;
pub mod record;
pub mod state;
