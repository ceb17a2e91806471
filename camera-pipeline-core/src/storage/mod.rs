pub mod file_sink;
pub mod metadata;
pub mod stream_sink;
