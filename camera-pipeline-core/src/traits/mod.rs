pub mod device;
pub mod frame_sink;
pub mod session_delegate;
