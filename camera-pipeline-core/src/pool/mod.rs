pub mod buffer;
pub mod buffer_pool;
