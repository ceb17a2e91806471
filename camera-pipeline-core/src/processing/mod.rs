pub mod completion;
pub mod frame_assembler;
pub mod frame_signal;
pub mod negotiation;
