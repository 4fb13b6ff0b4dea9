pub mod budget;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_buffer;
pub mod runner;
pub mod session;
