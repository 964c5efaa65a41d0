pub mod assembler;
pub mod detector;
pub mod error;
pub mod frame_source;
pub mod pipeline;
pub mod sink;
pub mod transfer;

pub use error::{Error, Result};
