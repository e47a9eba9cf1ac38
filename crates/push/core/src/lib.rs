//! Push Core Types
//!
//! Provider-agnostic message, outcome and response types shared by the
//! dispatch engine and every provider binding.

pub mod batch;
pub mod config;
mod message;
mod response;

pub use batch::batches;
pub use config::Config;
pub use message::*;
pub use response::*;
