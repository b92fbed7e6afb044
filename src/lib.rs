pub mod api;
pub mod config;
pub mod core_types;
pub mod coverage;
pub mod error;
pub mod features;
pub mod loader;
pub mod options;
pub mod scoring;
pub mod search;

pub use api::{Decoder, Translation};
pub use error::{DecResult, DecoderError};
// cmd and reports are binary modules (see main.rs).
