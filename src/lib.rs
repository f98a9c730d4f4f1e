#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod action;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod probe;
pub mod ratelimit;
pub mod resources;
pub mod state;
pub mod status;
pub mod supervisor;

pub use config::Config;
pub use error::{Result, WardenError};
