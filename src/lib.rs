#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod device;
pub mod feed;
pub mod geometry;
pub mod logging;
pub mod playback;
pub mod tracker;
pub mod ui;
pub mod video;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
