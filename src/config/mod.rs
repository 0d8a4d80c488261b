#[cfg(feature = "cli")]
pub mod cli;
pub mod theme;
pub mod toml_config;

pub use theme::{Colors, Configuration, SharedConfiguration};
pub use toml_config::SdkConfig;
