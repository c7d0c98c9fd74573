pub mod config;
pub mod serde_fmt;
