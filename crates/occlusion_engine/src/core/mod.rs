//! Core engine configuration

pub mod config;

pub use config::{ApplicationConfig, CameraConfig, RendererConfig};
