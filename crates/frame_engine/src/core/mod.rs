//! Core engine types shared across subsystems

pub mod config;

pub use config::{ApplicationConfig, EngineConfig, ShaderConfig, VulkanRendererConfig, WindowConfig};
