//! # Unified Configuration System
//!
//! Configuration structures for the window, the Vulkan renderer and engine-wide
//! behaviour. Every type derives serde so an [`ApplicationConfig`] can be read
//! from TOML or RON through the [`Config`] trait.
//!
//! Missing fields fall back to their defaults, so a config file only needs to
//! name what it changes.

use serde::{Serialize, Deserialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};

/// # Shader Configuration
///
/// SPIR-V paths for the demo pipeline. Supports path resolution for
/// applications launched from different working directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries a few common locations and keeps the first hit for each stage.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        let shader_dirs = [
            "target/shaders/",
            "shaders/",
            "resources/shaders/",
            "../shaders/",
            "./",
        ];

        let mut vertex_path = None;
        let mut fragment_path = None;

        for dir in &shader_dirs {
            let vertex_test = format!("{dir}{base_vertex}");
            let fragment_test = format!("{dir}{base_fragment}");

            if vertex_path.is_none() && Path::new(&vertex_test).exists() {
                vertex_path = Some(vertex_test);
            }
            if fragment_path.is_none() && Path::new(&fragment_test).exists() {
                fragment_path = Some(fragment_test);
            }

            if vertex_path.is_some() && fragment_path.is_some() {
                break;
            }
        }

        Self {
            vertex_shader_path: vertex_path.unwrap_or_else(|| format!("shaders/{base_vertex}")),
            fragment_shader_path: fragment_path.unwrap_or_else(|| format!("shaders/{base_fragment}")),
        }
    }

    /// Whether both shader files exist on disk
    pub fn is_available(&self) -> bool {
        Path::new(&self.vertex_shader_path).exists() && Path::new(&self.fragment_shader_path).exists()
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("simple_shader.vert.spv", "simple_shader.frag.spv")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Initial client width in pixels
    pub width: u32,
    /// Initial client height in pixels
    pub height: u32,
}

impl WindowConfig {
    /// Create a window configuration
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new("Frame Engine", 800, 600)
    }
}

/// # Vulkan Renderer Configuration
///
/// Application metadata and debug features of the Vulkan backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanRendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Whether to enable Vulkan validation layers, `None` follows the build type
    pub enable_validation: Option<bool>,
}

impl VulkanRendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            enable_validation: None,
        }
    }

    /// Set application version
    #[must_use]
    pub const fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Resolved validation setting: explicit value, else on in debug builds
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }
        if self.application_name.contains('\0') {
            return Err(ConfigError::Invalid("Application name cannot contain NUL bytes".to_string()));
        }
        Ok(())
    }
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self::new("Frame Engine Application")
    }
}

/// # Engine Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine
    pub log_level: String,
    /// Optional OBJ model loaded by the viewer instead of the builtin cube
    pub model_path: Option<String>,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            model_path: None,
        }
    }

    /// Set log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration applications load at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Window configuration
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: VulkanRendererConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            engine: EngineConfig::default(),
            window: WindowConfig::default(),
            renderer: VulkanRendererConfig::new(app_name),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        self.renderer.validate()
    }
}

impl Config for ApplicationConfig {}
