//! Shader module loading and lookup by logical kernel name.

use log::{debug, info};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use wgpu::{ShaderModuleDescriptor, ShaderSource};

/// Error types for shader loading operations.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader '{name}' has no source")]
    EmptySource { name: String },

    #[error("shader '{name}' not found in library")]
    NotLoaded { name: String },
}

/// Central registry of compiled shader modules keyed by kernel name.
pub struct ShaderLibrary {
    modules: HashMap<String, Arc<wgpu::ShaderModule>>,
}

impl ShaderLibrary {
    /// Create a new empty shader library.
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Load a shader from a WGSL source string.
    pub fn load_from_source(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        source: &str,
    ) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        self.load_composed(device, name, &[source])
    }

    /// Load a shader whose source is the concatenation of `parts`.
    ///
    /// Used to prepend shared struct and helper definitions to a kernel.
    pub fn load_composed(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        parts: &[&str],
    ) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        if parts.iter().all(|part| part.trim().is_empty()) {
            return Err(ShaderError::EmptySource {
                name: name.to_string(),
            });
        }
        debug!("Loading shader '{}' from {} source part(s)", name, parts.len());

        let source = parts.join("\n");
        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some(name),
            source: ShaderSource::Wgsl(source.into()),
        });

        let arc_module = Arc::new(module);
        let replaced = self
            .modules
            .insert(name.to_string(), arc_module.clone())
            .is_some();

        if replaced {
            info!("Replaced shader '{}'", name);
        } else {
            info!("Loaded shader '{}'", name);
        }

        Ok(arc_module)
    }

    /// Get a previously loaded shader by name.
    pub fn get(&self, name: &str) -> Option<Arc<wgpu::ShaderModule>> {
        self.modules.get(name).cloned()
    }

    /// Get a previously loaded shader, failing with [`ShaderError::NotLoaded`].
    pub fn require(&self, name: &str) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        self.get(name).ok_or_else(|| ShaderError::NotLoaded {
            name: name.to_string(),
        })
    }

    /// Number of loaded shaders.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the shader library is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}
