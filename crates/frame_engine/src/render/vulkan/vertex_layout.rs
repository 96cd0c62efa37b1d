//! Vulkan vertex input descriptions for [`Vertex`]
//!
//! Kept apart from the mesh module so the vertex type itself stays
//! backend-agnostic.

use ash::vk;
use std::mem::{offset_of, size_of};
use crate::render::mesh::Vertex;

/// Vulkan vertex layout implementation for the engine's Vertex type
pub struct VulkanVertexLayout;

impl VulkanVertexLayout {
    /// Single interleaved binding advancing per vertex
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    /// Position (location 0) and color (location 1)
    ///
    /// Normal and uv are stored in the buffer but not declared, matching the
    /// basic shaders the demo pipeline uses.
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
        ]
    }

    /// All four attributes, for shaders that consume normal (location 2) and uv (location 3)
    pub fn full_attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let mut attributes = Self::attribute_descriptions();
        attributes.push(attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)));
        attributes.push(attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)));
        attributes
    }
}

fn attribute(location: u32, format: vk::Format, offset: usize) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        binding: 0,
        location,
        format,
        offset: offset as u32,
    }
}
