//! Mesh representation for 3D models
//!
//! [`MeshBuilder`] is CPU-side build data: an interleaved vertex list and an
//! optional index list. [`GpuMesh`] owns the device-local buffers created from
//! it through a staging upload and records the bind and draw commands.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::assets::{MeshError, ObjLoader};
use crate::render::backend::{BufferAllocator, CommandEncoder, GpuBuffer};
use crate::render::vulkan::VulkanResult;

/// Interleaved vertex as laid out in the vertex buffer (44 bytes)
///
/// Equality is exact component-wise float equality, so two vertices that
/// differ only in normal or uv are distinct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Linear RGB color
    pub color: [f32; 3],
    /// Surface normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Vertex with position and color; normal and uv are zero
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            position,
            color,
            normal: [0.0; 3],
            uv: [0.0; 2],
        }
    }

    /// Combined hash of all four attributes, in declaration order
    ///
    /// `-0.0` hashes like `0.0` so equal vertices always hash equally.
    pub fn combined_hash(&self) -> u64 {
        let mut seed = 0_u64;
        hash_combine(&mut seed, hash_components(&self.position));
        hash_combine(&mut seed, hash_components(&self.color));
        hash_combine(&mut seed, hash_components(&self.normal));
        hash_combine(&mut seed, hash_components(&self.uv));
        seed
    }
}

fn hash_components(components: &[f32]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for &value in components {
        let bits = if value == 0.0 { 0 } else { value.to_bits() };
        bits.hash(&mut hasher);
    }
    hasher.finish()
}

fn hash_combine(seed: &mut u64, value: u64) {
    *seed ^= value
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(*seed << 6)
        .wrapping_add(*seed >> 2);
}

/// Hash map key identifying a vertex by all of its attributes
///
/// `Eq` is only partial for NaN components: a vertex containing NaN never
/// equals itself and is therefore never merged.
#[derive(Debug, Clone, Copy)]
pub struct VertexKey(pub Vertex);

impl PartialEq for VertexKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for VertexKey {}

impl Hash for VertexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.combined_hash());
    }
}

/// CPU-side mesh build data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuilder {
    /// Vertex list
    pub vertices: Vec<Vertex>,
    /// Index list, empty for non-indexed meshes
    pub indices: Vec<u32>,
}

/// Corner order of the two triangles of a cube face
const FACE_TRIANGLES: [usize; 6] = [0, 1, 2, 0, 3, 1];

impl MeshBuilder {
    /// Empty build data
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-indexed mesh from a vertex list
    pub fn from_vertices(vertices: Vec<Vertex>) -> Self {
        Self {
            vertices,
            indices: Vec::new(),
        }
    }

    /// Deduplicate a stream of assembled vertices
    ///
    /// Each distinct vertex is stored once, at the position of its first
    /// occurrence, and every occurrence appends that position to the index
    /// list.
    pub fn from_vertex_stream<I: IntoIterator<Item = Vertex>>(stream: I) -> Self {
        let mut builder = Self::new();
        let mut unique: HashMap<VertexKey, u32> = HashMap::new();

        for vertex in stream {
            let index = *unique.entry(VertexKey(vertex)).or_insert_with(|| {
                builder.vertices.push(vertex);
                (builder.vertices.len() - 1) as u32
            });
            builder.indices.push(index);
        }

        builder
    }

    /// Load and deduplicate a Wavefront OBJ file
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self, MeshError> {
        ObjLoader::load(path)
    }

    /// Unit cube centred at `offset`, one flat color per face, non-indexed
    pub fn cube(offset: [f32; 3]) -> Self {
        const H: f32 = 0.5;
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            // left
            ([0.9, 0.9, 0.9], [[-H, -H, -H], [-H, H, H], [-H, -H, H], [-H, H, -H]]),
            // right
            ([0.8, 0.8, 0.1], [[H, -H, -H], [H, H, H], [H, -H, H], [H, H, -H]]),
            // top (y points down)
            ([0.9, 0.6, 0.1], [[-H, -H, -H], [H, -H, H], [-H, -H, H], [H, -H, -H]]),
            // bottom
            ([0.8, 0.1, 0.1], [[-H, H, -H], [H, H, H], [-H, H, H], [H, H, -H]]),
            // nose
            ([0.1, 0.1, 0.8], [[-H, -H, H], [H, H, H], [-H, H, H], [H, -H, H]]),
            // tail
            ([0.1, 0.8, 0.1], [[-H, -H, -H], [H, H, -H], [-H, H, -H], [H, -H, -H]]),
        ];

        let vertices = faces
            .iter()
            .flat_map(|(color, corners)| {
                FACE_TRIANGLES.iter().map(move |&corner| {
                    let [x, y, z] = corners[corner];
                    Vertex::new([x + offset[0], y + offset[1], z + offset[2]], *color)
                })
            })
            .collect();

        Self::from_vertices(vertices)
    }

    /// Whether the mesh will be drawn indexed
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// A mesh resident in device-local memory
///
/// Dropping the mesh releases the vertex buffer and then the index buffer,
/// each buffer before its memory.
pub struct GpuMesh<B: GpuBuffer> {
    vertex_buffer: B,
    vertex_count: u32,
    index_buffer: Option<B>,
    index_count: u32,
}

impl<B: GpuBuffer> GpuMesh<B> {
    /// Upload build data into device-local vertex and index buffers
    ///
    /// # Panics
    ///
    /// Panics if the build data holds fewer than three vertices.
    pub fn new<A>(allocator: &A, builder: &MeshBuilder) -> VulkanResult<Self>
    where
        A: BufferAllocator<Buffer = B> + ?Sized,
    {
        let (vertex_buffer, vertex_count) = Self::create_vertex_buffer(allocator, &builder.vertices)?;
        let (index_buffer, index_count) = Self::create_index_buffer(allocator, &builder.indices)?;

        log::debug!(
            "Uploaded mesh: {vertex_count} vertices, {index_count} indices ({})",
            if index_buffer.is_some() { "indexed" } else { "non-indexed" }
        );

        Ok(Self {
            vertex_buffer,
            vertex_count,
            index_buffer,
            index_count,
        })
    }

    /// Load an OBJ file and upload it
    pub fn from_file<A, P>(allocator: &A, path: P) -> Result<Self, MeshError>
    where
        A: BufferAllocator<Buffer = B> + ?Sized,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let builder = MeshBuilder::load_model(path)?;
        log::info!("Loaded {}: {} unique vertices", path.display(), builder.vertices.len());
        Ok(Self::new(allocator, &builder)?)
    }

    fn create_vertex_buffer<A>(allocator: &A, vertices: &[Vertex]) -> VulkanResult<(B, u32)>
    where
        A: BufferAllocator<Buffer = B> + ?Sized,
    {
        let vertex_count = vertices.len() as u32;
        assert!(vertex_count >= 3, "Vertex count must be at least 3, got {vertex_count}");

        let buffer = upload_via_staging(
            allocator,
            bytemuck::cast_slice(vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        Ok((buffer, vertex_count))
    }

    fn create_index_buffer<A>(allocator: &A, indices: &[u32]) -> VulkanResult<(Option<B>, u32)>
    where
        A: BufferAllocator<Buffer = B> + ?Sized,
    {
        let index_count = indices.len() as u32;
        if index_count == 0 {
            return Ok((None, 0));
        }

        let buffer = upload_via_staging(
            allocator,
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        Ok((Some(buffer), index_count))
    }

    /// Bind the vertex buffer at binding 0 and, when present, the index buffer
    pub fn bind<E: CommandEncoder + ?Sized>(&self, encoder: &E, command_buffer: vk::CommandBuffer) {
        encoder.bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer.handle()], &[0]);

        if let Some(index_buffer) = &self.index_buffer {
            encoder.bind_index_buffer(command_buffer, index_buffer.handle(), 0, vk::IndexType::UINT32);
        }
    }

    /// Record one instance: indexed when an index buffer exists, else by vertex count
    pub fn draw<E: CommandEncoder + ?Sized>(&self, encoder: &E, command_buffer: vk::CommandBuffer) {
        if self.has_index_buffer() {
            encoder.draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0);
        } else {
            encoder.draw(command_buffer, self.vertex_count, 1, 0, 0);
        }
    }

    /// Whether the mesh draws indexed
    pub fn has_index_buffer(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Number of vertices uploaded
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices uploaded, zero when non-indexed
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Vertex buffer
    pub fn vertex_buffer(&self) -> &B {
        &self.vertex_buffer
    }

    /// Index buffer, if any
    pub fn index_buffer(&self) -> Option<&B> {
        self.index_buffer.as_ref()
    }
}

/// Copy `bytes` into a new device-local buffer through a host-visible staging buffer
///
/// The staging buffer is released before returning, on success and on error.
fn upload_via_staging<A>(allocator: &A, bytes: &[u8], usage: vk::BufferUsageFlags) -> VulkanResult<A::Buffer>
where
    A: BufferAllocator + ?Sized,
{
    let size = bytes.len() as vk::DeviceSize;

    let staging = allocator.create_buffer(
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    allocator.write_buffer(&staging, bytes)?;

    let buffer = allocator.create_buffer(
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    allocator.copy_buffer(&staging, &buffer, size)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{MockDevice, Recorded, ResourceEvent};

    fn triangle() -> Vec<Vertex> {
        vec![
            Vertex::new([0.0, -0.5, 0.0], [1.0, 0.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([-0.5, 0.5, 0.0], [0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn test_vertex_is_44_bytes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
    }

    #[test]
    fn test_equal_vertices_hash_equally() {
        let a = Vertex {
            position: [1.0, 2.0, 3.0],
            color: [0.5; 3],
            normal: [0.0, 1.0, 0.0],
            uv: [0.25, 0.75],
        };
        let b = a;
        assert_eq!(a.combined_hash(), b.combined_hash());
    }

    #[test]
    fn test_negative_zero_hashes_like_zero() {
        let a = Vertex::new([0.0, 1.0, 0.0], [1.0; 3]);
        let b = Vertex::new([-0.0, 1.0, 0.0], [1.0; 3]);
        assert_eq!(a, b);
        assert_eq!(a.combined_hash(), b.combined_hash());
    }

    #[test]
    fn test_attribute_order_affects_hash() {
        let a = Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let b = Vertex::new([0.0, 1.0, 0.0], [1.0, 0.0, 0.0]);
        assert_ne!(a.combined_hash(), b.combined_hash());
    }

    #[test]
    fn test_repeated_vertex_is_stored_once() {
        let v = Vertex::new([1.0, 1.0, 1.0], [1.0; 3]);
        let builder = MeshBuilder::from_vertex_stream(std::iter::repeat(v).take(5));

        assert_eq!(builder.vertices, vec![v]);
        assert_eq!(builder.indices, vec![0; 5]);
    }

    #[test]
    fn test_normal_and_uv_prevent_merge() {
        let base = Vertex::new([1.0, 2.0, 3.0], [1.0; 3]);
        let other_normal = Vertex { normal: [0.0, 0.0, 1.0], ..base };
        let other_uv = Vertex { uv: [0.5, 0.5], ..base };

        let builder = MeshBuilder::from_vertex_stream([base, other_normal, other_uv, base]);

        assert_eq!(builder.vertices, vec![base, other_normal, other_uv]);
        assert_eq!(builder.indices, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_nan_vertices_are_never_merged() {
        let v = Vertex::new([f32::NAN, 0.0, 0.0], [1.0; 3]);
        let builder = MeshBuilder::from_vertex_stream([v, v]);

        assert_eq!(builder.vertices.len(), 2);
        assert_eq!(builder.indices, vec![0, 1]);
    }

    #[test]
    fn test_cube_geometry() {
        let cube = MeshBuilder::cube([0.0, 0.0, 2.0]);

        assert_eq!(cube.vertices.len(), 36);
        assert!(!cube.is_indexed());
        assert!(cube.vertices.iter().all(|v| (1.5..=2.5).contains(&v.position[2])));
        // left face is light grey, tail face green
        assert_eq!(cube.vertices[0].color, [0.9, 0.9, 0.9]);
        assert_eq!(cube.vertices[35].color, [0.1, 0.8, 0.1]);
        assert_eq!(cube.vertices[0].position, [-0.5, -0.5, 1.5]);
        assert_eq!(cube.vertices[1].position, [-0.5, 0.5, 2.5]);
    }

    #[test]
    fn test_vertex_upload_reads_back_identical() {
        let device = MockDevice::new();
        let vertices = triangle();

        let mesh = GpuMesh::new(&device, &MeshBuilder::from_vertices(vertices.clone())).unwrap();

        let uploaded = device.read_buffer(mesh.vertex_buffer().handle());
        assert_eq!(uploaded, bytemuck::cast_slice::<Vertex, u8>(&vertices));
        assert_eq!(mesh.vertex_count(), 3);
        assert!(!mesh.has_index_buffer());
    }

    #[test]
    fn test_index_upload_reads_back_identical() {
        let device = MockDevice::new();
        let builder = MeshBuilder {
            vertices: triangle(),
            indices: vec![0, 1, 2, 2, 1, 0],
        };

        let mesh = GpuMesh::new(&device, &builder).unwrap();

        let index_buffer = mesh.index_buffer().unwrap();
        let uploaded = device.read_buffer(index_buffer.handle());
        assert_eq!(uploaded, bytemuck::cast_slice::<u32, u8>(&builder.indices));
        assert_eq!(mesh.index_count(), 6);
    }

    #[test]
    fn test_upload_uses_staging_buffers() {
        let device = MockDevice::new();
        let _mesh = GpuMesh::new(&device, &MeshBuilder::from_vertices(triangle())).unwrap();

        let events = device.events();
        let created: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ResourceEvent::Created { buffer, usage, properties, .. } => Some((*buffer, *usage, *properties)),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), 2);

        let (staging, staging_usage, staging_props) = created[0];
        assert_eq!(staging_usage, vk::BufferUsageFlags::TRANSFER_SRC);
        assert_eq!(
            staging_props,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        );

        let (_, final_usage, final_props) = created[1];
        assert_eq!(
            final_usage,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(final_props, vk::MemoryPropertyFlags::DEVICE_LOCAL);

        // staging released before the upload returned
        assert!(events.contains(&ResourceEvent::DestroyBuffer(staging)));
        assert!(events.contains(&ResourceEvent::FreeMemory(staging)));
    }

    #[test]
    fn test_staging_released_when_copy_fails() {
        let device = MockDevice::new();
        device.fail_next_copy();

        let result = GpuMesh::new(&device, &MeshBuilder::from_vertices(triangle()));
        assert!(result.is_err());

        let events = device.events();
        let created = events
            .iter()
            .filter(|e| matches!(e, ResourceEvent::Created { .. }))
            .count();
        let destroyed = events
            .iter()
            .filter(|e| matches!(e, ResourceEvent::DestroyBuffer(_)))
            .count();
        assert_eq!(created, 2);
        assert_eq!(destroyed, 2);
    }

    #[test]
    fn test_non_indexed_draw_uses_vertex_count() {
        let device = MockDevice::new();
        let cb = MockDevice::command_buffer(7);
        let mesh = GpuMesh::new(&device, &MeshBuilder::cube([0.0; 3])).unwrap();

        mesh.bind(&device, cb);
        mesh.draw(&device, cb);

        let commands = device.commands();
        assert_eq!(commands.len(), 2);
        assert!(matches!(
            &commands[0],
            Recorded::BindVertexBuffers { first_binding: 0, buffers, offsets, .. }
                if buffers == &vec![mesh.vertex_buffer().handle()] && offsets == &vec![0]
        ));
        assert!(matches!(
            commands[1],
            Recorded::Draw { vertex_count: 36, instance_count: 1, first_vertex: 0, first_instance: 0, .. }
        ));
    }

    #[test]
    fn test_indexed_draw_uses_index_count() {
        let device = MockDevice::new();
        let cb = MockDevice::command_buffer(7);
        let builder = MeshBuilder {
            vertices: triangle(),
            indices: vec![0, 1, 2, 0, 2, 1, 1, 2, 0],
        };
        let mesh = GpuMesh::new(&device, &builder).unwrap();

        mesh.bind(&device, cb);
        mesh.draw(&device, cb);

        let commands = device.commands();
        assert_eq!(commands.len(), 3);
        assert!(matches!(
            commands[1],
            Recorded::BindIndexBuffer { offset: 0, index_type: vk::IndexType::UINT32, .. }
        ));
        assert!(matches!(
            commands[2],
            Recorded::DrawIndexed { index_count: 9, instance_count: 1, first_index: 0, vertex_offset: 0, first_instance: 0, .. }
        ));
    }

    #[test]
    fn test_drop_releases_buffer_before_memory() {
        let device = MockDevice::new();
        let builder = MeshBuilder {
            vertices: triangle(),
            indices: vec![0, 1, 2],
        };
        let mesh = GpuMesh::new(&device, &builder).unwrap();
        let vertex = mesh.vertex_buffer().handle();
        let index = mesh.index_buffer().unwrap().handle();
        let before = device.events().len();

        drop(mesh);

        let released = device.events().split_off(before);
        assert_eq!(
            released,
            vec![
                ResourceEvent::DestroyBuffer(vertex),
                ResourceEvent::FreeMemory(vertex),
                ResourceEvent::DestroyBuffer(index),
                ResourceEvent::FreeMemory(index),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "Vertex count must be at least 3")]
    fn test_fewer_than_three_vertices_panics() {
        let device = MockDevice::new();
        let vertices = triangle()[..2].to_vec();
        let _ = GpuMesh::new(&device, &MeshBuilder::from_vertices(vertices));
    }
}
