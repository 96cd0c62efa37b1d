//! Model viewer
//!
//! Opens a window and renders an OBJ model, or a colored cube when no model
//! is configured, through the frame engine's frame loop.
//!
//! Usage: `model_viewer [config.toml|config.ron] [model.obj]`

use frame_engine::foundation::logging;
use frame_engine::prelude::*;
use frame_engine::render::vulkan::{GraphicsPipeline, PipelineConfig, PipelineLayout, ShaderModule};
use glfw::{Action, Key, WindowEvent};

/// Pipeline objects kept alive for the duration of the loop
struct DemoPipeline {
    pipeline: GraphicsPipeline,
    _layout: PipelineLayout,
}

impl DemoPipeline {
    fn new(context: &VulkanContext, shaders: &ShaderConfig, render_pass: ash::vk::RenderPass) -> VulkanResult<Self> {
        let device = context.raw_device();
        let vertex_shader = ShaderModule::from_file(device.clone(), &shaders.vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), &shaders.fragment_shader_path)?;

        let layout = PipelineLayout::new(device.clone(), &[], &[])?;
        let config = PipelineConfig::default_for(render_pass, layout.handle());
        let pipeline = GraphicsPipeline::new(device.clone(), &vertex_shader, &fragment_shader, &config)?;

        Ok(Self {
            pipeline,
            _layout: layout,
        })
    }
}

fn load_config(path: Option<&str>) -> Result<ApplicationConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => ApplicationConfig::load_from_file(path)?,
        None => ApplicationConfig::new("Model Viewer"),
    };
    config.validate()?;
    Ok(config)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = load_config(args.first().map(String::as_str))?;
    if let Some(model) = args.get(1) {
        config.engine.model_path = Some(model.clone());
    }

    logging::init_with_level(&config.engine.log_level);
    log::info!("Starting model viewer");

    let mut window = Window::from_config(&config.window)?;
    let context = VulkanContext::new(&mut window, &config.renderer)?;
    let mut renderer = Renderer::new(&context, &mut window)?;

    let pipeline = if config.renderer.shaders.is_available() {
        Some(DemoPipeline::new(&context, &config.renderer.shaders, renderer.swapchain_render_pass())?)
    } else {
        log::warn!(
            "Shaders not found ({}, {}), rendering clear-only frames",
            config.renderer.shaders.vertex_shader_path,
            config.renderer.shaders.fragment_shader_path
        );
        None
    };

    let mesh = match &config.engine.model_path {
        Some(path) => GpuMesh::from_file(&context, path)?,
        // Shifted so the whole cube lies inside the 0..1 depth range
        None => GpuMesh::new(&context, &MeshBuilder::cube([0.0, 0.0, 0.5]))?,
    };

    while !window.should_close() {
        window.poll_events();

        let mut close_requested = false;
        for event in window.drain_events() {
            if let WindowEvent::Key(Key::Escape, _, Action::Press, _) = event {
                close_requested = true;
            }
        }
        if close_requested {
            window.set_should_close(true);
        }

        let Some(command_buffer) = renderer.begin_frame(&mut window)? else {
            continue;
        };

        renderer.begin_swapchain_render_pass(command_buffer);
        if let Some(demo) = &pipeline {
            demo.pipeline.bind(&context, command_buffer);
            mesh.bind(&context, command_buffer);
            mesh.draw(&context, command_buffer);
        }
        renderer.end_swapchain_render_pass(command_buffer);

        renderer.end_frame(&mut window)?;
    }

    context.wait_idle()?;
    log::info!("Model viewer closed");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("Model viewer failed: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
