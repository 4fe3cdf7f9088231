use crate::core::gfx::{BlendMode, RenderList};
use crate::core::space::ortho_for_window;
use cgmath::Matrix4;
use glow::{HasContext, UniformLocation};
use glutin::{
    config::ConfigTemplateBuilder,
    context::{ContextAttributesBuilder, PossiblyCurrentContext},
    display::{Display, DisplayApiPreference},
    prelude::*,
    surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface},
};
use log::{info, warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::{error::Error, ffi::CStr, mem, num::NonZeroU32, sync::Arc};
use winit::window::Window;

pub struct State {
    gl: glow::Context,
    gl_surface: Surface<WindowSurface>,
    gl_context: PossiblyCurrentContext,
    program: glow::Program,
    mvp_location: UniformLocation,
    color_location: UniformLocation,
    projection: Matrix4<f32>,
    window_size: (u32, u32),
    shared_vao: glow::VertexArray,
    shared_vbo: glow::Buffer,
    shared_ibo: glow::Buffer,
    index_count: i32,
}

pub fn init(window: Arc<Window>, vsync_enabled: bool) -> Result<State, Box<dyn Error>> {
    info!("Initializing OpenGL backend...");

    let (gl_surface, gl_context, gl) = create_opengl_context(&window, vsync_enabled)?;
    let (program, mvp_location, color_location) = create_graphics_program(&gl)?;

    // One shared VAO/VBO/IBO for a unit quad, reused for every object.
    let (shared_vao, shared_vbo, shared_ibo, index_count) = unsafe {
        const UNIT_QUAD_VERTICES: [[f32; 2]; 4] = [
            [-0.5, -0.5],
            [0.5, -0.5],
            [0.5, 0.5],
            [-0.5, 0.5],
        ];
        const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

        let vao = gl.create_vertex_array()?;
        let vbo = gl.create_buffer()?;
        let ibo = gl.create_buffer()?;

        gl.bind_vertex_array(Some(vao));

        gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
        gl.buffer_data_u8_slice(
            glow::ARRAY_BUFFER,
            cast::as_bytes(&UNIT_QUAD_VERTICES),
            glow::STATIC_DRAW,
        );

        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ibo));
        gl.buffer_data_u8_slice(
            glow::ELEMENT_ARRAY_BUFFER,
            cast::as_bytes(&QUAD_INDICES),
            glow::STATIC_DRAW,
        );

        let stride = (2 * mem::size_of::<f32>()) as i32;
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, stride, 0);

        gl.bind_vertex_array(None);

        (vao, vbo, ibo, QUAD_INDICES.len() as i32)
    };

    let initial_size = window.inner_size();
    let projection = ortho_for_window(initial_size.width, initial_size.height);

    // Valid viewport immediately so the very first frame renders correctly.
    unsafe {
        gl.viewport(0, 0, initial_size.width as i32, initial_size.height as i32);
    }

    let state = State {
        gl,
        gl_surface,
        gl_context,
        program,
        mvp_location,
        color_location,
        projection,
        window_size: (initial_size.width, initial_size.height),
        shared_vao,
        shared_vbo,
        shared_ibo,
        index_count,
    };

    info!("OpenGL backend initialized successfully.");
    Ok(state)
}

pub fn draw(state: &mut State, list: &RenderList) -> Result<u32, Box<dyn Error>> {
    let (width, height) = state.window_size;
    if width == 0 || height == 0 {
        return Ok(0);
    }

    #[inline(always)]
    fn apply_blend(gl: &glow::Context, want: BlendMode, last: &mut Option<BlendMode>) {
        if *last == Some(want) {
            return;
        }
        unsafe {
            gl.enable(glow::BLEND);
            gl.blend_equation(glow::FUNC_ADD);
            match want {
                BlendMode::Alpha => gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA),
                BlendMode::Add => gl.blend_func(glow::SRC_ALPHA, glow::ONE),
            }
        }
        *last = Some(want);
    }

    unsafe {
        let c = list.clear_color;
        state.gl.clear_color(c[0], c[1], c[2], c[3]);
        state.gl.clear(glow::COLOR_BUFFER_BIT);

        state.gl.use_program(Some(state.program));
        state.gl.bind_vertex_array(Some(state.shared_vao));

        let mut last_color: Option<[f32; 4]> = None;
        let mut last_blend: Option<BlendMode> = None;

        for object in &list.objects {
            apply_blend(&state.gl, object.blend, &mut last_blend);

            let mvp_array: [[f32; 4]; 4] = (state.projection * object.transform).into();
            state.gl.uniform_matrix_4_f32_slice(
                Some(&state.mvp_location),
                false,
                cast::as_f32_slice(&mvp_array),
            );

            if last_color.is_none_or(|c| c != object.color) {
                state
                    .gl
                    .uniform_4_f32_slice(Some(&state.color_location), &object.color);
                last_color = Some(object.color);
            }

            state
                .gl
                .draw_elements(glow::TRIANGLES, state.index_count, glow::UNSIGNED_SHORT, 0);
        }

        state.gl.bind_vertex_array(None);
    }

    state.gl_surface.swap_buffers(&state.gl_context)?;
    Ok(list.objects.len() as u32)
}

pub fn resize(state: &mut State, width: u32, height: u32) {
    if let (Some(width_nz), Some(height_nz)) = (NonZeroU32::new(width), NonZeroU32::new(height)) {
        state
            .gl_surface
            .resize(&state.gl_context, width_nz, height_nz);
        unsafe {
            state.gl.viewport(0, 0, width as i32, height as i32);
        }
        state.projection = ortho_for_window(width, height);
        state.window_size = (width, height);
    } else {
        warn!("Ignoring resize to zero dimensions.");
    }
}

pub fn cleanup(state: &mut State) {
    info!("Cleaning up OpenGL resources...");
    unsafe {
        state.gl.delete_program(state.program);
        state.gl.delete_vertex_array(state.shared_vao);
        state.gl.delete_buffer(state.shared_vbo);
        state.gl.delete_buffer(state.shared_ibo);
    }
}

fn create_opengl_context(
    window: &Window,
    vsync_enabled: bool,
) -> Result<(Surface<WindowSurface>, PossiblyCurrentContext, glow::Context), Box<dyn Error>> {
    let display_handle = window.display_handle()?.as_raw();

    #[cfg(windows)]
    let preference = DisplayApiPreference::Wgl(None);
    #[cfg(not(windows))]
    let preference = DisplayApiPreference::Egl;

    let display = unsafe { Display::new(display_handle, preference)? };

    let template = ConfigTemplateBuilder::new().with_alpha_size(8).build();
    let config = unsafe { display.find_configs(template)?.next() }
        .ok_or("Failed to find a suitable GL config")?;

    let (width, height): (u32, u32) = window.inner_size().into();
    let raw_window_handle = window.window_handle()?.as_raw();
    let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        NonZeroU32::new(width.max(1)).unwrap(),
        NonZeroU32::new(height.max(1)).unwrap(),
    );
    let surface = unsafe { display.create_window_surface(&config, &surface_attributes)? };

    let context_attributes = ContextAttributesBuilder::new().build(Some(raw_window_handle));
    let context = unsafe { display.create_context(&config, &context_attributes)? }
        .make_current(&surface)?;

    let interval = if vsync_enabled {
        SwapInterval::Wait(NonZeroU32::new(1).unwrap())
    } else {
        SwapInterval::DontWait
    };
    if let Err(e) = surface.set_swap_interval(&context, interval) {
        warn!("Could not set swap interval: {}. VSync state unchanged.", e);
    }

    let gl =
        unsafe { glow::Context::from_loader_function_cstr(|s: &CStr| display.get_proc_address(s)) };
    Ok((surface, context, gl))
}

fn create_graphics_program(
    gl: &glow::Context,
) -> Result<(glow::Program, UniformLocation, UniformLocation), String> {
    unsafe {
        let program = gl.create_program()?;
        let shader_sources = [
            (glow::VERTEX_SHADER, include_str!("shaders/solid.vert")),
            (glow::FRAGMENT_SHADER, include_str!("shaders/solid.frag")),
        ];

        let mut shaders = Vec::with_capacity(shader_sources.len());
        for (shader_type, shader_source) in shader_sources.iter() {
            let shader = gl.create_shader(*shader_type)?;
            gl.shader_source(shader, shader_source);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                return Err(gl.get_shader_info_log(shader));
            }
            gl.attach_shader(program, shader);
            shaders.push(shader);
        }

        gl.link_program(program);
        if !gl.get_program_link_status(program) {
            return Err(gl.get_program_info_log(program));
        }
        for shader in shaders {
            gl.detach_shader(program, shader);
            gl.delete_shader(shader);
        }

        let mvp_location = gl
            .get_uniform_location(program, "u_model_view_proj")
            .ok_or("u_model_view_proj")?;
        let color_location = gl
            .get_uniform_location(program, "u_color")
            .ok_or("u_color")?;

        Ok((program, mvp_location, color_location))
    }
}

mod cast {
    // f32/u16 -> u8 reinterpretation for buffer uploads; any alignment is a
    // multiple of u8's, so align_to never produces a prefix or suffix here.
    #[inline(always)]
    pub fn as_bytes<T>(slice: &[T]) -> &[u8] {
        let (prefix, mid, suffix) = unsafe { slice.align_to::<u8>() };
        debug_assert!(prefix.is_empty() && suffix.is_empty());
        mid
    }

    #[inline(always)]
    pub fn as_f32_slice(matrix: &[[f32; 4]; 4]) -> &[f32] {
        let (prefix, mid, suffix) = unsafe { matrix.align_to::<f32>() };
        debug_assert!(prefix.is_empty() && suffix.is_empty());
        mid
    }
}
