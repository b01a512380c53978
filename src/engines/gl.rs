use ar_core::depth::{DepthEncoding, DepthFrame};
use ar_core::mask::Mask;
use ar_core::RgbaImage;
use glam::{Mat4, Vec2, Vec4};
use web_sys::{WebGl2RenderingContext as Gl, WebGlProgram, WebGlShader, WebGlTexture, WebGlUniformLocation};

const VERTEX_SHADER: &str = r#"#version 300 es
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec2 a_uv;
uniform mat4 u_model;
uniform mat4 u_view;
uniform mat4 u_projection;
out vec2 v_uv;
out float v_view_depth;
void main() {
    vec4 view_pos = u_view * u_model * vec4(a_position, 1.0);
    v_uv = a_uv;
    v_view_depth = -view_pos.z;
    gl_Position = u_projection * view_pos;
}
"#;

// Depth decode and visibility mirror `ar_core::depth`.
const FRAGMENT_SHADER: &str = r#"#version 300 es
precision highp float;
in vec2 v_uv;
in float v_view_depth;
uniform sampler2D u_wallpaper;
uniform sampler2D u_depth;
uniform sampler2D u_mask;
uniform vec2 u_tiles;
uniform float u_brightness;
uniform float u_opacity;
uniform int u_occlusion;
uniform int u_depth_encoding;
uniform float u_raw_to_meters;
uniform mat4 u_uv_transform;
uniform vec4 u_viewport;
uniform float u_bias;
uniform float u_band;
uniform int u_reticle;
out vec4 out_color;

float real_depth(vec2 view_uv) {
    vec2 uv = (u_uv_transform * vec4(view_uv, 0.0, 1.0)).xy;
    if (u_depth_encoding == 2) {
        return texture(u_depth, uv).r * u_raw_to_meters;
    }
    vec2 packed = texture(u_depth, uv).rg;
    return dot(packed, vec2(255.0, 65280.0)) * u_raw_to_meters;
}

float visibility(float fragment_m, float real_m) {
    if (real_m <= 0.0) {
        return 1.0;
    }
    float closer_by = fragment_m - real_m;
    if (u_band <= 0.0) {
        return closer_by > u_bias ? 0.0 : 1.0;
    }
    return 1.0 - smoothstep(u_bias, u_bias + u_band, closer_by);
}

void main() {
    if (u_reticle == 1) {
        float r = length(v_uv - 0.5);
        if (r > 0.5 || r < 0.38) {
            discard;
        }
        out_color = vec4(0.85, 0.85, 0.85, 0.85);
        return;
    }
    // normalized view coordinates: origin top-left
    vec2 frag = (gl_FragCoord.xy - u_viewport.xy) / u_viewport.zw;
    vec2 view_uv = vec2(frag.x, 1.0 - frag.y);
    float alpha = u_opacity;
    if (u_occlusion == 1) {
        alpha *= visibility(v_view_depth, real_depth(view_uv));
    } else if (u_occlusion == 2) {
        alpha *= 1.0 - texture(u_mask, view_uv).r;
    }
    if (alpha <= 0.001) {
        discard;
    }
    vec3 color = texture(u_wallpaper, fract(v_uv * u_tiles)).rgb * u_brightness;
    out_color = vec4(min(color, vec3(1.0)) * alpha, alpha);
}
"#;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    uv: [f32; 2],
}

/// Unit quad centered at the origin in its XY plane, image top at +Y.
const QUAD: [Vertex; 4] = [
    Vertex { position: [-0.5, -0.5, 0.0], uv: [0.0, 1.0] },
    Vertex { position: [0.5, -0.5, 0.0], uv: [1.0, 1.0] },
    Vertex { position: [-0.5, 0.5, 0.0], uv: [0.0, 0.0] },
    Vertex { position: [0.5, 0.5, 0.0], uv: [1.0, 0.0] },
];

/// Per-view occlusion input for one draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OcclusionInput {
    None,
    Depth {
        encoding: DepthEncoding,
        raw_to_meters: f32,
        uv_transform: Mat4,
    },
    Mask,
}

#[derive(Clone, Copy, Debug)]
pub struct DrawParams {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    /// Viewport `x, y, width, height` in framebuffer pixels.
    pub viewport: Vec4,
    pub tiles: Vec2,
    pub brightness: f32,
    pub opacity: f32,
    pub occlusion: OcclusionInput,
    pub bias: f32,
    pub band: f32,
}

struct Uniforms {
    model: Option<WebGlUniformLocation>,
    view: Option<WebGlUniformLocation>,
    projection: Option<WebGlUniformLocation>,
    wallpaper: Option<WebGlUniformLocation>,
    depth: Option<WebGlUniformLocation>,
    mask: Option<WebGlUniformLocation>,
    tiles: Option<WebGlUniformLocation>,
    brightness: Option<WebGlUniformLocation>,
    opacity: Option<WebGlUniformLocation>,
    occlusion: Option<WebGlUniformLocation>,
    depth_encoding: Option<WebGlUniformLocation>,
    raw_to_meters: Option<WebGlUniformLocation>,
    uv_transform: Option<WebGlUniformLocation>,
    viewport: Option<WebGlUniformLocation>,
    bias: Option<WebGlUniformLocation>,
    band: Option<WebGlUniformLocation>,
    reticle: Option<WebGlUniformLocation>,
}

impl Uniforms {
    fn locate(gl: &Gl, program: &WebGlProgram) -> Self {
        let at = |name: &str| gl.get_uniform_location(program, name);
        Self {
            model: at("u_model"),
            view: at("u_view"),
            projection: at("u_projection"),
            wallpaper: at("u_wallpaper"),
            depth: at("u_depth"),
            mask: at("u_mask"),
            tiles: at("u_tiles"),
            brightness: at("u_brightness"),
            opacity: at("u_opacity"),
            occlusion: at("u_occlusion"),
            depth_encoding: at("u_depth_encoding"),
            raw_to_meters: at("u_raw_to_meters"),
            uv_transform: at("u_uv_transform"),
            viewport: at("u_viewport"),
            bias: at("u_bias"),
            band: at("u_band"),
            reticle: at("u_reticle"),
        }
    }
}

fn compile_shader(gl: &Gl, kind: u32, source: &str) -> anyhow::Result<WebGlShader> {
    let shader = gl
        .create_shader(kind)
        .ok_or_else(|| anyhow::anyhow!("create_shader failed"))?;
    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);
    if gl
        .get_shader_parameter(&shader, Gl::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(shader)
    } else {
        let info = gl.get_shader_info_log(&shader).unwrap_or_default();
        gl.delete_shader(Some(&shader));
        Err(anyhow::anyhow!("shader compile: {}", info))
    }
}

fn link_program(gl: &Gl, vs: &WebGlShader, fs: &WebGlShader) -> anyhow::Result<WebGlProgram> {
    let program = gl
        .create_program()
        .ok_or_else(|| anyhow::anyhow!("create_program failed"))?;
    gl.attach_shader(&program, vs);
    gl.attach_shader(&program, fs);
    gl.link_program(&program);
    if gl
        .get_program_parameter(&program, Gl::LINK_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(program)
    } else {
        let info = gl.get_program_info_log(&program).unwrap_or_default();
        gl.delete_program(Some(&program));
        Err(anyhow::anyhow!("program link: {}", info))
    }
}

fn create_texture(gl: &Gl, filter: u32, wrap: u32) -> anyhow::Result<WebGlTexture> {
    let tex = gl
        .create_texture()
        .ok_or_else(|| anyhow::anyhow!("create_texture failed"))?;
    gl.bind_texture(Gl::TEXTURE_2D, Some(&tex));
    gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MIN_FILTER, filter as i32);
    gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MAG_FILTER, filter as i32);
    gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_WRAP_S, wrap as i32);
    gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_WRAP_T, wrap as i32);
    Ok(tex)
}

#[allow(clippy::too_many_arguments)]
fn upload_bytes(
    gl: &Gl,
    tex: &WebGlTexture,
    internal: u32,
    width: u32,
    height: u32,
    format: u32,
    ty: u32,
    bytes: &[u8],
) -> anyhow::Result<()> {
    gl.bind_texture(Gl::TEXTURE_2D, Some(tex));
    gl.pixel_storei(Gl::UNPACK_ALIGNMENT, 1);
    gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
        Gl::TEXTURE_2D,
        0,
        internal as i32,
        width as i32,
        height as i32,
        0,
        format,
        ty,
        Some(bytes),
    )
    .map_err(|e| anyhow::anyhow!("{:?}", e))
}

/// Textured wallpaper quad with per-fragment occlusion.
pub struct WallpaperRenderer {
    gl: Gl,
    program: WebGlProgram,
    vao: web_sys::WebGlVertexArrayObject,
    uniforms: Uniforms,
    wallpaper: WebGlTexture,
    depth: WebGlTexture,
    mask: WebGlTexture,
}

impl WallpaperRenderer {
    pub fn new(gl: &Gl) -> anyhow::Result<Self> {
        let vs = compile_shader(gl, Gl::VERTEX_SHADER, VERTEX_SHADER)?;
        let fs = compile_shader(gl, Gl::FRAGMENT_SHADER, FRAGMENT_SHADER)?;
        let program = link_program(gl, &vs, &fs)?;
        gl.delete_shader(Some(&vs));
        gl.delete_shader(Some(&fs));

        let vao = gl
            .create_vertex_array()
            .ok_or_else(|| anyhow::anyhow!("create_vertex_array failed"))?;
        gl.bind_vertex_array(Some(&vao));
        let vbo = gl
            .create_buffer()
            .ok_or_else(|| anyhow::anyhow!("create_buffer failed"))?;
        gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&vbo));
        gl.buffer_data_with_u8_array(Gl::ARRAY_BUFFER, bytemuck::cast_slice(&QUAD), Gl::STATIC_DRAW);
        let stride = std::mem::size_of::<Vertex>() as i32;
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_with_i32(0, 3, Gl::FLOAT, false, stride, 0);
        gl.enable_vertex_attrib_array(1);
        gl.vertex_attrib_pointer_with_i32(1, 2, Gl::FLOAT, false, stride, 12);
        gl.bind_vertex_array(None);

        let uniforms = Uniforms::locate(gl, &program);
        let wallpaper = create_texture(gl, Gl::LINEAR, Gl::REPEAT)?;
        let depth = create_texture(gl, Gl::NEAREST, Gl::CLAMP_TO_EDGE)?;
        let mask = create_texture(gl, Gl::LINEAR, Gl::CLAMP_TO_EDGE)?;
        // 1x1 placeholders until real data arrives
        upload_bytes(gl, &wallpaper, Gl::RGBA8, 1, 1, Gl::RGBA, Gl::UNSIGNED_BYTE, &[220, 220, 220, 255])?;
        upload_bytes(gl, &depth, Gl::RG8, 1, 1, Gl::RG, Gl::UNSIGNED_BYTE, &[0, 0])?;
        upload_bytes(gl, &mask, Gl::R8, 1, 1, Gl::RED, Gl::UNSIGNED_BYTE, &[0])?;

        Ok(Self {
            gl: gl.clone(),
            program,
            vao,
            uniforms,
            wallpaper,
            depth,
            mask,
        })
    }

    pub fn set_wallpaper(&self, image: &RgbaImage) -> anyhow::Result<()> {
        if image.is_empty() {
            return Ok(());
        }
        upload_bytes(
            &self.gl,
            &self.wallpaper,
            Gl::RGBA8,
            image.width(),
            image.height(),
            Gl::RGBA,
            Gl::UNSIGNED_BYTE,
            image.as_bytes(),
        )
    }

    /// Upload a depth frame in its raw encoding; the shader decodes it.
    pub fn set_depth(&self, frame: &DepthFrame) -> anyhow::Result<()> {
        match frame.encoding {
            DepthEncoding::Float32 => {
                let floats = js_sys::Float32Array::new(&js_sys::Uint8Array::from(frame.raw()).buffer());
                self.gl.bind_texture(Gl::TEXTURE_2D, Some(&self.depth));
                self.gl.pixel_storei(Gl::UNPACK_ALIGNMENT, 1);
                self.gl
                    .tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_array_buffer_view(
                        Gl::TEXTURE_2D,
                        0,
                        Gl::R32F as i32,
                        frame.width as i32,
                        frame.height as i32,
                        0,
                        Gl::RED,
                        Gl::FLOAT,
                        Some(&floats),
                    )
                    .map_err(|e| anyhow::anyhow!("{:?}", e))
            }
            DepthEncoding::LuminanceAlpha | DepthEncoding::Uint16 => upload_bytes(
                &self.gl,
                &self.depth,
                Gl::RG8,
                frame.width,
                frame.height,
                Gl::RG,
                Gl::UNSIGNED_BYTE,
                frame.raw(),
            ),
        }
    }

    pub fn set_mask(&self, mask: &Mask) -> anyhow::Result<()> {
        if mask.is_empty() {
            return Ok(());
        }
        upload_bytes(
            &self.gl,
            &self.mask,
            Gl::R8,
            mask.width(),
            mask.height(),
            Gl::RED,
            Gl::UNSIGNED_BYTE,
            mask.alpha(),
        )
    }

    fn bind_common(&self, p: &DrawParams) {
        let gl = &self.gl;
        let u = &self.uniforms;
        gl.use_program(Some(&self.program));
        gl.uniform_matrix4fv_with_f32_array(u.model.as_ref(), false, &p.model.to_cols_array());
        gl.uniform_matrix4fv_with_f32_array(u.view.as_ref(), false, &p.view.to_cols_array());
        gl.uniform_matrix4fv_with_f32_array(u.projection.as_ref(), false, &p.projection.to_cols_array());
        gl.uniform4f(u.viewport.as_ref(), p.viewport.x, p.viewport.y, p.viewport.z, p.viewport.w);
    }

    /// Draw the wallpaper for one view into the bound framebuffer.
    pub fn draw(&self, p: &DrawParams) {
        let gl = &self.gl;
        let u = &self.uniforms;
        self.bind_common(p);
        gl.uniform1i(u.reticle.as_ref(), 0);
        gl.uniform2f(u.tiles.as_ref(), p.tiles.x, p.tiles.y);
        gl.uniform1f(u.brightness.as_ref(), p.brightness);
        gl.uniform1f(u.opacity.as_ref(), p.opacity);
        gl.uniform1f(u.bias.as_ref(), p.bias);
        gl.uniform1f(u.band.as_ref(), p.band);
        let (mode, encoding, scale, uv_transform) = match p.occlusion {
            OcclusionInput::None => (0, 0, 1.0, Mat4::IDENTITY),
            OcclusionInput::Depth {
                encoding,
                raw_to_meters,
                uv_transform,
            } => (1, encoding.shader_index(), raw_to_meters, uv_transform),
            OcclusionInput::Mask => (2, 0, 1.0, Mat4::IDENTITY),
        };
        gl.uniform1i(u.occlusion.as_ref(), mode);
        gl.uniform1i(u.depth_encoding.as_ref(), encoding);
        gl.uniform1f(u.raw_to_meters.as_ref(), scale);
        gl.uniform_matrix4fv_with_f32_array(u.uv_transform.as_ref(), false, &uv_transform.to_cols_array());

        gl.active_texture(Gl::TEXTURE0);
        gl.bind_texture(Gl::TEXTURE_2D, Some(&self.wallpaper));
        gl.uniform1i(u.wallpaper.as_ref(), 0);
        gl.active_texture(Gl::TEXTURE1);
        gl.bind_texture(Gl::TEXTURE_2D, Some(&self.depth));
        gl.uniform1i(u.depth.as_ref(), 1);
        gl.active_texture(Gl::TEXTURE2);
        gl.bind_texture(Gl::TEXTURE_2D, Some(&self.mask));
        gl.uniform1i(u.mask.as_ref(), 2);

        self.draw_quad();
    }

    /// Ring marking where the wallpaper would be placed.
    pub fn draw_reticle(&self, p: &DrawParams) {
        self.bind_common(p);
        self.gl.uniform1i(self.uniforms.reticle.as_ref(), 1);
        self.draw_quad();
    }

    fn draw_quad(&self) {
        let gl = &self.gl;
        gl.enable(Gl::BLEND);
        gl.blend_func(Gl::ONE, Gl::ONE_MINUS_SRC_ALPHA);
        gl.bind_vertex_array(Some(&self.vao));
        gl.draw_arrays(Gl::TRIANGLE_STRIP, 0, 4);
        gl.bind_vertex_array(None);
    }
}
