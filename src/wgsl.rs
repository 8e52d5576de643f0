//! WGSL sources for the compositor's own passes.
//!
//! Individual effects ship their own shaders; these modules cover the fixed
//! plumbing: blit, premultiplied floor compositing, alpha clipping, mask
//! composition, and the depth-debug visualiser. Every module here is parsed
//! with naga in tests.

use anyhow::{Result, anyhow};

/// Shared fullscreen-triangle vertex stage. Fragment-only modules are
/// concatenated onto this.
pub const FULLSCREEN_VS: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VsOut {
    var out: VsOut;
    let uv = vec2<f32>(f32((vi << 1u) & 2u), f32(vi & 2u));
    out.pos = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}
"#;

/// Plain textured blit.
pub const BLIT_FS: &str = r#"
@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var src_samp: sampler;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    return textureSample(src_tex, src_samp, in.uv);
}
"#;

/// Floor-over-accumulator composite. The pipeline blends with
/// `src = One, dst = OneMinusSrcAlpha`; the shader enforces the premultiplied
/// invariant by zeroing RGB wherever alpha is effectively transparent, so
/// lighting additions cannot leak colour into fully transparent regions.
pub const COMPOSITE_OVER_FS: &str = r#"
@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var src_samp: sampler;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    var c = textureSample(src_tex, src_samp, in.uv);
    if (c.a < 0.004) {
        c = vec4<f32>(0.0, 0.0, 0.0, c.a);
    }
    return c;
}
"#;

/// Multiply a floor image by its alpha-clip mask so transparent gaps in upper
/// floors reveal the floors below. Inputs and output are premultiplied.
pub const ALPHA_CLIP_FS: &str = r#"
@group(0) @binding(0) var color_tex: texture_2d<f32>;
@group(0) @binding(1) var mask_tex: texture_2d<f32>;
@group(0) @binding(2) var clip_samp: sampler;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let c = textureSample(color_tex, clip_samp, in.uv);
    let m = textureSample(mask_tex, clip_samp, in.uv).r;
    return vec4<f32>(c.rgb * m, c.a * m);
}
"#;

/// Tile-into-scene mask composition. One draw per tile per mask kind; the
/// uniform carries the tile transform and whether the scalar comes from the
/// image or from its alpha channel (degenerate whole-tile masks).
pub const MASK_COMPOSE: &str = r#"
struct TileTransform {
    // origin.xy, size.zw of the scene rect in world units
    scene_rect: vec4<f32>,
    // tile center.xy, half-size.zw in world units
    center_half: vec4<f32>,
    // rotation sin, rotation cos, flip.x, flip.y
    rot_flip: vec4<f32>,
    // tile alpha, use-alpha-channel flag, erase flag, unused
    misc: vec4<f32>,
};

@group(0) @binding(0) var<uniform> tile: TileTransform;
@group(0) @binding(1) var mask_tex: texture_2d<f32>;
@group(0) @binding(2) var mask_samp: sampler;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VsOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vi];

    let local = corner * tile.center_half.zw * tile.rot_flip.zw;
    let s = tile.rot_flip.x;
    let c = tile.rot_flip.y;
    let rotated = vec2<f32>(local.x * c - local.y * s, local.x * s + local.y * c);
    let world = tile.center_half.xy + rotated;
    let scene_uv = (world - tile.scene_rect.xy) / tile.scene_rect.zw;

    var out: VsOut;
    out.pos = vec4<f32>(scene_uv.x * 2.0 - 1.0, 1.0 - scene_uv.y * 2.0, 0.0, 1.0);
    out.uv = corner * 0.5 + vec2<f32>(0.5, 0.5);
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let s = textureSample(mask_tex, mask_samp, in.uv);
    let from_image = s.r * s.a;
    let scalar = mix(from_image, s.a, tile.misc.y) * tile.misc.x;
    // Erase draws (wall occluders) overwrite the scalar with zero.
    return mix(
        vec4<f32>(scalar, scalar, scalar, scalar),
        vec4<f32>(0.0, 0.0, 0.0, 1.0),
        tile.misc.z,
    );
}
"#;

/// Grayscale depth visualiser for the debug subwindow.
pub const DEPTH_DEBUG: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VsOut {
    var out: VsOut;
    let uv = vec2<f32>(f32((vi << 1u) & 2u), f32(vi & 2u));
    out.pos = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

@group(0) @binding(0) var depth_tex: texture_depth_2d;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let dims = textureDimensions(depth_tex);
    let px = vec2<i32>(
        i32(in.uv.x * f32(dims.x)),
        i32(in.uv.y * f32(dims.y)),
    );
    let d = textureLoad(depth_tex, px, 0);
    return vec4<f32>(d, d, d, 1.0);
}
"#;

/// Brightness/contrast/saturation grade used by the built-in post effect.
pub const COLOR_GRADE_FS: &str = r#"
struct GradeParams {
    // brightness, contrast, saturation, unused
    values: vec4<f32>,
};

@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var src_samp: sampler;
@group(0) @binding(2) var<uniform> grade: GradeParams;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let c = textureSample(src_tex, src_samp, in.uv);
    var rgb = (c.rgb - vec3<f32>(0.5)) * grade.values.y + vec3<f32>(0.5);
    rgb = rgb + vec3<f32>(grade.values.x);
    let luma = dot(rgb, vec3<f32>(0.2126, 0.7152, 0.0722));
    rgb = mix(vec3<f32>(luma), rgb, grade.values.z);
    return vec4<f32>(max(rgb, vec3<f32>(0.0)), c.a);
}
"#;

/// Interior darkening from the outdoors mask, used by the built-in
/// roof-shadow scene effect. Blends onto the floor target.
pub const ROOF_SHADOW_FS: &str = r#"
struct ShadowParams {
    // strength, darkness level, unused, unused
    values: vec4<f32>,
};

@group(0) @binding(0) var outdoors_tex: texture_2d<f32>;
@group(0) @binding(1) var shadow_samp: sampler;
@group(0) @binding(2) var<uniform> shadow: ShadowParams;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let outdoors = textureSample(outdoors_tex, shadow_samp, in.uv).r;
    let occlusion = (1.0 - outdoors) * shadow.values.x * shadow.values.y;
    return vec4<f32>(0.0, 0.0, 0.0, occlusion);
}
"#;

/// One direction of the separable Gaussian used by the built-in blur. Taps
/// are (offset, weight) pairs evaluated symmetrically with linear sampling.
pub const GAUSSIAN_BLUR_FS: &str = r#"
struct BlurParams {
    // direction in texel units (xy), tap count (z), unused (w)
    dir: vec4<f32>,
    // x = offset in texels, y = weight, zw unused
    taps: array<vec4<f32>, 8>,
};

@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var src_samp: sampler;
@group(0) @binding(2) var<uniform> blur: BlurParams;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let dims = vec2<f32>(textureDimensions(src_tex));
    let step = blur.dir.xy / dims;
    var acc = vec4<f32>(0.0, 0.0, 0.0, 0.0);
    let count = u32(blur.dir.z);
    for (var i = 0u; i < count; i = i + 1u) {
        let offset = step * blur.taps[i].x;
        let weight = blur.taps[i].y;
        acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + offset, 0.0) * weight;
        acc = acc + textureSampleLevel(src_tex, src_samp, in.uv - offset, 0.0) * weight;
    }
    return acc;
}
"#;

/// Rain streaks gated by the outdoors mask, used by the built-in particle
/// effect. Drops are (pos.xy, unused, alpha) in scene UV.
pub const RAIN_FS: &str = r#"
struct RainParams {
    // xy = fall direction in uv, z = streak length in uv, w = intensity
    dir: vec4<f32>,
    drops: array<vec4<f32>, 128>,
};

@group(0) @binding(0) var outdoors_tex: texture_2d<f32>;
@group(0) @binding(1) var rain_samp: sampler;
@group(0) @binding(2) var<uniform> rain: RainParams;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    var streak = 0.0;
    for (var i = 0u; i < 128u; i = i + 1u) {
        let drop = rain.drops[i];
        if (drop.w <= 0.0) {
            continue;
        }
        let delta = in.uv - drop.xy;
        let along = clamp(dot(delta, rain.dir.xy), 0.0, rain.dir.z);
        let closest = drop.xy + rain.dir.xy * along;
        let d = distance(in.uv, closest);
        streak = streak + drop.w * (1.0 - smoothstep(0.0, 0.0015, d));
    }
    let outdoors = textureSampleLevel(outdoors_tex, rain_samp, in.uv, 0.0).r;
    let a = clamp(streak, 0.0, 1.0) * outdoors * rain.dir.w;
    return vec4<f32>(0.8 * a, 0.85 * a, 0.95 * a, a);
}
"#;

/// Fold a discrete Gaussian into at most 8 linear-sampled taps per side.
///
/// Tap 0 is the (half-weighted) centre texel; tap t >= 1 merges the texels at
/// distances 2t-1 and 2t into one bilinear fetch. Returns (offsets, weights,
/// count); taps below a 0.002 weight floor are dropped from the count.
pub fn gaussian_taps_8(sigma: f32) -> ([f32; 8], [f32; 8], u32) {
    let sigma = sigma.max(1e-4) as f64;
    let mut kernel = [0.0f64; 27];
    let coeff = 1.0 / (sigma * std::f64::consts::PI * 2.0).sqrt();
    let mut sum = 0.0f64;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f64 - 13.0;
        *k = (-x * x * 0.5 / sigma).exp() * coeff;
        sum += *k;
    }
    for k in &mut kernel {
        *k /= sum;
    }
    // The centre texel is sampled twice by the symmetric shader loop.
    kernel[13] /= 2.0;

    let mut offsets = [0.0f32; 8];
    let mut weights = [0.0f32; 8];
    let mut count = 0u32;
    for t in 0..8usize {
        let (weight, offset) = if t == 0 {
            (kernel[13], 0.0)
        } else {
            let near = kernel[13 - (2 * t - 1)];
            let far = kernel[13 - 2 * t];
            let w = near + far;
            let o = if w > 0.0 {
                ((2 * t - 1) as f64 * near + (2 * t) as f64 * far) / w
            } else {
                0.0
            };
            (w, o)
        };
        if t > 0 && weight < 0.002 {
            break;
        }
        offsets[t] = offset as f32;
        weights[t] = weight as f32;
        count = (t + 1) as u32;
    }
    (offsets, weights, count)
}

/// Compose a complete module from the shared fullscreen vertex stage and a
/// fragment-only body.
pub fn fullscreen_module(fragment_body: &str) -> String {
    let mut module = String::with_capacity(FULLSCREEN_VS.len() + fragment_body.len());
    module.push_str(FULLSCREEN_VS);
    module.push_str(fragment_body);
    module
}

/// Validate WGSL source with naga's parser.
pub fn validate_wgsl(source: &str, context: &str) -> Result<naga::Module> {
    naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("{context} generated invalid WGSL: {}", e.emit_to_string(source)))
}

/// Every fixed module the compositor ships, for warmup and validation.
pub fn all_modules() -> Vec<(&'static str, String)> {
    vec![
        ("blit", fullscreen_module(BLIT_FS)),
        ("composite_over", fullscreen_module(COMPOSITE_OVER_FS)),
        ("alpha_clip", fullscreen_module(ALPHA_CLIP_FS)),
        ("mask_compose", MASK_COMPOSE.to_string()),
        ("depth_debug", DEPTH_DEBUG.to_string()),
        ("color_grade", fullscreen_module(COLOR_GRADE_FS)),
        ("roof_shadow", fullscreen_module(ROOF_SHADOW_FS)),
        ("gaussian_blur", fullscreen_module(GAUSSIAN_BLUR_FS)),
        ("rain", fullscreen_module(RAIN_FS)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_fixed_modules_parse() {
        for (name, source) in all_modules() {
            validate_wgsl(&source, name)
                .unwrap_or_else(|e| panic!("module {name} failed to parse:\n{e:#}"));
        }
    }

    #[test]
    fn fullscreen_module_contains_both_stages() {
        let module = fullscreen_module(BLIT_FS);
        assert!(module.contains("@vertex"));
        assert!(module.contains("@fragment"));
    }

    #[test]
    fn gaussian_taps_normalise_and_shrink_with_sigma() {
        for sigma in [0.5, 2.0, 4.0] {
            let (offsets, weights, count) = gaussian_taps_8(sigma);
            assert!(count >= 1);
            // Symmetric evaluation: both sides together must sum to ~1.
            let sum: f32 = weights[..count as usize].iter().map(|w| w * 2.0).sum();
            assert!((sum - 1.0).abs() < 0.02, "sigma {sigma}: sum {sum}");
            // Offsets increase monotonically outwards.
            for pair in offsets[..count as usize].windows(2) {
                assert!(pair[0] < pair[1]);
            }
        }
        let (_, _, narrow) = gaussian_taps_8(0.3);
        let (_, _, wide) = gaussian_taps_8(6.0);
        assert!(narrow <= wide);
    }
}
