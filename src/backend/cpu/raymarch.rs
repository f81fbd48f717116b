use super::kernels::Texel;
use super::CpuVolume;
use crate::backend::{BlendMode, CullMode, RenderState, SamplerKind, UploadedParameters};
use crate::error::FluidError;
use crate::kernel::names;
use cgmath::prelude::*;
use cgmath::{Matrix4, Point3, Vector3, Vector4};

/// Linear color image the host backend draws into.
pub struct CpuRenderTarget {
    width: u32,
    height: u32,
    pixels: Vec<Texel>,
}

impl CpuRenderTarget {
    pub fn new(width: u32, height: u32, clear_color: Texel) -> Self {
        CpuRenderTarget {
            width,
            height,
            pixels: vec![clear_color; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Texel {
        self.pixels[(x + y * self.width) as usize]
    }

    pub fn pixels(&self) -> &[Texel] {
        &self.pixels
    }
}

/// Ray through a pixel, in the unit cube's object space.
struct Ray {
    origin: Point3<f32>,
    direction: Vector3<f32>,
}

fn intersect_unit_cube(ray: &Ray) -> (f32, f32) {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    for axis in 0..3 {
        let inv = 1.0 / ray.direction[axis];
        let t0 = (-0.5 - ray.origin[axis]) * inv;
        let t1 = (0.5 - ray.origin[axis]) * inv;
        t_min = t_min.max(t0.min(t1));
        t_max = t_max.min(t0.max(t1));
    }
    (t_min, t_max)
}

/// Raymarches the unit cube [-0.5, 0.5]^3 mapped to the density volume, same as `raymarch_fragment.wgsl`.
/// Returns the number of pixels the cube covered.
pub(super) fn draw(
    target: &mut CpuRenderTarget,
    parameters: &UploadedParameters,
    density: &CpuVolume,
    sampler: SamplerKind,
    state: RenderState,
) -> Result<usize, FluidError> {
    let view = Matrix4::from(parameters.mat4(names::VIEW)?);
    let projection = Matrix4::from(parameters.mat4(names::PROJECTION)?);
    let inverse_world = Matrix4::from(parameters.mat4(names::INVERSE_WORLD)?);
    let camera_position = Point3::from(parameters.vec3(names::CAMERA_POSITION)?);
    let sample_count = parameters.uint(names::SAMPLE_COUNT)?.max(1);
    let tint = parameters.vec4(names::TINT)?;

    let inverse_view_projection = match (projection * view).invert() {
        Some(matrix) => matrix,
        None => return Ok(0),
    };
    let origin = inverse_world.transform_point(camera_position);

    let mut covered = 0;
    for y in 0..target.height {
        for x in 0..target.width {
            let ndc_x = (x as f32 + 0.5) / target.width as f32 * 2.0 - 1.0;
            let ndc_y = 1.0 - (y as f32 + 0.5) / target.height as f32 * 2.0;
            let far = inverse_view_projection * Vector4::new(ndc_x, ndc_y, 1.0, 1.0);
            let far = Point3::from_homogeneous(far);
            let direction = inverse_world.transform_vector(far - camera_position);
            if direction.magnitude2() == 0.0 {
                continue;
            }
            let ray = Ray {
                origin,
                direction: direction.normalize(),
            };

            let (t_enter, t_exit) = intersect_unit_cube(&ray);
            let visible = match state.cull {
                // only front faces drawn: the camera has to be outside
                CullMode::Back => t_enter > 0.0 && t_exit > t_enter,
                CullMode::Front | CullMode::None => t_exit > t_enter.max(0.0),
            };
            if !visible {
                continue;
            }
            covered += 1;

            let t_start = t_enter.max(0.0);
            let step = (t_exit - t_start) / sample_count as f32;
            let mut color = [0.0f32; 3];
            let mut alpha = 0.0f32;
            for i in 0..sample_count {
                let position = ray.origin + ray.direction * (t_start + (i as f32 + 0.5) * step);
                let uvw = [position.x + 0.5, position.y + 0.5, position.z + 0.5];
                let sample_alpha = (density.sample(sampler, uvw)[0] * tint[3] * step).clamp(0.0, 1.0);
                let weight = (1.0 - alpha) * sample_alpha;
                color[0] += weight * tint[0];
                color[1] += weight * tint[1];
                color[2] += weight * tint[2];
                alpha += weight;
            }

            let source = [color[0], color[1], color[2], alpha];
            let pixel = &mut target.pixels[(x + y * target.width) as usize];
            *pixel = match state.blend {
                BlendMode::Opaque => source,
                BlendMode::PremultipliedAlpha => [
                    source[0] + pixel[0] * (1.0 - alpha),
                    source[1] + pixel[1] * (1.0 - alpha),
                    source[2] + pixel[2] * (1.0 - alpha),
                    source[3] + pixel[3] * (1.0 - alpha),
                ],
            };
        }
    }
    Ok(covered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_intersection() {
        let ray = Ray {
            origin: Point3::new(0.0, 0.0, -2.0),
            direction: Vector3::unit_z(),
        };
        assert_eq!(intersect_unit_cube(&ray), (1.5, 2.5));

        let inside = Ray {
            origin: Point3::new(0.0, 0.25, 0.0),
            direction: Vector3::unit_y(),
        };
        assert_eq!(intersect_unit_cube(&inside), (-0.75, 0.25));

        let miss = Ray {
            origin: Point3::new(2.0, 0.0, -2.0),
            direction: Vector3::unit_z(),
        };
        let (t_enter, t_exit) = intersect_unit_cube(&miss);
        assert!(t_exit < t_enter);
    }
}
