//! Host versions of the simulation kernels, same finite difference stencils as the programs in `shader/simulation`.

use super::CpuVolume;
use crate::backend::SamplerKind;

pub type Texel = [f32; 4];

const OFFSETS: [[i64; 3]; 6] = [[-1, 0, 0], [1, 0, 0], [0, -1, 0], [0, 1, 0], [0, 0, -1], [0, 0, 1]];

/// Texture space coordinate of a texel center.
pub(super) fn texel_center(cell: [u32; 3], inv_grid_resolution: f32) -> [f32; 3] {
    [
        (cell[0] as f32 + 0.5) * inv_grid_resolution,
        (cell[1] as f32 + 0.5) * inv_grid_resolution,
        (cell[2] as f32 + 0.5) * inv_grid_resolution,
    ]
}

fn neighbor(volume: &CpuVolume, sampler: SamplerKind, cell: [u32; 3], offset: [i64; 3], inv_grid_resolution: f32) -> Texel {
    let uvw = [
        (cell[0] as i64 + offset[0]) as f32 + 0.5,
        (cell[1] as i64 + offset[1]) as f32 + 0.5,
        (cell[2] as i64 + offset[2]) as f32 + 0.5,
    ];
    volume.sample(sampler, [uvw[0] * inv_grid_resolution, uvw[1] * inv_grid_resolution, uvw[2] * inv_grid_resolution])
}

/// Semi-Lagrangian step: follows the velocity at the cell backwards and samples the field there.
/// Velocity is given in grid cells per second.
pub(super) fn advect(cell: [u32; 3], field: &CpuVolume, velocity: &CpuVolume, sampler: SamplerKind, delta_time: f32, inv_grid_resolution: f32) -> Texel {
    let v = velocity.texel(cell);
    let position = texel_center(cell, inv_grid_resolution);
    let origin = [
        position[0] - delta_time * v[0] * inv_grid_resolution,
        position[1] - delta_time * v[1] * inv_grid_resolution,
        position[2] - delta_time * v[2] * inv_grid_resolution,
    ];
    field.sample(sampler, origin)
}

/// Central difference divergence, halved for the two cell distance.
pub(super) fn divergence(cell: [u32; 3], velocity: &CpuVolume, sampler: SamplerKind, inv_grid_resolution: f32) -> Texel {
    let n: Vec<Texel> = OFFSETS
        .iter()
        .map(|offset| neighbor(velocity, sampler, cell, *offset, inv_grid_resolution))
        .collect();
    let divergence = 0.5 * ((n[1][0] - n[0][0]) + (n[3][1] - n[2][1]) + (n[5][2] - n[4][2]));
    [divergence, 0.0, 0.0, 0.0]
}

/// One Jacobi iteration of the pressure poisson equation.
pub(super) fn pressure_solve(cell: [u32; 3], divergence: &CpuVolume, pressure: &CpuVolume, sampler: SamplerKind, inv_grid_resolution: f32) -> Texel {
    let neighbors: f32 = OFFSETS
        .iter()
        .map(|offset| neighbor(pressure, sampler, cell, *offset, inv_grid_resolution)[0])
        .sum();
    let divergence = neighbor(divergence, sampler, cell, [0, 0, 0], inv_grid_resolution)[0];
    [(neighbors - divergence) / 6.0, 0.0, 0.0, 0.0]
}

/// Subtracts the pressure gradient.
pub(super) fn pressure_project(cell: [u32; 3], velocity: &CpuVolume, pressure: &CpuVolume, sampler: SamplerKind, inv_grid_resolution: f32) -> Texel {
    let p: Vec<f32> = OFFSETS
        .iter()
        .map(|offset| neighbor(pressure, sampler, cell, *offset, inv_grid_resolution)[0])
        .collect();
    let v = neighbor(velocity, sampler, cell, [0, 0, 0], inv_grid_resolution);
    [
        v[0] - 0.5 * (p[1] - p[0]),
        v[1] - 0.5 * (p[3] - p[2]),
        v[2] - 0.5 * (p[5] - p[4]),
        v[3],
    ]
}

pub(super) struct Source {
    pub position: [f32; 3],
    pub radius: f32,
    pub value: [f32; 4],
}

/// Adds `value` per second with linear falloff to zero at `radius` (texture space).
pub(super) fn inject_source(cell: [u32; 3], field: &CpuVolume, sampler: SamplerKind, source: &Source, delta_time: f32, inv_grid_resolution: f32) -> Texel {
    let position = texel_center(cell, inv_grid_resolution);
    let distance = (0..3)
        .map(|i| (position[i] - source.position[i]).powi(2))
        .sum::<f32>()
        .sqrt();
    let weight = if source.radius > 0.0 {
        (1.0 - distance / source.radius).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let current = field.sample(sampler, position);
    [
        current[0] + source.value[0] * weight * delta_time,
        current[1] + source.value[1] * weight * delta_time,
        current[2] + source.value[2] * weight * delta_time,
        current[3] + source.value[3] * weight * delta_time,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridResolution;

    fn volume(n: u32, f: impl Fn([u32; 3]) -> Texel) -> CpuVolume {
        let grid = GridResolution::new(n).unwrap();
        CpuVolume::from_texels(grid, 4, grid.cells().map(f).collect())
    }

    #[test]
    fn divergence_of_linear_field() {
        // v = (x, 2y, 0) has divergence 3 per cell away from the clamped border
        let velocity = volume(8, |[x, y, _]| [x as f32, 2.0 * y as f32, 0.0, 0.0]);
        let inv = 1.0 / 8.0;
        assert_eq!(divergence([3, 4, 5], &velocity, SamplerKind::PointClamp, inv)[0], 3.0);
        // border: one sided difference halved
        assert_eq!(divergence([0, 4, 5], &velocity, SamplerKind::PointClamp, inv)[0], 0.5 + 2.0);
    }

    #[test]
    fn jacobi_keeps_uniform_pressure() {
        let pressure = volume(8, |_| [2.5, 0.0, 0.0, 0.0]);
        let divergence = volume(8, |_| [0.0; 4]);
        for cell in [[0, 0, 0], [3, 4, 5], [7, 7, 7]] {
            assert_eq!(pressure_solve(cell, &divergence, &pressure, SamplerKind::PointClamp, 0.125)[0], 2.5);
        }
    }

    #[test]
    fn projection_removes_gradient() {
        // p = x gives a gradient of 1 in x, halved central difference
        let pressure = volume(8, |[x, _, _]| [x as f32, 0.0, 0.0, 0.0]);
        let velocity = volume(8, |_| [1.0, 1.0, 0.0, 0.0]);
        assert_eq!(
            pressure_project([4, 4, 4], &velocity, &pressure, SamplerKind::PointClamp, 0.125),
            [0.0, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn advect_moves_by_whole_cells() {
        let field = volume(8, |[x, y, z]| [x as f32 + 10.0 * y as f32 + 100.0 * z as f32, 0.0, 0.0, 1.0]);
        let velocity = volume(8, |_| [2.0, 0.0, -1.0, 0.0]);
        let advected = advect([4, 4, 4], &field, &velocity, SamplerKind::LinearClamp, 0.5, 0.125);
        // looks back one cell in x and half a cell forward in z
        assert_eq!(advected[0], 3.0 + 40.0 + 450.0);
        assert_eq!(advected[3], 1.0);
    }

    #[test]
    fn source_falls_off_linearly() {
        let field = volume(8, |_| [0.0; 4]);
        let source = Source {
            position: [0.5, 0.5, 0.5],
            radius: 0.25,
            value: [1.0, 0.0, 0.0, 2.0],
        };
        let inside = inject_source([4, 4, 4], &field, SamplerKind::PointClamp, &source, 1.0, 0.125);
        // texel center (0.5625, ..) is sqrt(3) / 16 away from the source
        let expected = 1.0 - (3.0f32.sqrt() / 16.0) / 0.25;
        assert!((inside[0] - expected).abs() < 1e-6);
        assert!((inside[3] - 2.0 * expected).abs() < 1e-6);
        assert_eq!(inject_source([0, 0, 0], &field, SamplerKind::PointClamp, &source, 1.0, 0.125), [0.0; 4]);
    }
}
