use crate::error::FluidError;
use crate::format_info;
use crate::grid::GridResolution;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::Deserialize;

/// How a quantity is seeded when its volumes are allocated.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldInit {
    /// Whatever the device hands out.
    Uninitialized,
    Zero,
    Constant { value: [f32; 4] },
    /// Random directions of length one, reproducible for a given seed.
    RandomUnitVectors { seed: u64 },
    /// One texel per cell, x varying fastest.
    Texels { texels: Vec<[f32; 4]> },
}

impl FieldInit {
    /// Tightly packed texel data for a volume, `None` if the volume should stay uninitialized.
    ///
    /// Only `Zero` works with every format, the other variants need 32 bit float channels.
    pub fn texel_data(&self, label: &str, resolution: GridResolution, format: wgpu::TextureFormat) -> Result<Option<Vec<u8>>, FluidError> {
        let bytes_per_texel = format_info::bytes_per_texel(format) as usize;
        let channels = format_info::channel_count(format) as usize;
        if bytes_per_texel == 0 {
            return Err(FluidError::UnsupportedFormat {
                format,
                usage: "initial grid data",
            });
        }
        let oversized = || FluidError::ResourceCreation {
            label: label.to_owned(),
            message: format!("initial data for a {}^3 grid doesn't fit into memory", resolution.get()),
        };
        let num_cells = resolution.num_cells().ok_or_else(oversized)?;
        let num_bytes = num_cells.checked_mul(bytes_per_texel).ok_or_else(oversized)?;

        let texels: Vec<[f32; 4]> = match self {
            FieldInit::Uninitialized => return Ok(None),
            FieldInit::Zero => return Ok(Some(vec![0; num_bytes])),
            FieldInit::Constant { value } => vec![*value; num_cells],
            FieldInit::RandomUnitVectors { seed } => {
                let mut rng = SmallRng::seed_from_u64(*seed);
                (0..num_cells).map(|_| random_unit_vector(&mut rng)).collect()
            }
            FieldInit::Texels { texels } => {
                if texels.len() != num_cells {
                    return Err(FluidError::InitialDataSize {
                        label: label.to_owned(),
                        expected: num_bytes,
                        actual: texels.len() * bytes_per_texel,
                    });
                }
                texels.clone()
            }
        };

        if bytes_per_texel != channels * std::mem::size_of::<f32>() {
            return Err(FluidError::UnsupportedFormat {
                format,
                usage: "generated initial grid data",
            });
        }
        let data = texels
            .iter()
            .flat_map(|texel| texel[..channels].iter())
            .flat_map(|component| component.to_le_bytes())
            .collect();
        Ok(Some(data))
    }
}

fn random_unit_vector(rng: &mut SmallRng) -> [f32; 4] {
    // Rejection sampling in the unit ball gives uniformly distributed directions.
    loop {
        let v = [rng.gen_range(-1.0f32..1.0), rng.gen_range(-1.0f32..1.0), rng.gen_range(-1.0f32..1.0)];
        let length_sq = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
        if length_sq > 1.0e-6 && length_sq <= 1.0 {
            let length = length_sq.sqrt();
            return [v[0] / length, v[1] / length, v[2] / length, 0.0];
        }
    }
}
