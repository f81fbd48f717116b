use crate::error::FluidError;
use crate::format_info;
use crate::grid::{GridResolution, MAX_GRID_RESOLUTION};
use crate::simulation::FieldInit;
use serde::Deserialize;
use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

/// Texel formats a simulated quantity can be stored in.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    Rgba32Float,
    Rgba16Float,
    R32Float,
}

impl From<FieldFormat> for wgpu::TextureFormat {
    fn from(format: FieldFormat) -> Self {
        match format {
            FieldFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            FieldFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            FieldFormat::R32Float => wgpu::TextureFormat::R32Float,
        }
    }
}

/// Parameters that may be tuned between ticks.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct SimulationParameters {
    /// Simulated seconds per tick.
    pub time_step: f32,
    /// Jacobi iterations per tick. There is no convergence check.
    pub pressure_iterations: u32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        SimulationParameters {
            time_step: 1.0 / 60.0,
            pressure_iterations: 20,
        }
    }
}

impl SimulationParameters {
    pub fn validate(&self) -> Result<(), FluidError> {
        if self.pressure_iterations == 0 {
            return Err(FluidError::InvalidConfig("pressure solver needs at least one iteration".to_owned()));
        }
        validate_time_step(self.time_step)
    }
}

/// Time steps have to be finite and not negative.
pub fn validate_time_step(time_step: f32) -> Result<(), FluidError> {
    if !(time_step.is_finite() && time_step >= 0.0) {
        return Err(FluidError::InvalidConfig(format!("invalid time step {}", time_step)));
    }
    Ok(())
}

/// Adds density and velocity around a point every tick.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct SmokeSource {
    /// Center in texture space, i.e. [0, 1] on every axis.
    pub position: cgmath::Point3<f32>,
    /// Radius in texture space. Influence falls off linearly towards it.
    pub radius: f32,
    /// Density added per second at the center.
    #[serde(default)]
    pub density: [f32; 4],
    /// Velocity in cells per second added per second at the center.
    #[serde(default = "zero_vector")]
    pub velocity: cgmath::Vector3<f32>,
}

fn zero_vector() -> cgmath::Vector3<f32> {
    cgmath::Vector3::new(0.0, 0.0, 0.0)
}

// Data describing a fluid. The grid resolution can't change once a field is created from it.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct FluidConfig {
    pub grid_resolution: u32,
    pub velocity_format: FieldFormat,
    pub density_format: FieldFormat,
    /// Also used for the divergence.
    pub pressure_format: FieldFormat,
    pub simulation: SimulationParameters,
    pub initial_velocity: FieldInit,
    pub initial_density: FieldInit,
    pub sources: Vec<SmokeSource>,
}

impl Default for FluidConfig {
    fn default() -> Self {
        FluidConfig {
            grid_resolution: 64,
            velocity_format: FieldFormat::Rgba32Float,
            density_format: FieldFormat::Rgba32Float,
            pressure_format: FieldFormat::R32Float,
            simulation: SimulationParameters::default(),
            initial_velocity: FieldInit::Zero,
            initial_density: FieldInit::Zero,
            sources: Vec::new(),
        }
    }
}

impl FluidConfig {
    /// Checks everything that can be checked without a device.
    pub fn validate(&self) -> Result<GridResolution, FluidError> {
        let resolution = GridResolution::new(self.grid_resolution)?;
        if resolution.get() > MAX_GRID_RESOLUTION {
            return Err(FluidError::InvalidConfig(format!(
                "grid resolution {} exceeds the maximum of {}",
                resolution.get(),
                MAX_GRID_RESOLUTION
            )));
        }

        for (quantity, format, channels) in [
            ("velocity", self.velocity_format, 4),
            ("density", self.density_format, 4),
            ("pressure", self.pressure_format, 1),
        ] {
            let actual = format_info::channel_count(format.into());
            if actual != channels {
                return Err(FluidError::InvalidConfig(format!(
                    "{} needs a format with {} channels, {:?} has {}",
                    quantity, channels, format, actual
                )));
            }
        }

        self.simulation.validate()?;

        if let Some(source) = self.sources.iter().find(|source| !(source.radius > 0.0)) {
            return Err(FluidError::InvalidConfig(format!(
                "smoke source at {:?} needs a positive radius",
                source.position
            )));
        }
        Ok(resolution)
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RenderConfig {
    /// Color of fully dense smoke, alpha scales the opacity.
    pub tint: [f32; 4],
    pub sample_count: u32,
    /// World space center of the bounding cube.
    pub position: cgmath::Point3<f32>,
    /// World space edge length of the bounding cube.
    pub scale: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            tint: [0.85, 0.87, 0.9, 1.0],
            sample_count: 64,
            position: cgmath::Point3::new(0.0, 0.0, 0.0),
            scale: 1.0,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), FluidError> {
        if self.sample_count == 0 {
            return Err(FluidError::InvalidConfig("raymarch sample count needs to be greater than zero".to_owned()));
        }
        if !(self.scale > 0.0) {
            return Err(FluidError::InvalidConfig(format!("invalid volume scale {}", self.scale)));
        }
        Ok(())
    }
}

fn default_steps_per_second() -> u64 {
    60
}

fn default_shader_directory() -> PathBuf {
    PathBuf::from("shader")
}

// Everything the application reads from its configuration file.
#[derive(Deserialize, Clone, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub fluid: FluidConfig,
    #[serde(default)]
    pub rendering: RenderConfig,
    #[serde(default = "default_steps_per_second")]
    pub steps_per_second: u64,
    #[serde(default = "default_shader_directory")]
    pub shader_directory: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            fluid: FluidConfig::default(),
            rendering: RenderConfig::default(),
            steps_per_second: default_steps_per_second(),
            shader_directory: default_shader_directory(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, FluidError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: AppConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        info!("loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FluidError> {
        self.fluid.validate()?;
        self.rendering.validate()?;
        if self.steps_per_second == 0 {
            return Err(FluidError::InvalidConfig("steps per second need to be greater than zero".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fluid.grid_resolution, 64);
        assert_eq!(config.fluid.simulation.pressure_iterations, 20);
        assert_eq!(config.fluid.pressure_format, FieldFormat::R32Float);
        assert_eq!(config.steps_per_second, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_full_fluid_config() {
        let config: FluidConfig = serde_json::from_str(
            r#"{
                "grid_resolution": 32,
                "velocity_format": "rgba16float",
                "simulation": { "pressure_iterations": 40 },
                "initial_velocity": { "type": "random_unit_vectors", "seed": 7 },
                "initial_density": { "type": "constant", "value": [0.5, 0.0, 0.0, 0.0] },
                "sources": [{ "position": { "x": 0.5, "y": 0.1, "z": 0.5 }, "radius": 0.1, "density": [1.0, 0.0, 0.0, 0.0] }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.grid_resolution, 32);
        assert_eq!(config.velocity_format, FieldFormat::Rgba16Float);
        assert_eq!(config.simulation.pressure_iterations, 40);
        assert_eq!(config.simulation.time_step, 1.0 / 60.0);
        assert_eq!(config.initial_velocity, FieldInit::RandomUnitVectors { seed: 7 });
        assert_eq!(config.sources[0].velocity, cgmath::Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(config.validate().unwrap().get(), 32);
    }

    #[test]
    fn rejects_invalid_fluid_configs() {
        let zero_resolution = FluidConfig {
            grid_resolution: 0,
            ..Default::default()
        };
        assert!(matches!(zero_resolution.validate(), Err(FluidError::InvalidGridResolution(0))));

        let largest = FluidConfig {
            grid_resolution: MAX_GRID_RESOLUTION,
            ..Default::default()
        };
        assert_eq!(largest.validate().unwrap().get(), MAX_GRID_RESOLUTION);
        let oversized = FluidConfig {
            grid_resolution: 16384,
            ..Default::default()
        };
        assert!(matches!(oversized.validate(), Err(FluidError::InvalidConfig(_))));

        let scalar_velocity = FluidConfig {
            velocity_format: FieldFormat::R32Float,
            ..Default::default()
        };
        assert!(matches!(scalar_velocity.validate(), Err(FluidError::InvalidConfig(_))));

        let no_iterations = FluidConfig {
            simulation: SimulationParameters {
                pressure_iterations: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(no_iterations.validate(), Err(FluidError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_sample_count() {
        let config = AppConfig {
            rendering: RenderConfig {
                sample_count: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FluidError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_format_fails_to_parse() {
        assert!(serde_json::from_str::<FluidConfig>(r#"{ "density_format": "bgra8unorm" }"#).is_err());
    }
}
