use crate::error::FluidError;

/// Parameter and binding names shared by host code and kernel programs.
pub mod names {
    pub const DELTA_TIME: &str = "delta_time";
    pub const INV_GRID_RESOLUTION: &str = "inv_grid_resolution";
    pub const GRID_RESOLUTION: &str = "grid_resolution";
    pub const CLEAR_VALUE: &str = "clear_value";
    pub const SOURCE_POSITION: &str = "source_position";
    pub const SOURCE_RADIUS: &str = "source_radius";
    pub const SOURCE_VALUE: &str = "source_value";
    pub const WORLD: &str = "world";
    pub const INVERSE_WORLD: &str = "inverse_world";
    pub const VIEW: &str = "view";
    pub const PROJECTION: &str = "projection";
    pub const CAMERA_POSITION: &str = "camera_position";
    pub const SAMPLE_COUNT: &str = "sample_count";
    pub const TINT: &str = "tint";

    pub const INPUT_FIELD: &str = "input_field";
    pub const VELOCITY_FIELD: &str = "velocity_field";
    pub const DIVERGENCE_FIELD: &str = "divergence_field";
    pub const PRESSURE_FIELD: &str = "pressure_field";
    pub const DENSITY_FIELD: &str = "density_field";
    pub const OUTPUT_FIELD: &str = "output_field";
    pub const FIELD_SAMPLER: &str = "field_sampler";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, IntoStaticStr)]
pub enum Kernel {
    Advect,
    Divergence,
    PressureSolve,
    PressureProject,
    Clear,
    InjectSource,
    Raymarch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum KernelStage {
    #[strum(serialize = "compute")]
    Compute,
    #[strum(serialize = "render")]
    Render,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Float,
    UInt,
    Vec3,
    Vec4,
    Mat4,
}

impl ParameterKind {
    // WGSL uniform address space layout
    fn alignment(self) -> usize {
        match self {
            ParameterKind::Float | ParameterKind::UInt => 4,
            ParameterKind::Vec3 | ParameterKind::Vec4 | ParameterKind::Mat4 => 16,
        }
    }

    fn size(self) -> usize {
        match self {
            ParameterKind::Float | ParameterKind::UInt => 4,
            ParameterKind::Vec3 => 12,
            ParameterKind::Vec4 => 16,
            ParameterKind::Mat4 => 64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    UInt(u32),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::UInt(_) => ParameterKind::UInt,
            ParameterValue::Vec3(_) => ParameterKind::Vec3,
            ParameterValue::Vec4(_) => ParameterKind::Vec4,
            ParameterValue::Mat4(_) => ParameterKind::Mat4,
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            ParameterValue::Float(v) => bytemuck::bytes_of(v),
            ParameterValue::UInt(v) => bytemuck::bytes_of(v),
            ParameterValue::Vec3(v) => bytemuck::bytes_of(v),
            ParameterValue::Vec4(v) => bytemuck::bytes_of(v),
            ParameterValue::Mat4(v) => bytemuck::bytes_of(v),
        }
    }
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        ParameterValue::Float(value)
    }
}
impl From<u32> for ParameterValue {
    fn from(value: u32) -> Self {
        ParameterValue::UInt(value)
    }
}
impl From<[f32; 4]> for ParameterValue {
    fn from(value: [f32; 4]) -> Self {
        ParameterValue::Vec4(value)
    }
}
impl From<cgmath::Vector3<f32>> for ParameterValue {
    fn from(value: cgmath::Vector3<f32>) -> Self {
        ParameterValue::Vec3(value.into())
    }
}
impl From<cgmath::Point3<f32>> for ParameterValue {
    fn from(value: cgmath::Point3<f32>) -> Self {
        ParameterValue::Vec3(value.into())
    }
}
impl From<cgmath::Matrix4<f32>> for ParameterValue {
    fn from(value: cgmath::Matrix4<f32>) -> Self {
        ParameterValue::Mat4(value.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    ReadVolume,
    WriteVolume,
    Sampler,
}

#[derive(Clone, Copy, Debug)]
pub struct ParameterDesc {
    pub name: &'static str,
    pub kind: ParameterKind,
}

#[derive(Clone, Copy, Debug)]
pub struct BindingDesc {
    pub name: &'static str,
    pub kind: BindingKind,
}

/// Everything the host needs to know about a kernel program: where its source lives,
/// the layout of its parameter block and the order of its resource bindings.
///
/// Binding 0 is always the parameter block, followed by `bindings` in order.
#[derive(Debug)]
pub struct KernelLayout {
    pub stage: KernelStage,
    /// Compute: a single program. Render: vertex and fragment program.
    pub programs: &'static [&'static str],
    pub parameters: &'static [ParameterDesc],
    pub bindings: &'static [BindingDesc],
}

const fn param(name: &'static str, kind: ParameterKind) -> ParameterDesc {
    ParameterDesc { name, kind }
}
const fn bind(name: &'static str, kind: BindingKind) -> BindingDesc {
    BindingDesc { name, kind }
}

const SIMULATION_PARAMETERS: &[ParameterDesc] = &[
    param(names::DELTA_TIME, ParameterKind::Float),
    param(names::INV_GRID_RESOLUTION, ParameterKind::Float),
    param(names::GRID_RESOLUTION, ParameterKind::UInt),
];

static ADVECT: KernelLayout = KernelLayout {
    stage: KernelStage::Compute,
    programs: &["simulation/advect.wgsl"],
    parameters: SIMULATION_PARAMETERS,
    bindings: &[
        bind(names::INPUT_FIELD, BindingKind::ReadVolume),
        bind(names::VELOCITY_FIELD, BindingKind::ReadVolume),
        bind(names::FIELD_SAMPLER, BindingKind::Sampler),
        bind(names::OUTPUT_FIELD, BindingKind::WriteVolume),
    ],
};

static DIVERGENCE: KernelLayout = KernelLayout {
    stage: KernelStage::Compute,
    programs: &["simulation/divergence.wgsl"],
    parameters: SIMULATION_PARAMETERS,
    bindings: &[
        bind(names::VELOCITY_FIELD, BindingKind::ReadVolume),
        bind(names::FIELD_SAMPLER, BindingKind::Sampler),
        bind(names::OUTPUT_FIELD, BindingKind::WriteVolume),
    ],
};

static PRESSURE_SOLVE: KernelLayout = KernelLayout {
    stage: KernelStage::Compute,
    programs: &["simulation/pressure_solve.wgsl"],
    parameters: SIMULATION_PARAMETERS,
    bindings: &[
        bind(names::DIVERGENCE_FIELD, BindingKind::ReadVolume),
        bind(names::PRESSURE_FIELD, BindingKind::ReadVolume),
        bind(names::FIELD_SAMPLER, BindingKind::Sampler),
        bind(names::OUTPUT_FIELD, BindingKind::WriteVolume),
    ],
};

static PRESSURE_PROJECT: KernelLayout = KernelLayout {
    stage: KernelStage::Compute,
    programs: &["simulation/pressure_project.wgsl"],
    parameters: SIMULATION_PARAMETERS,
    bindings: &[
        bind(names::VELOCITY_FIELD, BindingKind::ReadVolume),
        bind(names::PRESSURE_FIELD, BindingKind::ReadVolume),
        bind(names::FIELD_SAMPLER, BindingKind::Sampler),
        bind(names::OUTPUT_FIELD, BindingKind::WriteVolume),
    ],
};

static CLEAR: KernelLayout = KernelLayout {
    stage: KernelStage::Compute,
    programs: &["simulation/clear.wgsl"],
    parameters: &[param(names::CLEAR_VALUE, ParameterKind::Vec4), param(names::GRID_RESOLUTION, ParameterKind::UInt)],
    bindings: &[bind(names::OUTPUT_FIELD, BindingKind::WriteVolume)],
};

static INJECT_SOURCE: KernelLayout = KernelLayout {
    stage: KernelStage::Compute,
    programs: &["simulation/inject_source.wgsl"],
    parameters: &[
        param(names::DELTA_TIME, ParameterKind::Float),
        param(names::INV_GRID_RESOLUTION, ParameterKind::Float),
        param(names::GRID_RESOLUTION, ParameterKind::UInt),
        param(names::SOURCE_POSITION, ParameterKind::Vec3),
        param(names::SOURCE_RADIUS, ParameterKind::Float),
        param(names::SOURCE_VALUE, ParameterKind::Vec4),
    ],
    bindings: &[
        bind(names::INPUT_FIELD, BindingKind::ReadVolume),
        bind(names::FIELD_SAMPLER, BindingKind::Sampler),
        bind(names::OUTPUT_FIELD, BindingKind::WriteVolume),
    ],
};

static RAYMARCH: KernelLayout = KernelLayout {
    stage: KernelStage::Render,
    programs: &["volume/raymarch_vertex.wgsl", "volume/raymarch_fragment.wgsl"],
    parameters: &[
        param(names::WORLD, ParameterKind::Mat4),
        param(names::INVERSE_WORLD, ParameterKind::Mat4),
        param(names::VIEW, ParameterKind::Mat4),
        param(names::PROJECTION, ParameterKind::Mat4),
        param(names::CAMERA_POSITION, ParameterKind::Vec3),
        param(names::SAMPLE_COUNT, ParameterKind::UInt),
        param(names::TINT, ParameterKind::Vec4),
    ],
    bindings: &[
        bind(names::DENSITY_FIELD, BindingKind::ReadVolume),
        bind(names::FIELD_SAMPLER, BindingKind::Sampler),
    ],
};

impl Kernel {
    pub fn layout(self) -> &'static KernelLayout {
        match self {
            Kernel::Advect => &ADVECT,
            Kernel::Divergence => &DIVERGENCE,
            Kernel::PressureSolve => &PRESSURE_SOLVE,
            Kernel::PressureProject => &PRESSURE_PROJECT,
            Kernel::Clear => &CLEAR,
            Kernel::InjectSource => &INJECT_SOURCE,
            Kernel::Raymarch => &RAYMARCH,
        }
    }
}

impl KernelLayout {
    pub fn parameter(&self, name: &str) -> Option<&ParameterDesc> {
        self.parameters.iter().find(|desc| desc.name == name)
    }

    pub fn binding(&self, name: &str) -> Option<&BindingDesc> {
        self.bindings.iter().find(|desc| desc.name == name)
    }

    fn parameter_offsets(&self) -> impl Iterator<Item = (usize, &ParameterDesc)> + '_ {
        let mut offset = 0;
        self.parameters.iter().map(move |desc| {
            let aligned = align_to(offset, desc.kind.alignment());
            offset = aligned + desc.kind.size();
            (aligned, desc)
        })
    }

    /// Size of the parameter block in bytes.
    pub fn parameter_block_size(&self) -> usize {
        let end = self
            .parameter_offsets()
            .last()
            .map_or(0, |(offset, desc)| offset + desc.kind.size());
        align_to(end.max(1), 16)
    }

    /// Packs named values into the parameter block.
    ///
    /// Every parameter of the layout needs a value of matching kind. For names occurring more than once the last value wins.
    pub fn pack_parameters(&self, kernel: Kernel, values: &[(&'static str, ParameterValue)]) -> Result<Vec<u8>, FluidError> {
        if let Some((name, _)) = values.iter().find(|(name, _)| self.parameter(name).is_none()) {
            return Err(FluidError::UnknownParameter { kernel, name: *name });
        }

        let mut block = vec![0u8; self.parameter_block_size()];
        for (offset, desc) in self.parameter_offsets() {
            let value = values
                .iter()
                .rev()
                .find(|(name, _)| *name == desc.name)
                .map(|(_, value)| value)
                .ok_or(FluidError::MissingParameter { kernel, name: desc.name })?;
            if value.kind() != desc.kind {
                return Err(FluidError::ParameterKindMismatch {
                    kernel,
                    name: desc.name,
                    expected: desc.kind,
                    actual: value.kind(),
                });
            }
            block[offset..offset + desc.kind.size()].copy_from_slice(value.bytes());
        }
        Ok(block)
    }
}

fn align_to(offset: usize, alignment: usize) -> usize {
    offset.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn simulation_block_layout() {
        let layout = Kernel::Advect.layout();
        assert_eq!(layout.parameter_block_size(), 16);
        let block = layout
            .pack_parameters(
                Kernel::Advect,
                &[
                    (names::GRID_RESOLUTION, 64u32.into()),
                    (names::DELTA_TIME, 0.5f32.into()),
                    (names::INV_GRID_RESOLUTION, (1.0f32 / 64.0).into()),
                ],
            )
            .unwrap();
        assert_eq!(&block[0..4], &0.5f32.to_ne_bytes());
        assert_eq!(&block[4..8], &(1.0f32 / 64.0).to_ne_bytes());
        assert_eq!(&block[8..12], &64u32.to_ne_bytes());
    }

    #[test]
    fn raymarch_block_layout() {
        let layout = Kernel::Raymarch.layout();
        let offsets: Vec<usize> = layout.parameter_offsets().map(|(offset, _)| offset).collect();
        // vec3 is followed directly by the u32, vec4 realigns to 16
        assert_eq!(offsets, vec![0, 64, 128, 192, 256, 268, 272]);
        assert_eq!(layout.parameter_block_size(), 288);
    }

    #[test]
    fn inject_block_layout() {
        let offsets: Vec<usize> = Kernel::InjectSource.layout().parameter_offsets().map(|(offset, _)| offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 16, 28, 32]);
        assert_eq!(Kernel::Clear.layout().parameter_block_size(), 32);
    }

    #[test]
    fn last_value_wins() {
        let block = Kernel::Clear
            .layout()
            .pack_parameters(
                Kernel::Clear,
                &[
                    (names::CLEAR_VALUE, [1.0; 4].into()),
                    (names::GRID_RESOLUTION, 8u32.into()),
                    (names::CLEAR_VALUE, [2.0; 4].into()),
                ],
            )
            .unwrap();
        assert_eq!(&block[0..4], &2.0f32.to_ne_bytes());
    }

    #[test]
    fn packing_errors() {
        let layout = Kernel::Divergence.layout();
        assert!(matches!(
            layout.pack_parameters(Kernel::Divergence, &[(names::DELTA_TIME, 1.0f32.into())]),
            Err(FluidError::MissingParameter {
                name: names::INV_GRID_RESOLUTION,
                ..
            })
        ));
        assert!(matches!(
            layout.pack_parameters(Kernel::Divergence, &[(names::TINT, [0.0; 4].into())]),
            Err(FluidError::UnknownParameter { name: names::TINT, .. })
        ));
        assert!(matches!(
            layout.pack_parameters(
                Kernel::Divergence,
                &[
                    (names::DELTA_TIME, 1.0f32.into()),
                    (names::INV_GRID_RESOLUTION, 1.0f32.into()),
                    (names::GRID_RESOLUTION, 1.0f32.into()),
                ]
            ),
            Err(FluidError::ParameterKindMismatch {
                expected: ParameterKind::UInt,
                actual: ParameterKind::Float,
                ..
            })
        ));
    }

    #[test]
    fn every_layout_is_consistent() {
        for kernel in Kernel::iter() {
            let layout = kernel.layout();
            let outputs = layout.bindings.iter().filter(|b| b.kind == BindingKind::WriteVolume).count();
            match layout.stage {
                KernelStage::Compute => {
                    assert_eq!(layout.programs.len(), 1, "{}", kernel);
                    assert_eq!(outputs, 1, "{}", kernel);
                }
                KernelStage::Render => {
                    assert_eq!(layout.programs.len(), 2, "{}", kernel);
                    assert_eq!(outputs, 0, "{}", kernel);
                }
            }
            let mut names: Vec<_> = layout.bindings.iter().map(|b| b.name).collect();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), layout.bindings.len(), "{}", kernel);
        }
    }
}
