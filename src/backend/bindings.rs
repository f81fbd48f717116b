use super::SamplerKind;
use crate::error::FluidError;
use crate::kernel::{BindingDesc, BindingKind, Kernel, KernelStage, ParameterValue};
use crate::volume::VolumeResource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A parameter block as it was handed to the device.
#[derive(Clone, Debug)]
pub struct UploadedParameters {
    pub kernel: Kernel,
    pub values: Vec<(&'static str, ParameterValue)>,
    pub block: Vec<u8>,
}

impl UploadedParameters {
    pub fn value(&self, name: &'static str) -> Result<ParameterValue, FluidError> {
        self.values
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| *value)
            .ok_or(FluidError::MissingParameter { kernel: self.kernel, name })
    }

    pub fn float(&self, name: &'static str) -> Result<f32, FluidError> {
        match self.value(name)? {
            ParameterValue::Float(v) => Ok(v),
            other => Err(self.mismatch(name, &other)),
        }
    }

    pub fn uint(&self, name: &'static str) -> Result<u32, FluidError> {
        match self.value(name)? {
            ParameterValue::UInt(v) => Ok(v),
            other => Err(self.mismatch(name, &other)),
        }
    }

    pub fn vec3(&self, name: &'static str) -> Result<[f32; 3], FluidError> {
        match self.value(name)? {
            ParameterValue::Vec3(v) => Ok(v),
            other => Err(self.mismatch(name, &other)),
        }
    }

    pub fn vec4(&self, name: &'static str) -> Result<[f32; 4], FluidError> {
        match self.value(name)? {
            ParameterValue::Vec4(v) => Ok(v),
            other => Err(self.mismatch(name, &other)),
        }
    }

    pub fn mat4(&self, name: &'static str) -> Result<[[f32; 4]; 4], FluidError> {
        match self.value(name)? {
            ParameterValue::Mat4(v) => Ok(v),
            other => Err(self.mismatch(name, &other)),
        }
    }

    fn mismatch(&self, name: &'static str, value: &ParameterValue) -> FluidError {
        FluidError::ParameterKindMismatch {
            kernel: self.kernel,
            name,
            expected: self
                .kernel
                .layout()
                .parameter(name)
                .map_or(value.kind(), |desc| desc.kind),
            actual: value.kind(),
        }
    }
}

pub struct BoundVolume<V> {
    pub name: &'static str,
    pub access: Access,
    pub volume: VolumeResource<V>,
}

pub enum ResolvedBinding<'a, V> {
    Read(&'a VolumeResource<V>),
    Write(&'a VolumeResource<V>),
    Sampler(SamplerKind),
}

/// Bindings of the current kernel, validated against its layout and in layout order.
pub struct ResolvedBindings<'a, V> {
    pub kernel: Kernel,
    pub parameters: &'a UploadedParameters,
    pub bindings: Vec<(&'static BindingDesc, ResolvedBinding<'a, V>)>,
}

impl<'a, V> ResolvedBindings<'a, V> {
    pub fn volume(&self, name: &'static str) -> Result<&'a VolumeResource<V>, FluidError> {
        self.bindings
            .iter()
            .find_map(|(desc, binding)| match binding {
                ResolvedBinding::Read(volume) | ResolvedBinding::Write(volume) if desc.name == name => Some(*volume),
                _ => None,
            })
            .ok_or(FluidError::MissingBinding { kernel: self.kernel, name })
    }

    pub fn sampler(&self, name: &'static str) -> Result<SamplerKind, FluidError> {
        self.bindings
            .iter()
            .find_map(|(desc, binding)| match binding {
                ResolvedBinding::Sampler(kind) if desc.name == name => Some(*kind),
                _ => None,
            })
            .ok_or(FluidError::MissingBinding { kernel: self.kernel, name })
    }

    pub fn output(&self) -> Option<&'a VolumeResource<V>> {
        self.bindings.iter().find_map(|(_, binding)| match binding {
            ResolvedBinding::Write(volume) => Some(*volume),
            _ => None,
        })
    }
}

/// Kernel, parameter and resource binding bookkeeping shared by all backends.
///
/// Nothing is validated while binding, only when the kernel runs (see [`BindingState::resolve`]).
pub struct BindingState<V> {
    kernel: Option<Kernel>,
    staged: Vec<(&'static str, ParameterValue)>,
    uploaded: Option<UploadedParameters>,
    volumes: Vec<BoundVolume<V>>,
    samplers: Vec<(&'static str, SamplerKind)>,
}

impl<V> Default for BindingState<V> {
    fn default() -> Self {
        BindingState {
            kernel: None,
            staged: Vec::new(),
            uploaded: None,
            volumes: Vec::new(),
            samplers: Vec::new(),
        }
    }
}

impl<V: Clone> BindingState<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kernel(&self) -> Option<Kernel> {
        self.kernel
    }

    /// Switching to a different kernel drops all staged and uploaded parameters.
    pub fn set_kernel(&mut self, kernel: Kernel) {
        if self.kernel != Some(kernel) {
            self.staged.clear();
            self.uploaded = None;
        }
        self.kernel = Some(kernel);
    }

    pub fn set_parameter(&mut self, name: &'static str, value: ParameterValue) {
        match self.staged.iter_mut().find(|(n, _)| *n == name) {
            Some(staged) => staged.1 = value,
            None => self.staged.push((name, value)),
        }
    }

    /// Packs the staged parameters for the current kernel.
    pub fn upload_parameters(&mut self) -> Result<&UploadedParameters, FluidError> {
        let kernel = self.kernel.ok_or(FluidError::NoKernel)?;
        let block = kernel.layout().pack_parameters(kernel, &self.staged)?;
        Ok(self.uploaded.insert(UploadedParameters {
            kernel,
            values: self.staged.clone(),
            block,
        }))
    }

    pub fn uploaded(&self) -> Option<&UploadedParameters> {
        self.uploaded.as_ref()
    }

    pub fn bind_volume(&mut self, name: &'static str, access: Access, volume: &VolumeResource<V>) {
        self.volumes.retain(|bound| bound.name != name);
        self.volumes.push(BoundVolume {
            name,
            access,
            volume: volume.clone(),
        });
    }

    pub fn bind_sampler(&mut self, name: &'static str, sampler: SamplerKind) {
        self.samplers.retain(|(n, _)| *n != name);
        self.samplers.push((name, sampler));
    }

    pub fn volumes(&self) -> &[BoundVolume<V>] {
        &self.volumes
    }

    pub fn bound_count(&self) -> usize {
        self.volumes.len() + self.samplers.len()
    }

    /// Releases all resource bindings and the uploaded parameter block. Returns how many bindings were released.
    pub fn unbind_all(&mut self) -> usize {
        let released = self.bound_count();
        self.volumes.clear();
        self.samplers.clear();
        self.uploaded = None;
        released
    }

    /// Checks the bound state against the layout of the current kernel.
    ///
    /// Fails if the kernel is of the wrong stage, parameters were not uploaded, a binding is missing or doesn't exist in the layout,
    /// or a volume is bound for reading and writing at the same time.
    pub fn resolve(&self, stage: KernelStage) -> Result<ResolvedBindings<'_, V>, FluidError> {
        let kernel = self.kernel.ok_or(FluidError::NoKernel)?;
        let layout = kernel.layout();
        if layout.stage != stage {
            return Err(FluidError::WrongKernelStage { kernel, requested: stage });
        }
        let parameters = self.uploaded.as_ref().ok_or(FluidError::ParametersNotUploaded(kernel))?;

        for bound in self.volumes.iter() {
            let expected = match bound.access {
                Access::Read => BindingKind::ReadVolume,
                Access::Write => BindingKind::WriteVolume,
            };
            if layout.binding(bound.name).map(|desc| desc.kind) != Some(expected) {
                return Err(FluidError::UnknownBinding { kernel, name: bound.name });
            }
        }
        for (name, _) in self.samplers.iter() {
            if layout.binding(name).map(|desc| desc.kind) != Some(BindingKind::Sampler) {
                return Err(FluidError::UnknownBinding { kernel, name: *name });
            }
        }

        let mut bindings = Vec::with_capacity(layout.bindings.len());
        for desc in layout.bindings.iter() {
            let binding = match desc.kind {
                BindingKind::Sampler => self
                    .samplers
                    .iter()
                    .find(|(name, _)| *name == desc.name)
                    .map(|(_, kind)| ResolvedBinding::Sampler(*kind)),
                BindingKind::ReadVolume => self
                    .volumes
                    .iter()
                    .find(|bound| bound.name == desc.name)
                    .map(|bound| ResolvedBinding::Read(&bound.volume)),
                BindingKind::WriteVolume => self
                    .volumes
                    .iter()
                    .find(|bound| bound.name == desc.name)
                    .map(|bound| ResolvedBinding::Write(&bound.volume)),
            };
            bindings.push((desc, binding.ok_or(FluidError::MissingBinding { kernel, name: desc.name })?));
        }

        for write in self.volumes.iter().filter(|bound| bound.access == Access::Write) {
            if let Some(read) = self
                .volumes
                .iter()
                .find(|bound| bound.access == Access::Read && bound.volume.id() == write.volume.id())
            {
                return Err(FluidError::BindingHazard {
                    kernel,
                    read: read.name,
                    write: write.name,
                });
            }
        }

        Ok(ResolvedBindings {
            kernel,
            parameters,
            bindings,
        })
    }
}
