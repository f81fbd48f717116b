use crate::error::FluidError;
use notify::Watcher;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// All entry points need to have this name.
// (could make customizable, but forcing this has perks as well)
pub const SHADER_ENTRY_POINT_NAME: &str = "main";

/// `$NAME` tokens in shader code that get replaced before compilation.
pub type ShaderDefines = Vec<(&'static str, String)>;

fn load_wgsl_and_resolve_includes(path: &Path) -> Result<String, FluidError> {
    lazy_static! {
        static ref INCLUDE_REGEX: Regex = Regex::new(r#"^\s*#\s*include\s+[<"](?P<file>.*)[>"]"#).unwrap();
    }

    let wgsl_code = std::fs::read_to_string(path).map_err(|err| FluidError::Shader {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let directory = path.parent().unwrap_or_else(|| Path::new("."));

    let mut expanded_code = Vec::new();
    for (line_number, line) in wgsl_code.lines().enumerate() {
        match INCLUDE_REGEX.captures(line).and_then(|captures| captures.name("file")) {
            Some(included_file) => {
                let included_code = load_wgsl_and_resolve_includes(&directory.join(included_file.as_str())).map_err(|err| FluidError::Shader {
                    path: path.to_path_buf(),
                    message: format!("failed to process include in line {}: {}", line_number + 1, err),
                })?;
                expanded_code.push(included_code);
            }
            None => expanded_code.push(line.to_string()),
        }
    }

    Ok(expanded_code.join("\n"))
}

fn apply_defines(path: &Path, code: &str, defines: &ShaderDefines) -> Result<String, FluidError> {
    lazy_static! {
        static ref DEFINE_REGEX: Regex = Regex::new(r"\$(?P<name>[A-Z_][A-Z0-9_]*)").unwrap();
    }

    let mut undefined = Vec::new();
    let code = DEFINE_REGEX.replace_all(code, |captures: &Captures| {
        let name = &captures["name"];
        match defines.iter().find(|(define, _)| *define == name) {
            Some((_, value)) => value.clone(),
            None => {
                undefined.push(name.to_owned());
                String::new()
            }
        }
    });
    if !undefined.is_empty() {
        return Err(FluidError::Shader {
            path: path.to_path_buf(),
            message: format!("undefined shader defines {:?}", undefined),
        });
    }
    Ok(code.into_owned())
}

pub struct ShaderDirectory {
    #[allow(dead_code)]
    watcher: notify::RecommendedWatcher,
    detected_change: Arc<AtomicBool>,
    directory: PathBuf,
}

impl ShaderDirectory {
    pub fn new(path: &Path) -> Result<ShaderDirectory, FluidError> {
        let detected_change = Arc::new(AtomicBool::new(false));
        let detected_change_evt_ref = detected_change.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(_) => detected_change_evt_ref.store(true, Ordering::Relaxed),
            Err(e) => error!("shader directory watch error: {:?}", e),
        })?;
        watcher.watch(path, notify::RecursiveMode::Recursive)?;

        Ok(ShaderDirectory {
            watcher,
            detected_change,
            directory: PathBuf::from(path),
        })
    }

    // Checks if any change was detected in the shader directory.
    // Right now notifies any changes in the directory, if too slow consider filtering & distinguishing shaders.
    pub fn detected_change(&self) -> bool {
        self.detected_change.swap(false, Ordering::Relaxed)
    }

    pub fn load_source(&self, relative_filename: &Path, defines: &ShaderDefines) -> Result<String, FluidError> {
        let path = self.directory.join(relative_filename);
        let code = load_wgsl_and_resolve_includes(&path)?;
        apply_defines(&path, &code, defines)
    }

    pub fn load_shader_module(&self, device: &wgpu::Device, relative_filename: &Path, defines: &ShaderDefines) -> Result<wgpu::ShaderModule, FluidError> {
        let code = self.load_source(relative_filename, defines)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("ShaderModule: {:?}", relative_filename)),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(code)),
        });
        match futures::executor::block_on(device.pop_error_scope()) {
            None => Ok(module),
            Some(err) => Err(FluidError::Shader {
                path: self.directory.join(relative_filename),
                message: err.to_string(),
            }),
        }
    }
}
