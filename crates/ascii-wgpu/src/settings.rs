//! Stylization and edge-detection parameters
//!
//! Parameters reach the shaders as named uniforms. Defaults reproduce the
//! reference look; a YAML file may override any subset of them.

use serde::Deserialize;

use crate::device::{ProgramId, RenderDevice, Uniform};
use crate::error::{DeviceError, SettingsError};

/// Parameters of the composite pass
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompositeParams {
    /// Minimum number of agreeing pixels in a tile before an edge glyph is drawn
    pub edge_threshold: i32,
    pub edges: bool,
    pub fill: bool,
    pub exposure: f32,
    pub attenuation: f32,
    pub invert_luminance: bool,
    pub ascii_color: [f32; 3],
    pub background_color: [f32; 3],
    /// 0 draws pure glyph colors, 1 shows the downscaled source
    pub blend_with_base: f32,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            edge_threshold: 8,
            edges: true,
            fill: true,
            exposure: 1.0,
            attenuation: 1.0,
            invert_luminance: false,
            ascii_color: [1.0, 1.0, 1.0],
            background_color: [0.0, 0.0, 0.0],
            blend_with_base: 0.0,
        }
    }
}

impl CompositeParams {
    /// Assigns every composite parameter on `program`
    pub fn apply<D: RenderDevice>(&self, device: &mut D, program: ProgramId) -> Result<(), DeviceError> {
        device.set_uniform(program, "edge_threshold", Uniform::Int(self.edge_threshold))?;
        device.set_uniform(program, "edges", Uniform::Bool(self.edges))?;
        device.set_uniform(program, "fill", Uniform::Bool(self.fill))?;
        device.set_uniform(program, "exposure", Uniform::Float(self.exposure))?;
        device.set_uniform(program, "attenuation", Uniform::Float(self.attenuation))?;
        device.set_uniform(program, "invert_luminance", Uniform::Bool(self.invert_luminance))?;
        device.set_uniform(program, "ascii_color", Uniform::Vec3(self.ascii_color))?;
        device.set_uniform(program, "background_color", Uniform::Vec3(self.background_color))?;
        device.set_uniform(program, "blend_with_base", Uniform::Float(self.blend_with_base))?;
        Ok(())
    }
}

/// Parameters of the blur, difference-of-Gaussians and edge passes
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EdgeParams {
    /// Blur radius in downscaled texels
    pub kernel_size: i32,
    pub sigma: f32,
    /// Ratio between the wide and the narrow Gaussian
    pub sigma_scale: f32,
    pub tau: f32,
    pub threshold: f32,
    pub use_normals: bool,
    pub normal_threshold: f32,
    pub depth_threshold: f32,
    /// Magnification of the source about its center
    pub zoom: f32,
    /// Pan of the source view, in UV units
    pub offset: [f32; 2],
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            kernel_size: 2,
            sigma: 2.0,
            sigma_scale: 1.6,
            tau: 1.0,
            threshold: 0.005,
            use_normals: true,
            normal_threshold: 0.1,
            depth_threshold: 0.1,
            zoom: 1.0,
            offset: [0.0, 0.0],
        }
    }
}

impl EdgeParams {
    pub fn apply<D: RenderDevice>(&self, device: &mut D, program: ProgramId) -> Result<(), DeviceError> {
        device.set_uniform(program, "kernel_size", Uniform::Int(self.kernel_size))?;
        device.set_uniform(program, "sigma", Uniform::Float(self.sigma))?;
        device.set_uniform(program, "sigma_scale", Uniform::Float(self.sigma_scale))?;
        device.set_uniform(program, "tau", Uniform::Float(self.tau))?;
        device.set_uniform(program, "threshold", Uniform::Float(self.threshold))?;
        device.set_uniform(program, "use_normals", Uniform::Bool(self.use_normals))?;
        device.set_uniform(program, "normal_threshold", Uniform::Float(self.normal_threshold))?;
        device.set_uniform(program, "depth_threshold", Uniform::Float(self.depth_threshold))?;
        device.set_uniform(program, "zoom", Uniform::Float(self.zoom))?;
        device.set_uniform(program, "offset", Uniform::Vec2(self.offset))?;
        Ok(())
    }
}

/// Complete parameter set of a renderer
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSettings {
    pub composite: CompositeParams,
    pub edges: EdgeParams,
}

impl RenderSettings {
    /// Parses settings from YAML; absent fields keep their defaults
    pub fn from_yaml(yaml_content: &str) -> Result<Self, serde_norway::Error> {
        serde_norway::from_str(yaml_content)
    }

    /// Loads settings from a YAML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ProgramKind;
    use crate::device::recording::RecordingDevice;

    #[test]
    fn test_composite_defaults() {
        let params = CompositeParams::default();
        assert_eq!(params.edge_threshold, 8);
        assert!(params.edges);
        assert!(params.fill);
        assert_eq!(params.exposure, 1.0);
        assert_eq!(params.attenuation, 1.0);
        assert!(!params.invert_luminance);
        assert_eq!(params.ascii_color, [1.0, 1.0, 1.0]);
        assert_eq!(params.background_color, [0.0, 0.0, 0.0]);
        assert_eq!(params.blend_with_base, 0.0);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
composite:
  exposure: 1.5
  background_color: [0.1, 0.2, 0.3]
edges:
  sigma: 3.0
  offset: [0.25, 0.0]
"#;
        let settings = RenderSettings::from_yaml(yaml).unwrap();
        assert_eq!(settings.composite.exposure, 1.5);
        assert_eq!(settings.composite.background_color, [0.1, 0.2, 0.3]);
        assert_eq!(settings.composite.edge_threshold, 8);
        assert_eq!(settings.edges.sigma, 3.0);
        assert_eq!(settings.edges.kernel_size, 2);
        assert_eq!(settings.edges.offset, [0.25, 0.0]);
        assert_eq!(settings.edges.zoom, 1.0);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(RenderSettings::from_yaml("{}").unwrap(), RenderSettings::default());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(RenderSettings::from_yaml("composite:\n  exposur: 2.0\n").is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let error = RenderSettings::from_file(dir.path().join("settings.yaml")).unwrap_err();
        assert!(matches!(error, SettingsError::Io(_)));
    }

    #[test]
    fn test_apply_sets_named_parameters() {
        let mut device = RecordingDevice::new();
        let program = device.add_program(ProgramKind::Fragment);

        CompositeParams::default().apply(&mut device, program).unwrap();
        EdgeParams::default().apply(&mut device, program).unwrap();

        assert_eq!(device.uniform(program, "edge_threshold"), Some(Uniform::Int(8)));
        assert_eq!(device.uniform(program, "ascii_color"), Some(Uniform::Vec3([1.0, 1.0, 1.0])));
        assert_eq!(device.uniform(program, "sigma_scale"), Some(Uniform::Float(1.6)));
        assert_eq!(device.uniform(program, "use_normals"), Some(Uniform::Bool(true)));
        assert_eq!(device.uniform(program, "zoom"), Some(Uniform::Float(1.0)));
        assert_eq!(device.uniform(program, "offset"), Some(Uniform::Vec2([0.0, 0.0])));
    }
}
