//! Bundled WGSL programs
//!
//! Both programs share `common.wgsl`: the parameter block, the four texture
//! slots and `shade_ascii`, so the compute and fragment composites produce
//! the same glyphs.

/// The fragment program run by every draw
pub const FRAGMENT_PROGRAM_WGSL: &str = concat!(include_str!("shaders/common.wgsl"), "\n", include_str!("shaders/passes.wgsl"));

/// The compute composite
pub const COMPUTE_PROGRAM_WGSL: &str = concat!(include_str!("shaders/common.wgsl"), "\n", include_str!("shaders/compute.wgsl"));

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source).unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)));
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::empty())
            .validate(&module)
            .unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)));
        module
    }

    fn entry_points(module: &naga::Module) -> Vec<(&str, naga::ShaderStage)> {
        module.entry_points.iter().map(|entry| (entry.name.as_str(), entry.stage)).collect()
    }

    #[test]
    fn test_fragment_program_validates() {
        let module = validate(FRAGMENT_PROGRAM_WGSL);
        let entries = entry_points(&module);
        assert!(entries.contains(&("vs_quad", naga::ShaderStage::Vertex)));
        assert!(entries.contains(&("vs_blit", naga::ShaderStage::Vertex)));
        assert!(entries.contains(&("fs_main", naga::ShaderStage::Fragment)));
    }

    #[test]
    fn test_compute_program_validates() {
        let module = validate(COMPUTE_PROGRAM_WGSL);
        let entry = module.entry_points.iter().find(|entry| entry.name == "cs_render_ascii").unwrap();
        assert_eq!(entry.stage, naga::ShaderStage::Compute);
        assert_eq!(entry.workgroup_size, [8, 8, 1]);
    }

    #[test]
    fn test_params_block_matches_host_layout() {
        let module = validate(FRAGMENT_PROGRAM_WGSL);
        let (_, params) = module.types.iter().find(|(_, ty)| ty.name.as_deref() == Some("Params")).unwrap();
        assert_eq!(params.inner.size(module.to_ctx()), 112);
    }

    #[test]
    fn test_fragment_switch_covers_every_pass() {
        for pass in 0..=9 {
            assert!(FRAGMENT_PROGRAM_WGSL.contains(&format!("case {pass}:")), "missing case {pass}");
        }
    }
}
