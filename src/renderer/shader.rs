use std::path::Path;

use naga::back::spv;
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::renderer::backend::ShaderStage;
use crate::renderer::error::RenderError;

/// Reads shader source text from disk.
///
/// I/O failures are logged and collapse into an empty string; callers decide whether an empty
/// source is fatal.
pub fn read_source(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            log::error!("Failed to read shader source {:?}: {}", path, e);
            String::new()
        }
    }
}

/// Compiles GLSL source into a SPIR-V word stream.
pub fn compile_glsl(
    source: &str,
    stage: ShaderStage,
    label: &str,
) -> Result<Vec<u32>, RenderError> {
    if source.trim().is_empty() {
        return Err(RenderError::EmptyShaderSource {
            label: label.to_owned(),
        });
    }

    let compilation_error = |message: String| RenderError::ShaderCompilation {
        label: label.to_owned(),
        stage,
        message,
    };

    // Parse the GLSL into IR
    let mut frontend = Frontend::default();
    let module = frontend
        .parse(&Options::from(naga_stage(stage)), source)
        .map_err(|e| compilation_error(e.to_string()))?;

    // Validate the IR
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let module_info = validator
        .validate(&module)
        .map_err(|e| compilation_error(e.to_string()))?;

    // Generate the SPIR-V binary
    let spirv = spv::write_vec(&module, &module_info, &spv::Options::default(), None)
        .map_err(|e| compilation_error(e.to_string()))?;

    log::debug!("Compiled {:?} shader '{}' ({} words)", stage, label, spirv.len());

    Ok(spirv)
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE_VERT: &str = include_str!("../../shaders/triangle.vert");
    const TRIANGLE_FRAG: &str = include_str!("../../shaders/triangle.frag");

    #[test]
    fn compiles_bundled_triangle_shaders() {
        let vert = compile_glsl(TRIANGLE_VERT, ShaderStage::Vertex, "triangle.vert").unwrap();
        let frag = compile_glsl(TRIANGLE_FRAG, ShaderStage::Fragment, "triangle.frag").unwrap();

        // SPIR-V magic number
        assert_eq!(vert[0], 0x0723_0203);
        assert_eq!(frag[0], 0x0723_0203);
    }

    #[test]
    fn empty_and_blank_sources_are_rejected() {
        for source in ["", "   \n\t  "] {
            let err = compile_glsl(source, ShaderStage::Vertex, "blank").unwrap_err();
            assert_eq!(
                err,
                RenderError::EmptyShaderSource {
                    label: "blank".to_owned()
                }
            );
        }
    }

    #[test]
    fn malformed_source_reports_stage_and_label() {
        let err = compile_glsl(
            "#version 450\nvoid main( {",
            ShaderStage::Fragment,
            "broken.frag",
        )
        .unwrap_err();

        match err {
            RenderError::ShaderCompilation { label, stage, .. } => {
                assert_eq!(label, "broken.frag");
                assert_eq!(stage, ShaderStage::Fragment);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_file_reads_as_empty() {
        assert!(read_source("shaders/does-not-exist.vert").is_empty());
    }

    #[test]
    fn bundled_file_reads_from_disk() {
        let source = read_source(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/triangle.frag"));
        assert_eq!(source, TRIANGLE_FRAG);
    }
}
