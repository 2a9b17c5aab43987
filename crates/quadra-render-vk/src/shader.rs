// SPDX-License-Identifier: CEPL-1.0
use std::borrow::Cow;
use std::fmt;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use ash::vk;
use thiserror::Error;

use crate::error::{ApiContext, RenderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn file_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "quad.vert.spv",
            ShaderStage::Fragment => "quad.frag.spv",
        }
    }

    pub(crate) fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to read shader {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{stage} shader is not valid SPIR-V: {source}")]
    InvalidSpirv {
        stage: ShaderStage,
        #[source]
        source: io::Error,
    },
}

/// Where compiled SPIR-V comes from. The bytes are opaque until
/// [`decode_spirv`] checks them.
pub trait ShaderSource {
    fn bytecode(&self, stage: ShaderStage) -> Result<Cow<'_, [u8]>, ShaderError>;

    fn describe(&self) -> String;

    fn vertex(&self) -> Result<Cow<'_, [u8]>, ShaderError> {
        self.bytecode(ShaderStage::Vertex)
    }

    fn fragment(&self) -> Result<Cow<'_, [u8]>, ShaderError> {
        self.bytecode(ShaderStage::Fragment)
    }
}

/// Shaders compiled by the build script and linked into the binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedShaders;

static VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv"));
static FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/quad.frag.spv"));

impl ShaderSource for EmbeddedShaders {
    fn bytecode(&self, stage: ShaderStage) -> Result<Cow<'_, [u8]>, ShaderError> {
        Ok(Cow::Borrowed(match stage {
            ShaderStage::Vertex => VERT_SPV,
            ShaderStage::Fragment => FRAG_SPV,
        }))
    }

    fn describe(&self) -> String {
        "embedded".into()
    }
}

/// `quad.vert.spv` / `quad.frag.spv` loaded from a directory on every build
/// of the pipeline, so edited shaders are picked up on the next rebuild.
#[derive(Clone, Debug)]
pub struct ShaderDir {
    root: PathBuf,
}

impl ShaderDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, stage: ShaderStage) -> PathBuf {
        self.root.join(stage.file_name())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ShaderSource for ShaderDir {
    fn bytecode(&self, stage: ShaderStage) -> Result<Cow<'_, [u8]>, ShaderError> {
        let path = self.path(stage);
        std::fs::read(&path)
            .map(Cow::Owned)
            .map_err(|source| ShaderError::Io { path, source })
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

pub fn source_for(dir: Option<&Path>) -> Box<dyn ShaderSource> {
    match dir {
        Some(dir) => Box::new(ShaderDir::new(dir)),
        None => Box::new(EmbeddedShaders),
    }
}

/// Checks length and magic number and returns the words in host order.
pub fn decode_spirv(stage: ShaderStage, bytes: &[u8]) -> Result<Vec<u32>, ShaderError> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|source| ShaderError::InvalidSpirv { stage, source })
}

/// Lives only for the duration of pipeline creation.
pub(crate) struct ShaderModule {
    device: ash::Device,
    handle: vk::ShaderModule,
    stage: ShaderStage,
}

impl ShaderModule {
    pub(crate) fn load(
        device: &ash::Device,
        source: &dyn ShaderSource,
        stage: ShaderStage,
    ) -> RenderResult<Self> {
        let bytes = source.bytecode(stage)?;
        let words = decode_spirv(stage, &bytes)?;
        let ci = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: words.len() * 4,
            p_code: words.as_ptr(),
            ..Default::default()
        };
        let handle = unsafe { device.create_shader_module(&ci, None) }
            .api("create_shader_module")?;
        Ok(Self {
            device: device.clone(),
            handle,
            stage,
        })
    }

    pub(crate) fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: self.stage.flags(),
            module: self.handle,
            p_name: c"main".as_ptr(),
            ..Default::default()
        }
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn embedded_shaders_are_spirv() {
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            let bytes = EmbeddedShaders.bytecode(stage).unwrap();
            let words = decode_spirv(stage, &bytes).unwrap();
            assert_eq!(words[0], SPIRV_MAGIC);
        }
    }

    #[test]
    fn garbage_is_rejected() {
        let err = decode_spirv(ShaderStage::Fragment, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            ShaderError::InvalidSpirv {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert!(decode_spirv(ShaderStage::Vertex, &[0; 8]).is_err());
    }

    #[test]
    fn byte_swapped_spirv_is_accepted() {
        let mut bytes = SPIRV_MAGIC.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0, 1, 0, 0]);
        let words = decode_spirv(ShaderStage::Vertex, &bytes).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn shader_dir_reads_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let vert = EmbeddedShaders.vertex().unwrap();
        std::fs::write(dir.path().join("quad.vert.spv"), &vert).unwrap();

        let src = ShaderDir::new(dir.path());
        assert_eq!(src.vertex().unwrap().as_ref(), vert.as_ref());
    }

    #[test]
    fn shader_dir_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let src = ShaderDir::new(dir.path());
        let err = src.fragment().unwrap_err();
        match &err {
            ShaderError::Io { path, .. } => assert_eq!(path, &dir.path().join("quad.frag.spv")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("quad.frag.spv"));
    }

    #[test]
    fn source_selection() {
        assert_eq!(source_for(None).describe(), "embedded");
        assert_eq!(source_for(Some(Path::new("/opt/quadra"))).describe(), "/opt/quadra");
    }
}
