//! Presentation surfaces: the model viewer and audio player the dispatcher
//! hands decoded objects to.

use tracing::info;

use crate::dispatch::Artifact;
use crate::error::Result;
use crate::exports::Export;

pub trait PresentationSurface: Send {
    /// Open a mesh or material in the 3D preview
    fn load_model(&mut self, export: &Export) -> Result<()>;

    /// Swap the material under the cursor in the 3D preview
    fn overwrite_material(&mut self, export: &Export) -> Result<()>;

    /// Queue a sound for playback
    fn play_audio(&mut self, artifact: &Artifact) -> Result<()>;
}

/// Surface for non-interactive use; every call only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSurface;

impl PresentationSurface for HeadlessSurface {
    fn load_model(&mut self, export: &Export) -> Result<()> {
        info!(class = %export.class, name = %export.name, "Model preview requested");
        Ok(())
    }

    fn overwrite_material(&mut self, export: &Export) -> Result<()> {
        info!(name = %export.name, "Material overwrite requested");
        Ok(())
    }

    fn play_audio(&mut self, artifact: &Artifact) -> Result<()> {
        info!(name = %artifact.name, format = %artifact.format, "Audio playback requested");
        Ok(())
    }
}
