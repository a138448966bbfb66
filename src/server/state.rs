use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::background;
use crate::overlay::FontResolver;
use crate::providers::{GenerationProxy, ImageGenerationProvider};
use crate::settings::Settings;
use crate::source::ImageSourceLoader;

/// Read-only state shared by every request.
pub struct ServerState {
    pub(crate) settings: Settings,
    pub(crate) loader: ImageSourceLoader,
    pub(crate) fonts: FontResolver,
    pub(crate) default_background: Vec<u8>,
    pub(crate) generator: GenerationProxy,
}

impl ServerState {
    /// Resolves the default font from the configured candidates.
    pub fn new(settings: Settings, provider: Arc<dyn ImageGenerationProvider>) -> Result<Self> {
        let fonts =
            FontResolver::from_candidates(&settings.font_candidates, &settings.font_families);
        Self::with_fonts(settings, provider, fonts)
    }

    pub fn with_fonts(
        settings: Settings,
        provider: Arc<dyn ImageGenerationProvider>,
        fonts: FontResolver,
    ) -> Result<Self> {
        let loader = ImageSourceLoader::new(Duration::from_secs(settings.fetch_timeout_secs))?;
        let default_background =
            background::load_default_background(settings.default_background.as_deref())?;
        Ok(Self {
            loader,
            fonts,
            default_background,
            generator: GenerationProxy::new(provider),
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn default_background(&self) -> &[u8] {
        &self.default_background
    }
}
