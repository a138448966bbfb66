pub mod background;
pub mod codec;
pub mod error;
pub mod logging;
pub mod overlay;
pub mod providers;
pub mod server;
pub mod settings;
pub mod source;

#[cfg(test)]
mod test_util;

pub use error::ImageApiError;
pub use overlay::{FontResolver, OverlayStyle, render_overlay, render_overlay_png};
pub use providers::{GenerationProxy, GenerationRequest, ImageGenerationProvider};
pub use source::{ImageSource, ImageSourceLoader};
