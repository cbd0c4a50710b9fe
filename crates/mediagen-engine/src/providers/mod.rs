mod bhindi;
mod imagen;
mod luma;
mod openai;
mod placeholder;
mod runway;
mod stability;
mod veo;

pub use bhindi::BhindiProvider;
pub use imagen::ImagenProvider;
pub use luma::LumaProvider;
pub use openai::OpenAiProvider;
pub use placeholder::{
    PlaceholderImageProvider, PlaceholderVideoProvider, PLACEHOLDER_READY_AFTER,
    PLACEHOLDER_READY_DELAY, PLACEHOLDER_VIDEO_URL,
};
pub use runway::RunwayProvider;
pub use stability::StabilityProvider;
pub use veo::VeoProvider;
