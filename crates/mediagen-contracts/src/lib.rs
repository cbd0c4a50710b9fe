pub mod artifacts;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod jobs;
pub mod providers;
pub mod request;

pub use artifacts::{data_url, parse_data_url, validate_artifact_url, ArtifactRef};
pub use credentials::{CredentialProvider, EnvCredentials, StaticCredentials};
pub use errors::{ErrorKind, GenerationError};
pub use events::{EventPayload, EventWriter, GenerationEvent};
pub use jobs::{
    GenerationStatus, JobHandle, PollPolicy, PollResult, PollState, ProviderResult, Status,
};
pub use providers::{NamedProvider, ProviderId, ProviderRegistry, ProviderSelection, ProviderSelector};
pub use request::{GenerationRequest, MediaKind, SourceImage, VideoMode};
