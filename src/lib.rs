pub mod config;
pub mod credentials;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod state;
pub mod utils;

pub use credentials::{ApiKey, CredentialError, CredentialStore};
pub use llm::{GenerationRequest, ImageData, ImageProvider, ProviderError, ProviderSpec};
pub use orchestrator::{
    EditResult, GenerationOrchestrator, GenerationResult, GenerationStatus, RetryPolicy,
};
pub use prompt::{build, render, PromptTemplate, SceneParameters};
pub use state::{Studio, StudioError};
