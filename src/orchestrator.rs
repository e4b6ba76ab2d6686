use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::config::ProviderConfig;
use crate::llm::{GenerationRequest, ImageData, ImageProvider, ProviderError};
use crate::prompt::{self, DEFAULT_DEPTH_OF_FIELD};
use crate::utils::http::build_http_client;
use crate::utils::timing::log_provider_timing;

const POSTER_ASPECT_RATIO: &str = "16:9";

/// Fixed attempt budget per provider. No backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts_per_provider: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_per_provider: 1,
            retry_delay: Duration::from_millis(900),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub provider: String,
    pub model: String,
    pub attempt: u32,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (attempt {}): {}",
            self.provider, self.model, self.attempt, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStatus {
    Generated { provider: String, model: String },
    /// Every provider failed; the payload echoes the caller's input.
    Degraded {
        reason: String,
        failures: Vec<AttemptFailure>,
    },
}

impl GenerationStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, GenerationStatus::Degraded { .. })
    }
}

/// Images from one request plus the index currently selected for display.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    images: Vec<ImageData>,
    selected: usize,
    status: GenerationStatus,
}

impl GenerationResult {
    pub fn new(images: Vec<ImageData>, status: GenerationStatus) -> Self {
        Self {
            images,
            selected: 0,
            status,
        }
    }

    pub fn images(&self) -> &[ImageData] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn status(&self) -> &GenerationStatus {
        &self.status
    }

    pub fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&ImageData> {
        self.images.get(self.selected)
    }

    /// Moves the selection; out-of-range indices are rejected.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.images.len() {
            self.selected = index;
            true
        } else {
            false
        }
    }

    pub(crate) fn replace_at(&mut self, index: usize, image: ImageData) -> bool {
        match self.images.get_mut(index) {
            Some(slot) => {
                *slot = image;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EditResult {
    pub image: ImageData,
    pub status: GenerationStatus,
}

struct ChainSuccess<T> {
    value: T,
    provider: String,
    model: String,
}

/// Runs generation and edit requests against ordered provider chains and
/// converts total failure into degraded results instead of errors.
pub struct GenerationOrchestrator {
    generators: Vec<Arc<dyn ImageProvider>>,
    editors: Vec<Arc<dyn ImageProvider>>,
    poster: Option<Arc<dyn ImageProvider>>,
    policy: RetryPolicy,
}

impl GenerationOrchestrator {
    pub fn new(
        generators: Vec<Arc<dyn ImageProvider>>,
        editors: Vec<Arc<dyn ImageProvider>>,
        poster: Option<Arc<dyn ImageProvider>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            generators,
            editors,
            poster,
            policy,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config.request_timeout)?;
        let build = |spec: &crate::llm::ProviderSpec| {
            spec.build(&config.api_key, &config.base_url, client.clone())
        };
        Ok(Self::new(
            config.generation.iter().map(build).collect(),
            config.edit.iter().map(build).collect(),
            config.poster.as_ref().map(build),
            config.policy,
        ))
    }

    async fn run_chain<T, F, Fut>(
        &self,
        providers: &[Arc<dyn ImageProvider>],
        operation: &str,
        mut call: F,
    ) -> Result<ChainSuccess<T>, Vec<AttemptFailure>>
    where
        F: FnMut(Arc<dyn ImageProvider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.policy.attempts_per_provider.max(1);
        let mut failures = Vec::new();

        for provider in providers {
            for attempt in 1..=attempts {
                if attempt > 1 && !self.policy.retry_delay.is_zero() {
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                let metadata = json!({ "attempt": attempt, "attempts": attempts });
                let result = log_provider_timing(
                    provider.name(),
                    provider.model(),
                    operation,
                    Some(metadata),
                    || call(Arc::clone(provider)),
                )
                .await;
                match result {
                    Ok(value) => {
                        return Ok(ChainSuccess {
                            value,
                            provider: provider.name().to_string(),
                            model: provider.model().to_string(),
                        })
                    }
                    Err(err) => {
                        warn!(
                            provider = provider.name(),
                            model = provider.model(),
                            attempt,
                            "{} attempt failed: {}",
                            operation,
                            err
                        );
                        failures.push(AttemptFailure {
                            provider: provider.name().to_string(),
                            model: provider.model().to_string(),
                            attempt,
                            message: err.to_string(),
                        });
                    }
                }
            }
        }

        Err(failures)
    }

    /// Generates images for `request`. Never fails: when every provider
    /// fails the result echoes the reference image (or is empty) and carries
    /// a degraded status.
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let outcome = self
            .run_chain(&self.generators, "generate_images", |provider| async move {
                provider.generate_images(request).await
            })
            .await;

        match outcome {
            Ok(success) => {
                let mut images = success.value;
                let wanted = request.quantity() as usize;
                if images.len() < wanted {
                    info!(
                        "{} returned {} of {} requested image(s)",
                        success.model,
                        images.len(),
                        wanted
                    );
                }
                images.truncate(wanted);
                GenerationResult::new(
                    images,
                    GenerationStatus::Generated {
                        provider: success.provider,
                        model: success.model,
                    },
                )
            }
            Err(failures) => {
                let reason = degraded_reason("generation", &failures);
                error!("{}", reason);
                let echo = request.reference_image().cloned().into_iter().collect();
                GenerationResult::new(echo, GenerationStatus::Degraded { reason, failures })
            }
        }
    }

    /// Best-effort edit. On failure the original image comes back unchanged.
    pub async fn edit(&self, image: &ImageData, instruction: &str) -> EditResult {
        if instruction.trim().is_empty() {
            return EditResult {
                image: image.clone(),
                status: GenerationStatus::Degraded {
                    reason: "Edit instruction is empty".to_string(),
                    failures: Vec::new(),
                },
            };
        }

        let outcome = self
            .run_chain(&self.editors, "edit_image", |provider| async move {
                provider.edit_image(image, instruction).await
            })
            .await;

        match outcome {
            Ok(success) => EditResult {
                image: success.value,
                status: GenerationStatus::Generated {
                    provider: success.provider,
                    model: success.model,
                },
            },
            Err(failures) => {
                let reason = degraded_reason("edit", &failures);
                error!("{}", reason);
                EditResult {
                    image: image.clone(),
                    status: GenerationStatus::Degraded { reason, failures },
                }
            }
        }
    }

    /// Stylised poster art for the backdrop, or `None` if unavailable.
    pub async fn poster_backdrop(&self, movie_name: &str) -> Option<ImageData> {
        let provider = self.poster.as_ref()?;
        let request = GenerationRequest::new(
            prompt::poster_prompt(movie_name),
            None,
            1,
            POSTER_ASPECT_RATIO,
            DEFAULT_DEPTH_OF_FIELD,
        );
        let request = &request;
        let outcome = self
            .run_chain(
                std::slice::from_ref(provider),
                "poster_backdrop",
                |provider| async move { provider.generate_images(request).await },
            )
            .await;

        match outcome {
            Ok(success) => success.value.into_iter().next(),
            Err(failures) => {
                warn!("{}", degraded_reason("poster backdrop", &failures));
                None
            }
        }
    }
}

fn degraded_reason(operation: &str, failures: &[AttemptFailure]) -> String {
    if failures.is_empty() {
        return format!("No providers configured for {operation}");
    }
    let detail = failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "All {} {} attempt(s) failed: {}",
        failures.len(),
        operation,
        detail
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Clone)]
    pub(crate) enum Step {
        Images(Vec<ImageData>),
        Fail,
    }

    /// In-memory provider replaying a fixed script of outcomes.
    pub(crate) struct ScriptedProvider {
        name: String,
        model: String,
        script: Mutex<VecDeque<Step>>,
        delay: Duration,
        pub(crate) calls: AtomicUsize,
        pub(crate) prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(model: &str, script: Vec<Step>) -> Arc<Self> {
            Self::with_delay(model, script, Duration::ZERO)
        }

        /// Same as `new`, but every call sleeps for `delay` first.
        pub(crate) fn with_delay(model: &str, script: Vec<Step>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name: "scripted".to_string(),
                model: model.to_string(),
                script: Mutex::new(script.into()),
                delay,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        async fn next(&self) -> Result<Vec<ImageData>, ProviderError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().pop_front();
            match step {
                Some(Step::Images(images)) => Ok(images),
                Some(Step::Fail) | None => Err(ProviderError::Status {
                    provider: self.name.clone(),
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    message: format!("{} unavailable", self.model),
                }),
            }
        }
    }

    #[async_trait]
    impl ImageProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn model(&self) -> &str {
            &self.model
        }

        async fn generate_images(
            &self,
            request: &GenerationRequest,
        ) -> Result<Vec<ImageData>, ProviderError> {
            self.prompts.lock().push(request.prompt().to_string());
            self.next().await
        }

        async fn edit_image(
            &self,
            _image: &ImageData,
            instruction: &str,
        ) -> Result<ImageData, ProviderError> {
            self.prompts.lock().push(instruction.to_string());
            let images = self.next().await?;
            images.into_iter().next().ok_or(ProviderError::NoImages {
                provider: self.name.clone(),
                model: self.model.clone(),
            })
        }
    }

    pub(crate) fn img(tag: u8) -> ImageData {
        ImageData::new(vec![0xFF, 0xD8, tag], "image/jpeg")
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts_per_provider: attempts,
            retry_delay: Duration::ZERO,
        }
    }

    fn orchestrator(
        providers: &[&Arc<ScriptedProvider>],
        attempts: u32,
    ) -> GenerationOrchestrator {
        let chain: Vec<Arc<dyn ImageProvider>> = providers
            .iter()
            .map(|p| Arc::clone(*p) as Arc<dyn ImageProvider>)
            .collect();
        GenerationOrchestrator::new(chain.clone(), chain, None, policy(attempts))
    }

    fn request(reference: Option<ImageData>, quantity: u32) -> GenerationRequest {
        GenerationRequest::new("set photo", reference, quantity, "16:9", "f/4")
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = ScriptedProvider::new("primary", vec![Step::Images(vec![img(1)])]);
        let fallback = ScriptedProvider::new("fallback", vec![Step::Images(vec![img(2)])]);
        let result = orchestrator(&[&primary, &fallback], 1)
            .generate(&request(None, 1))
            .await;

        assert_eq!(result.images(), &[img(1)]);
        assert_eq!(
            result.status(),
            &GenerationStatus::Generated {
                provider: "scripted".to_string(),
                model: "primary".to_string()
            }
        );
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_primary_falls_back_once_with_same_request() {
        let primary = ScriptedProvider::new("primary", vec![Step::Fail]);
        let fallback =
            ScriptedProvider::new("fallback", vec![Step::Images(vec![img(2), img(3)])]);
        let result = orchestrator(&[&primary, &fallback], 1)
            .generate(&request(Some(img(9)), 2))
            .await;

        assert_eq!(result.images(), &[img(2), img(3)]);
        assert!(!result.is_degraded());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*primary.prompts.lock(), *fallback.prompts.lock());
    }

    #[tokio::test]
    async fn total_failure_echoes_reference_image() {
        let primary = ScriptedProvider::new("primary", vec![Step::Fail]);
        let fallback = ScriptedProvider::new("fallback", vec![Step::Fail]);
        let reference = img(42);
        let result = orchestrator(&[&primary, &fallback], 1)
            .generate(&request(Some(reference.clone()), 3))
            .await;

        assert_eq!(result.images(), &[reference]);
        match result.status() {
            GenerationStatus::Degraded { failures, .. } => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].model, "primary");
                assert_eq!(failures[1].model, "fallback");
            }
            other => panic!("expected degraded status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn total_failure_without_reference_is_empty() {
        let primary = ScriptedProvider::new("primary", vec![Step::Fail]);
        let fallback = ScriptedProvider::new("fallback", vec![Step::Fail]);
        let result = orchestrator(&[&primary, &fallback], 1)
            .generate(&request(None, 1))
            .await;

        assert!(result.is_empty());
        assert!(result.is_degraded());
        assert!(result.selected().is_none());
    }

    #[tokio::test]
    async fn fewer_images_are_returned_as_received() {
        let primary = ScriptedProvider::new("primary", vec![Step::Images(vec![img(1)])]);
        let result = orchestrator(&[&primary], 1)
            .generate(&request(None, 4))
            .await;
        assert_eq!(result.len(), 1);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn extra_images_are_trimmed_to_quantity() {
        let primary = ScriptedProvider::new(
            "primary",
            vec![Step::Images(vec![img(1), img(2), img(3)])],
        );
        let result = orchestrator(&[&primary], 1)
            .generate(&request(None, 2))
            .await;
        assert_eq!(result.images(), &[img(1), img(2)]);
    }

    #[tokio::test]
    async fn attempts_per_provider_are_bounded() {
        let primary = ScriptedProvider::new(
            "primary",
            vec![Step::Fail, Step::Images(vec![img(5)])],
        );
        let fallback = ScriptedProvider::new("fallback", vec![]);
        let result = orchestrator(&[&primary, &fallback], 2)
            .generate(&request(None, 1))
            .await;
        assert_eq!(result.images(), &[img(5)]);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);

        let always_down = ScriptedProvider::new("down", vec![]);
        let result = orchestrator(&[&always_down], 3)
            .generate(&request(None, 1))
            .await;
        assert!(result.is_degraded());
        assert_eq!(always_down.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_chain_degrades() {
        let orchestrator = GenerationOrchestrator::new(Vec::new(), Vec::new(), None, policy(1));
        let result = orchestrator.generate(&request(Some(img(1)), 1)).await;
        assert_eq!(result.images(), &[img(1)]);
        assert!(result.is_degraded());
        assert!(orchestrator.poster_backdrop("Alien").await.is_none());
    }

    #[tokio::test]
    async fn edit_returns_provider_image() {
        let editor = ScriptedProvider::new("editor", vec![Step::Images(vec![img(7)])]);
        let result = orchestrator(&[&editor], 1).edit(&img(1), "add rain").await;
        assert_eq!(result.image, img(7));
        assert!(!result.status.is_degraded());
        assert_eq!(*editor.prompts.lock(), vec!["add rain".to_string()]);
    }

    #[tokio::test]
    async fn failed_edit_echoes_original() {
        let editor = ScriptedProvider::new("editor", vec![Step::Fail]);
        let original = img(1);
        let result = orchestrator(&[&editor], 1).edit(&original, "add rain").await;
        assert_eq!(result.image, original);
        assert!(result.status.is_degraded());

        let result = orchestrator(&[&editor], 1).edit(&original, "   ").await;
        assert_eq!(result.image, original);
        assert!(result.status.is_degraded());
        assert_eq!(editor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poster_backdrop_uses_poster_prompt() {
        let poster = ScriptedProvider::new("poster", vec![Step::Images(vec![img(3)])]);
        let orchestrator = GenerationOrchestrator::new(
            Vec::new(),
            Vec::new(),
            Some(Arc::clone(&poster) as Arc<dyn ImageProvider>),
            policy(1),
        );
        assert_eq!(orchestrator.poster_backdrop("Alien").await, Some(img(3)));
        assert!(poster.prompts.lock()[0].contains("\"Alien\""));
        assert!(orchestrator.poster_backdrop("Alien").await.is_none());
    }

    #[test]
    fn selection_stays_in_bounds() {
        let mut result = GenerationResult::new(
            vec![img(1), img(2)],
            GenerationStatus::Generated {
                provider: "p".to_string(),
                model: "m".to_string(),
            },
        );
        assert_eq!(result.selected(), Some(&img(1)));
        assert!(result.select(1));
        assert_eq!(result.selected(), Some(&img(2)));
        assert!(!result.select(2));
        assert_eq!(result.selected_index(), 1);
    }
}
