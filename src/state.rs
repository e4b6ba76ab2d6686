use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::config::OUTPUT_FILENAME;
use crate::llm::{GenerationRequest, ImageData, MediaError};
use crate::orchestrator::{EditResult, GenerationOrchestrator, GenerationResult, GenerationStatus};
use crate::prompt::{PromptTemplate, SceneParameters};
use crate::utils::timing::RequestTimer;

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("A generation request is already in flight")]
    Busy,
    #[error("No image is selected")]
    NoSelection,
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn status_label(status: &GenerationStatus) -> (&'static str, Option<String>) {
    match status {
        GenerationStatus::Generated { provider, model } => {
            ("success", Some(format!("{provider}:{model}")))
        }
        GenerationStatus::Degraded { reason, .. } => ("degraded", Some(reason.clone())),
    }
}

/// One user's working session: at most one request in flight, and the most
/// recent result set with its selection.
pub struct Studio {
    orchestrator: Arc<GenerationOrchestrator>,
    template: PromptTemplate,
    max_quantity: u32,
    in_flight: AtomicBool,
    latest: Mutex<Option<GenerationResult>>,
}

impl Studio {
    pub fn new(
        orchestrator: Arc<GenerationOrchestrator>,
        template: PromptTemplate,
        max_quantity: u32,
    ) -> Self {
        Studio {
            orchestrator,
            template,
            max_quantity: max_quantity.max(1),
            in_flight: AtomicBool::new(false),
            latest: Mutex::new(None),
        }
    }

    fn begin(&self) -> Result<InFlightGuard<'_>, StudioError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StudioError::Busy)?;
        Ok(InFlightGuard(&self.in_flight))
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Builds the prompt, runs the provider chain and replaces the previous
    /// result set.
    pub async fn generate(&self, params: &SceneParameters) -> Result<GenerationResult, StudioError> {
        let _guard = self.begin()?;
        let request = GenerationRequest::from_scene(&self.template, params, self.max_quantity);
        let mut timer = RequestTimer::start(
            "generate",
            Some(format!(
                "movie={} ratio={} quantity={} reference={}",
                params.movie_name_or_default(),
                request.aspect_ratio(),
                request.quantity(),
                request.reference_image().is_some()
            )),
        );

        let result = self.orchestrator.generate(&request).await;
        let (status, detail) = status_label(result.status());
        timer.complete(status, detail);

        *self.latest.lock() = Some(result.clone());
        Ok(result)
    }

    /// Edits the currently selected image in place. The slot selected when
    /// the edit starts receives the result, even if the selection moves.
    pub async fn edit_selected(&self, instruction: &str) -> Result<EditResult, StudioError> {
        let _guard = self.begin()?;
        let (index, selected) = self
            .latest
            .lock()
            .as_ref()
            .and_then(|result| {
                let index = result.selected_index();
                result.selected().cloned().map(|image| (index, image))
            })
            .ok_or(StudioError::NoSelection)?;

        let mut timer = RequestTimer::start("edit", Some(instruction.to_string()));
        let edited = self.orchestrator.edit(&selected, instruction).await;
        let (status, detail) = status_label(&edited.status);
        timer.complete(status, detail);

        if let Some(result) = self.latest.lock().as_mut() {
            result.replace_at(index, edited.image.clone());
        }
        Ok(edited)
    }

    pub fn latest(&self) -> Option<GenerationResult> {
        self.latest.lock().clone()
    }

    pub fn select(&self, index: usize) -> bool {
        self.latest
            .lock()
            .as_mut()
            .map(|result| result.select(index))
            .unwrap_or(false)
    }

    pub fn selected(&self) -> Option<ImageData> {
        self.latest
            .lock()
            .as_ref()
            .and_then(|result| result.selected().cloned())
    }

    pub fn reset(&self) {
        *self.latest.lock() = None;
    }

    /// Writes the selected image as `hollywood-cut.jpg` inside `dir`.
    pub fn save_selected(&self, dir: &Path) -> Result<PathBuf, StudioError> {
        let image = self.selected().ok_or(StudioError::NoSelection)?;
        let path = dir.join(OUTPUT_FILENAME);
        save_jpeg(&image, &path)?;
        Ok(path)
    }

    /// Writes the selected image under the fixed name and every other image
    /// as `hollywood-cut-<n>.jpg`, numbered from 1 by position.
    pub fn save_all(&self, dir: &Path) -> Result<Vec<PathBuf>, StudioError> {
        let Some(result) = self.latest() else {
            return Err(StudioError::NoSelection);
        };
        if result.is_empty() {
            return Err(StudioError::NoSelection);
        }

        let stem = OUTPUT_FILENAME.trim_end_matches(".jpg");
        let mut paths = Vec::with_capacity(result.len());
        for (index, image) in result.images().iter().enumerate() {
            let path = if index == result.selected_index() {
                dir.join(OUTPUT_FILENAME)
            } else {
                dir.join(format!("{stem}-{}.jpg", index + 1))
            };
            save_jpeg(image, &path)?;
            paths.push(path);
        }
        Ok(paths)
    }
}

pub fn save_jpeg(image: &ImageData, path: &Path) -> Result<(), StudioError> {
    let io_error = |source| StudioError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
    }
    let bytes = image.to_jpeg_bytes()?;
    fs::write(path, bytes).map_err(io_error)?;
    info!("Saved image to {}", path.display());
    Ok(())
}
