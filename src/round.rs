use std::{
    io::Cursor,
    path::{Path, PathBuf},
    time::Instant,
};

use chrono::Local;
use image::{ImageError, ImageFormat, RgbaImage};
use tracing::{error, info, warn};

use crate::{
    backend::ImageBackend,
    config::RunnerConfig,
    error::RunnerError,
    job_file::load_requests,
    slug::{slugify, DEFAULT_SLUG_LEN},
    types::{GenerationParams, GenerationRequest, RequestFailure, RoundSummary},
};

/// Second resolution, sorts lexicographically.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<timestamp>_<w>x<h>_<slug>_<n>.png`.
///
/// Only the image index distinguishes files of one request. Two requests
/// with the same size and slug finishing in the same second overwrite each
/// other's files.
pub(crate) fn output_file_name(
    timestamp: &str,
    request: &GenerationRequest,
    image_index: usize,
) -> String {
    format!(
        "{timestamp}_{}x{}_{}_{image_index}.png",
        request.width,
        request.height,
        slugify(&request.prompt, DEFAULT_SLUG_LEN)
    )
}

/// Executes rounds against a backend that stays loaded between them.
pub(crate) struct RoundRunner {
    config: RunnerConfig,
    backend: Box<dyn ImageBackend>,
}

impl RoundRunner {
    pub fn new(config: RunnerConfig, backend: Box<dyn ImageBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// One pass over the job file as it is on disk right now.
    ///
    /// Requests run strictly in file order. Unless `keep_going` is set, the
    /// first failing request aborts the rest of the round.
    pub async fn run_round(&self) -> Result<RoundSummary, RunnerError> {
        let started = Instant::now();
        let requests = load_requests(&self.config.job_file)?;
        if requests.is_empty() {
            warn!(
                "No valid entries in {} (empty file or only comments)",
                self.config.job_file.display()
            );
            return Ok(RoundSummary::default());
        }

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|source| RunnerError::OutputDir {
                path: self.config.output_dir.clone(),
                source,
            })?;

        let total = requests.len();
        info!("{total} jobs this round, generating one by one");
        let mut summary = RoundSummary {
            requests: total,
            ..Default::default()
        };
        for (i, request) in requests.iter().enumerate() {
            let index = i + 1;
            info!("[{index}/{total}] prompt: {}", request.prompt);
            info!("    size: {}x{}", request.width, request.height);
            match self.run_request(index, request).await {
                Ok(saved) => summary.saved.extend(saved),
                Err(err) if self.config.keep_going => {
                    error!("{err}");
                    summary.failures.push(RequestFailure {
                        index,
                        prompt: request.prompt.clone(),
                        error: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    fn params_for(&self, request: &GenerationRequest) -> GenerationParams {
        GenerationParams {
            prompt: request.prompt.clone(),
            width: request.width,
            height: request.height,
            steps: self.config.steps,
            guidance_scale: self.config.guidance_scale,
            seed: self.config.seed,
            image_count: self.config.images_per_request,
        }
    }

    async fn run_request(
        &self,
        index: usize,
        request: &GenerationRequest,
    ) -> Result<Vec<PathBuf>, RunnerError> {
        let params = self.params_for(request);
        let t0 = Instant::now();
        let images = self
            .backend
            .generate(&params)
            .await
            .map_err(|source| RunnerError::Backend {
                index,
                prompt: request.prompt.clone(),
                source,
            })?;
        let elapsed = t0.elapsed();
        if images.len() != params.image_count as usize {
            return Err(RunnerError::ImageCount {
                index,
                expected: params.image_count,
                got: images.len(),
            });
        }

        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let mut saved = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let path = self
                .config
                .output_dir
                .join(output_file_name(&timestamp, request, i + 1));
            save_png(image, &path).await?;
            info!("  -> saved to {}", path.display());
            saved.push(path);
        }
        info!("Took {:.2}s", elapsed.as_secs_f64());
        Ok(saved)
    }
}

async fn save_png(image: &RgbaImage, path: &Path) -> Result<(), RunnerError> {
    let write_err = |source: ImageError| RunnerError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut encoded = Cursor::new(Vec::new());
    image
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(write_err)?;
    tokio::fs::write(path, encoded.into_inner())
        .await
        .map_err(|err| write_err(ImageError::IoError(err)))
}
