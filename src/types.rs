use std::{path::PathBuf, time::Duration};

/// Dimensions used when a job line has no size token or an unusable one.
pub(crate) const DEFAULT_WIDTH: u32 = 1024;
pub(crate) const DEFAULT_HEIGHT: u32 = 1024;
/// Both dimensions of an explicit size must be strictly greater than this.
pub(crate) const MIN_DIMENSION: u32 = 30;

/// One line of work from the job file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GenerationRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

/// Result of parsing a size token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SizeSpec {
    Explicit { width: u32, height: u32 },
    Default,
}

impl SizeSpec {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            SizeSpec::Explicit { width, height } => (width, height),
            SizeSpec::Default => (DEFAULT_WIDTH, DEFAULT_HEIGHT),
        }
    }
}

/// Everything the backend needs for a single request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GenerationParams {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f32,
    pub seed: Option<u64>,
    pub image_count: u32,
}

#[derive(Debug)]
pub(crate) struct RequestFailure {
    pub index: usize,
    pub prompt: String,
    pub error: String,
}

#[must_use]
#[derive(Debug, Default)]
pub(crate) struct RoundSummary {
    pub requests: usize,
    pub saved: Vec<PathBuf>,
    pub failures: Vec<RequestFailure>,
    pub elapsed: Duration,
}

impl RoundSummary {
    pub fn is_empty(&self) -> bool {
        self.requests == 0
    }
}
