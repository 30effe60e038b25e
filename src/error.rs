use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum RunnerError {
    #[error("couldn't read job file {}: {source}", path.display())]
    JobFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("backend failed on request {index} ({prompt:?}): {source:#}")]
    Backend {
        index: usize,
        prompt: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("backend returned {got} images for request {index}, expected {expected}")]
    ImageCount {
        index: usize,
        expected: u32,
        got: usize,
    },

    #[error("couldn't save {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
