use std::{fs, io, path::Path};

use tracing::warn;

use crate::{
    error::RunnerError,
    size::parse_size,
    types::{GenerationRequest, SizeSpec},
};

const COMMENT: char = '#';
const SIZE_DELIMITER: &str = "||";

/// Reads the job file from scratch and returns its requests in line order.
///
/// A missing file is an empty round, not an error.
pub(crate) fn load_requests(path: &Path) -> Result<Vec<GenerationRequest>, RunnerError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!("Job file does not exist: {}", path.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(RunnerError::JobFile {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(parse_requests(&contents))
}

/// Accepts `\n`, `\r\n` and bare `\r` line endings. The empty piece between
/// `\r` and `\n` is skipped like any blank line.
pub(crate) fn parse_requests(contents: &str) -> Vec<GenerationRequest> {
    contents
        .split(['\r', '\n'])
        .filter_map(parse_line)
        .collect()
}

/// `[WIDTHxHEIGHT ||] PROMPT`. Comments, blanks and empty prompts yield nothing.
fn parse_line(line: &str) -> Option<GenerationRequest> {
    let raw = line.trim();
    if raw.is_empty() || raw.starts_with(COMMENT) {
        return None;
    }
    let (size, prompt) = match raw.split_once(SIZE_DELIMITER) {
        Some((size_part, prompt_part)) => (parse_size(size_part), prompt_part.trim()),
        None => (SizeSpec::Default, raw),
    };
    if prompt.is_empty() {
        return None;
    }
    let (width, height) = size.dimensions();
    Some(GenerationRequest {
        prompt: prompt.to_string(),
        width,
        height,
    })
}
