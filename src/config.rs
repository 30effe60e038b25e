use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    backend::{ImageBackend, PlaceholderBackend},
    command_runner::CommandRunner,
    http_backend::HttpBackend,
};

const DEFAULT_JOB_FILE: &str = "prompts.txt";
const DEFAULT_OUTPUT_DIR: &str = "output";
/// Recommended step count for turbo-distilled models.
const DEFAULT_STEPS: u32 = 9;
/// Turbo models must run without classifier-free guidance.
const DEFAULT_GUIDANCE_SCALE: f32 = 0.0;
const DEFAULT_IMAGES_PER_REQUEST: u32 = 3;

#[derive(Parser, Debug)]
#[command(name = "sd-file-queue", version, about = "Generate images from a hand-edited job file")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    #[command(flatten)]
    pub runner: RunnerConfig,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Wait for Enter, run a round, repeat until `q` (default).
    Run,
    /// Run a single round and exit.
    Once,
    /// Parse the job file and list what would be generated.
    Check,
}

/// Per-round settings handed to the round runner.
#[derive(Args, Debug, Clone, PartialEq)]
pub(crate) struct RunnerConfig {
    /// Job file, one `[WIDTHxHEIGHT ||] PROMPT` per line.
    #[arg(long, env = "JOB_FILE", default_value = DEFAULT_JOB_FILE)]
    pub job_file: PathBuf,

    /// Directory generated images are written to.
    #[arg(long, env = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    #[arg(long, env = "SD_STEPS", default_value_t = DEFAULT_STEPS)]
    pub steps: u32,

    #[arg(long, env = "SD_GUIDANCE_SCALE", default_value_t = DEFAULT_GUIDANCE_SCALE)]
    pub guidance_scale: f32,

    /// Fixed seed for reproducible comparisons. Random when unset.
    #[arg(long, env = "SD_SEED")]
    pub seed: Option<u64>,

    #[arg(
        long,
        env = "SD_IMAGES_PER_REQUEST",
        default_value_t = DEFAULT_IMAGES_PER_REQUEST,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub images_per_request: u32,

    /// Record failing requests and carry on instead of aborting the round.
    #[arg(long, env = "SD_KEEP_GOING")]
    pub keep_going: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            job_file: PathBuf::from(DEFAULT_JOB_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            steps: DEFAULT_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: None,
            images_per_request: DEFAULT_IMAGES_PER_REQUEST,
            keep_going: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum BackendChoice {
    /// Shell out to a txt2img script.
    Command,
    /// POST to a generation service.
    Http,
    /// Synthetic gradients, no model.
    Placeholder,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct BackendArgs {
    #[arg(long, value_enum, env = "SD_BACKEND", default_value_t = BackendChoice::Command)]
    pub backend: BackendChoice,

    /// Program run by the command backend, e.g. `python`.
    #[arg(long, env = "SD_PROGRAM")]
    pub program: Option<String>,

    /// Leading argument for the program (repeatable), e.g. the script path.
    #[arg(long = "program-arg", allow_hyphen_values = true)]
    pub program_args: Vec<String>,

    /// Working directory for the program.
    #[arg(long, env = "SD_WORKDIR")]
    pub workdir: Option<PathBuf>,

    #[arg(long, env = "SD_URL", default_value = "http://127.0.0.1:5000/generate")]
    pub url: String,

    #[arg(long, env = "SD_TIMEOUT_SECS", default_value_t = 600)]
    pub timeout_secs: u64,
}

impl BackendArgs {
    pub fn build(&self) -> Result<Box<dyn ImageBackend>> {
        Ok(match self.backend {
            BackendChoice::Command => {
                let Some(program) = self.program.clone() else {
                    anyhow::bail!("--program (or SD_PROGRAM) is required for the command backend");
                };
                Box::new(CommandRunner::new(
                    program,
                    self.program_args.clone(),
                    self.workdir.clone(),
                ))
            }
            BackendChoice::Http => Box::new(HttpBackend::new(
                self.url.clone(),
                Duration::from_secs(self.timeout_secs),
            )?),
            BackendChoice::Placeholder => Box::new(PlaceholderBackend),
        })
    }
}
