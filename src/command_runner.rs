use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::RgbaImage;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{
    backend::{decode_png, ImageBackend},
    types::GenerationParams,
};

impl GenerationParams {
    fn to_args(&self, outdir: &Path) -> Vec<String> {
        let mut args = vec![
            "--prompt".to_string(),
            self.prompt.clone(),
            format!("--W={}", self.width),
            format!("--H={}", self.height),
            format!("--steps={}", self.steps),
            format!("--scale={}", self.guidance_scale),
            format!("--n_samples={}", self.image_count),
            format!("--outdir={}", outdir.display()),
        ];
        if let Some(seed) = self.seed {
            args.push(format!("--seed={seed}"));
        }
        args
    }
}

/// Runs a txt2img script once per request and picks up the PNGs it leaves
/// in a scratch directory.
pub(crate) struct CommandRunner {
    program: String,
    program_args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(program: String, program_args: Vec<String>, workdir: Option<PathBuf>) -> Self {
        Self {
            program,
            program_args,
            workdir,
        }
    }

    fn command(&self, params: &GenerationParams, outdir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(workdir) = &self.workdir {
            cmd.current_dir(workdir);
        }
        cmd.args(&self.program_args)
            .args(params.to_args(outdir))
            .kill_on_drop(true);
        cmd
    }

    async fn run_impl(&self, params: &GenerationParams, outdir: &Path) -> Result<Vec<RgbaImage>> {
        tokio::fs::create_dir_all(outdir)
            .await
            .with_context(|| format!("Couldn't create scratch dir {}", outdir.display()))?;
        let mut cmd = self.command(params, outdir);
        debug!("Will run: {cmd:?}");
        let status = cmd
            .status()
            .await
            .with_context(|| format!("Couldn't start {}", self.program))?;
        anyhow::ensure!(status.success(), "Process wasn't successful: {status}");
        read_pngs(outdir).await
    }
}

async fn read_pngs(dir: &Path) -> Result<Vec<RgbaImage>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Couldn't list {}", dir.display()))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        images.push(
            decode_png(path)
                .await
                .with_context(|| format!("Couldn't decode {}", path.display()))?,
        );
    }
    Ok(images)
}

#[async_trait]
impl ImageBackend for CommandRunner {
    fn name(&self) -> &str {
        &self.program
    }

    async fn generate(&self, params: &GenerationParams) -> Result<Vec<RgbaImage>> {
        let outdir = std::env::temp_dir().join(format!("sd-file-queue-{}", uuid::Uuid::new_v4()));
        let result = self.run_impl(params, &outdir).await;
        if let Err(err) = tokio::fs::remove_dir_all(&outdir).await {
            warn!("Couldn't remove scratch dir {}: {err}", outdir.display());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(seed: Option<u64>) -> GenerationParams {
        GenerationParams {
            prompt: "a lighthouse at dusk".to_string(),
            width: 768,
            height: 512,
            steps: 9,
            guidance_scale: 0.0,
            seed,
            image_count: 2,
        }
    }

    #[test]
    fn args_carry_every_parameter() {
        let args = params(Some(42)).to_args(Path::new("/tmp/out"));
        assert_eq!(
            args,
            vec![
                "--prompt",
                "a lighthouse at dusk",
                "--W=768",
                "--H=512",
                "--steps=9",
                "--scale=0",
                "--n_samples=2",
                "--outdir=/tmp/out",
                "--seed=42",
            ]
        );
    }

    #[test]
    fn seed_is_omitted_when_unset() {
        let args = params(None).to_args(Path::new("/tmp/out"));
        assert!(!args.iter().any(|a| a.starts_with("--seed")));
    }

    #[tokio::test]
    async fn reads_only_pngs_in_name_order() {
        let dir = tempfile::tempdir().expect("create temp dir");
        RgbaImage::new(40, 40)
            .save(dir.path().join("b.png"))
            .expect("save");
        RgbaImage::new(50, 50)
            .save(dir.path().join("a.png"))
            .expect("save");
        std::fs::write(dir.path().join("log.txt"), "sampling...").expect("write");

        let images = read_pngs(dir.path()).await.expect("read");
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].dimensions(), (50, 50));
        assert_eq!(images[1].dimensions(), (40, 40));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_is_an_error() {
        let runner = CommandRunner::new("false".to_string(), vec![], None);
        let err = runner.generate(&params(None)).await.unwrap_err();
        assert!(err.to_string().contains("wasn't successful"));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let runner = CommandRunner::new("definitely-not-a-real-sd-script".to_string(), vec![], None);
        let err = runner.generate(&params(None)).await.unwrap_err();
        assert!(err.to_string().contains("Couldn't start"));
    }
}
