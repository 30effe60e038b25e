use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use crate::{round::RoundRunner, types::RoundSummary};

const PROMPT: &str = "Press Enter to run a round (q to quit): ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperatorCommand {
    Proceed,
    Quit,
}

impl OperatorCommand {
    /// Anything that isn't a quit word counts as "go".
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "q" | "quit" | "exit" => OperatorCommand::Quit,
            _ => OperatorCommand::Proceed,
        }
    }
}

pub(crate) fn print_usage(runner: &RoundRunner) {
    let config = runner.config();
    info!("Backend: {}", runner.backend_name());
    info!(
        "Edit {} with one job per line: `1024x1344 || A cute shiba inu astronaut`",
        config.job_file.display()
    );
    info!("The `WIDTHxHEIGHT ||` part is optional and defaults to 1024x1024");
    info!(
        "Images go to {}/ named timestamp_size_prompt_n.png",
        config.output_dir.display()
    );
    info!("The job file is re-read every time you press Enter; q exits");
}

pub(crate) fn report(summary: &RoundSummary) {
    if summary.is_empty() {
        return;
    }
    info!(
        "Round done: {} jobs, {} images saved in {:.2}s",
        summary.requests,
        summary.saved.len(),
        summary.elapsed.as_secs_f64()
    );
    for failure in &summary.failures {
        error!(
            "  job {} ({:?}) failed: {}",
            failure.index, failure.prompt, failure.error
        );
    }
}

/// Waits for the operator, runs a round, repeats. A failed round is logged
/// and the loop goes back to waiting. Returns how many rounds were started.
pub(crate) async fn run_session<R, W>(runner: &RoundRunner, mut input: R, mut out: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut rounds = 0;
    loop {
        out.write_all(PROMPT.as_bytes()).await?;
        out.flush().await?;

        let mut line = String::new();
        if input.read_line(&mut line).await? == 0 {
            info!("Input closed, exiting");
            break;
        }
        if OperatorCommand::parse(&line) == OperatorCommand::Quit {
            info!("Exiting");
            break;
        }

        rounds += 1;
        match runner.run_round().await {
            Ok(summary) => report(&summary),
            Err(err) => error!("Round aborted: {err}"),
        }
    }
    Ok(rounds)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use image::RgbaImage;

    use super::*;
    use crate::{backend::ImageBackend, config::RunnerConfig, types::GenerationParams};

    #[derive(Clone, Default)]
    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl ImageBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, params: &GenerationParams) -> anyhow::Result<Vec<RgbaImage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(!self.fail, "backend is down");
            Ok(vec![RgbaImage::new(params.width, params.height); params.image_count as usize])
        }
    }

    fn runner(dir: &tempfile::TempDir, backend: &CountingBackend) -> RoundRunner {
        let job_file = dir.path().join("prompts.txt");
        std::fs::write(&job_file, "64x64 || a tiny square\n").expect("write job file");
        let config = RunnerConfig {
            job_file,
            output_dir: dir.path().join("output"),
            images_per_request: 1,
            ..Default::default()
        };
        RoundRunner::new(config, Box::new(backend.clone()))
    }

    #[test]
    fn operator_commands() {
        for quit in ["q", "Q\n", " quit ", "EXIT\r\n"] {
            assert_eq!(OperatorCommand::parse(quit), OperatorCommand::Quit, "{quit:?}");
        }
        for go in ["", "\n", "go", "yes", "qq"] {
            assert_eq!(OperatorCommand::parse(go), OperatorCommand::Proceed, "{go:?}");
        }
    }

    #[tokio::test]
    async fn runs_one_round_per_enter_until_quit() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let backend = CountingBackend::default();
        let runner = runner(&dir, &backend);
        let mut out = Vec::new();

        let rounds = run_session(&runner, &b"\nagain\nq\n\n"[..], &mut out)
            .await
            .unwrap();

        assert_eq!(rounds, 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(String::from_utf8(out).unwrap(), PROMPT.repeat(3));
    }

    #[tokio::test]
    async fn eof_ends_the_session() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let backend = CountingBackend::default();
        let runner = runner(&dir, &backend);

        let rounds = run_session(&runner, &b""[..], Vec::new()).await.unwrap();
        assert_eq!(rounds, 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_round_returns_to_waiting() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let backend = CountingBackend {
            fail: true,
            ..Default::default()
        };
        let runner = runner(&dir, &backend);

        let rounds = run_session(&runner, &b"\n\nexit\n"[..], Vec::new())
            .await
            .unwrap();
        assert_eq!(rounds, 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}
