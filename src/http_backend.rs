use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::{
    backend::{decode_png, ImageBackend},
    types::GenerationParams,
};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    num_inference_steps: u32,
    guidance_scale: f32,
    seed: Option<u64>,
    num_images: u32,
}

impl<'a> From<&'a GenerationParams> for GenerateRequest<'a> {
    fn from(params: &'a GenerationParams) -> Self {
        Self {
            prompt: &params.prompt,
            width: params.width,
            height: params.height,
            num_inference_steps: params.steps,
            guidance_scale: params.guidance_scale,
            seed: params.seed,
            num_images: params.image_count,
        }
    }
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    status: String,
    #[serde(default)]
    output_paths: Vec<String>,
    error: Option<String>,
}

/// Talks to a generation service that keeps the model resident and writes
/// its images to disk, answering with their paths.
pub(crate) struct HttpBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpBackend {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Couldn't build HTTP client")?;
        Ok(Self { client, url })
    }
}

async fn into_images(response: GenerateResponse) -> Result<Vec<RgbaImage>> {
    match response.status.as_str() {
        "success" => {
            let mut images = Vec::with_capacity(response.output_paths.len());
            for path in &response.output_paths {
                images.push(
                    decode_png(Path::new(path))
                        .await
                        .with_context(|| format!("Couldn't load generated image {path}"))?,
                );
            }
            Ok(images)
        }
        "error" => anyhow::bail!(
            "Service error: {}",
            response.error.as_deref().unwrap_or("Unknown error")
        ),
        other => anyhow::bail!("Unexpected status: {other}"),
    }
}

#[async_trait]
impl ImageBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.url
    }

    async fn generate(&self, params: &GenerationParams) -> Result<Vec<RgbaImage>> {
        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest::from(params))
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {status}: {body}");
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse response")?;
        into_images(body).await
    }
}
