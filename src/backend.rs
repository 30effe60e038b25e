use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    path::Path,
};

use anyhow::Result;
use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::types::GenerationParams;

/// The text-to-image model. Loaded once and reused for every round.
#[async_trait]
pub(crate) trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Blocks the round until all `params.image_count` images are ready.
    async fn generate(&self, params: &GenerationParams) -> Result<Vec<RgbaImage>>;
}

/// Loads an image a backend left on disk.
pub(crate) async fn decode_png(path: &Path) -> Result<RgbaImage> {
    let bytes = tokio::fs::read(path).await?;
    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}

/// Paints gradients instead of running a model. Handy for smoke-testing
/// job files and output naming on a machine without a GPU.
pub(crate) struct PlaceholderBackend;

/// Upper bound on the pixel memory of one placeholder request.
const MAX_PLACEHOLDER_BYTES: u64 = 1 << 30;

#[async_trait]
impl ImageBackend for PlaceholderBackend {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn generate(&self, params: &GenerationParams) -> Result<Vec<RgbaImage>> {
        anyhow::ensure!(
            params.width > 0 && params.height > 0,
            "Can't paint a {}x{} image",
            params.width,
            params.height
        );
        let bytes = u64::from(params.width)
            .checked_mul(u64::from(params.height))
            .and_then(|pixels| pixels.checked_mul(4))
            .and_then(|per_image| per_image.checked_mul(u64::from(params.image_count)));
        anyhow::ensure!(
            bytes.is_some_and(|b| b <= MAX_PLACEHOLDER_BYTES),
            "{} placeholder images of {}x{} exceed {MAX_PLACEHOLDER_BYTES} bytes",
            params.image_count,
            params.width,
            params.height
        );
        Ok((0..params.image_count)
            .map(|index| paint(params, index))
            .collect())
    }
}

fn base_color(params: &GenerationParams, index: u32) -> [u8; 3] {
    let mut hasher = DefaultHasher::new();
    params.prompt.hash(&mut hasher);
    params.seed.hash(&mut hasher);
    index.hash(&mut hasher);
    let [r, g, b, ..] = hasher.finish().to_le_bytes();
    [r, g, b]
}

fn paint(params: &GenerationParams, index: u32) -> RgbaImage {
    let [r, g, b] = base_color(params, index);
    let (w, h) = (params.width, params.height);
    let span = (u64::from(w) + u64::from(h)) as f64;
    RgbaImage::from_fn(w, h, |x, y| {
        let shade = 0.4 + 0.6 * (u64::from(x) + u64::from(y)) as f64 / span;
        Rgba([
            (f64::from(r) * shade) as u8,
            (f64::from(g) * shade) as u8,
            (f64::from(b) * shade) as u8,
            255,
        ])
    })
}
