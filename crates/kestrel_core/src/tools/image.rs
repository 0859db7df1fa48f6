//! Image generation adapter.
//!
//! Builds a GET against the configured image endpoint and saves the response
//! bytes as a timestamped PNG. The produced file path is reported in the
//! status string only; nothing else flows back to the orchestrator.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::info;

use crate::config::ImageConfig;

const IMAGE_TIMEOUT_SECS: u64 = 120;
const IMAGE_MODEL: &str = "flux";

pub struct ImageGenerator {
    config: ImageConfig,
    client: reqwest::Client,
}

impl ImageGenerator {
    pub fn new(config: ImageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(IMAGE_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    fn build_url(&self, prompt: &str) -> String {
        format!(
            "{}/{}?width={}&height={}&model={}&nologo=true",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(prompt),
            self.config.width,
            self.config.height,
            IMAGE_MODEL
        )
    }

    /// Generate an image for `prompt` and save it under the output dir.
    pub async fn run(&self, prompt: &str) -> Result<String> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            bail!("empty prompt");
        }

        let url = self.build_url(prompt);
        info!("Requesting image: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("image request failed")?;

        if !response.status().is_success() {
            bail!("image endpoint returned HTTP {}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("failed to read image bytes")?;

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .context("failed to create image directory")?;

        let path = self
            .config
            .output_dir
            .join(format!("image-{}.png", Utc::now().format("%Y%m%d-%H%M%S")));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to save image to {}", path.display()))?;

        Ok(format!(
            "Image generated successfully and saved to {}.",
            path.display()
        ))
    }
}
