//! Cheap, local pre-check that an upload is plausibly an architecture
//! diagram before spending an LLM call on it.
//!
//! Nothing about "is this really an architecture diagram" can be
//! answered without a model call, so this resolves the narrower,
//! decidable question: is the upload a real, non-degenerate image at
//! all? A minimum byte size, a decodable container, and non-degenerate
//! pixel dimensions are enough to reject the common junk uploads (empty
//! files, truncated images, 1x1 placeholders) without paying for vision.

use async_trait::async_trait;

use crate::config::PipelineConfig;

#[async_trait]
pub trait DiagramGuardrail: Send + Sync {
    /// Returns `Ok(())` if the image passes, `Err(reason)` otherwise.
    async fn check(&self, image_bytes: &[u8]) -> Result<(), String>;
}

pub struct HeuristicGuardrail {
    min_bytes: u64,
    min_width: u32,
    min_height: u32,
}

impl HeuristicGuardrail {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_bytes: config.guardrail_min_bytes,
            min_width: config.guardrail_min_width,
            min_height: config.guardrail_min_height,
        }
    }
}

#[async_trait]
impl DiagramGuardrail for HeuristicGuardrail {
    async fn check(&self, image_bytes: &[u8]) -> Result<(), String> {
        if (image_bytes.len() as u64) < self.min_bytes {
            return Err(format!(
                "image is only {} bytes, below the {}-byte minimum",
                image_bytes.len(),
                self.min_bytes
            ));
        }

        let format = image::guess_format(image_bytes)
            .map_err(|_| "image bytes are not a recognizable image container".to_string())?;

        let dimensions = image::load_from_memory_with_format(image_bytes, format)
            .map_err(|e| format!("image container could not be decoded: {e}"))?;

        if dimensions.width() < self.min_width || dimensions.height() < self.min_height {
            return Err(format!(
                "image is {}x{}, below the {}x{} minimum",
                dimensions.width(),
                dimensions.height(),
                self.min_width,
                self.min_height
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig {
            job_timeout_secs: 600,
            guardrail_min_bytes: 100,
            guardrail_min_width: 10,
            guardrail_min_height: 10,
        }
    }

    fn tiny_png() -> Vec<u8> {
        // 16x16 solid-color PNG, well above the default guardrail floors.
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([255, 0, 0]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn accepts_a_real_image_above_thresholds() {
        let guardrail = HeuristicGuardrail::new(&config());
        assert!(guardrail.check(&tiny_png()).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_too_few_bytes() {
        let guardrail = HeuristicGuardrail::new(&config());
        assert!(guardrail.check(&[0u8; 10]).await.is_err());
    }

    #[tokio::test]
    async fn rejects_undecodable_bytes() {
        let guardrail = HeuristicGuardrail::new(&config());
        let junk = vec![0xFFu8; 200];
        assert!(guardrail.check(&junk).await.is_err());
    }
}
