pub mod tickers;
pub mod validate;

use crate::import::tickers::extract_candidates;
use crate::import::validate::{validate_candidates, TickerValidator, ValidationOptions, ValidationReport};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Turns an image into text.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportOutcome {
    pub text: String,
    pub candidates: Vec<String>,
    pub report: ValidationReport,
}

/// Image → OCR text → ticker candidates → validated tickers.
#[derive(Clone)]
pub struct ImportPipeline {
    ocr: Arc<dyn OcrEngine>,
    validator: Arc<dyn TickerValidator>,
    options: ValidationOptions,
}

impl ImportPipeline {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        validator: Arc<dyn TickerValidator>,
        options: ValidationOptions,
    ) -> Self {
        Self {
            ocr,
            validator,
            options,
        }
    }

    pub async fn run(&self, image: Vec<u8>, content_type: &str) -> anyhow::Result<ImportOutcome> {
        anyhow::ensure!(!image.is_empty(), "image is empty");
        let bytes = image.len();
        let text = self
            .ocr
            .recognize(image, content_type)
            .await
            .context("OCR failed")?;
        tracing::info!(bytes, chars = text.len(), "OCR finished");
        Ok(self.run_text(text).await)
    }

    /// Same as [`run`](Self::run) for text that has already been recognised.
    pub async fn run_text(&self, text: String) -> ImportOutcome {
        let candidates = extract_candidates(&text);
        tracing::debug!(?candidates, "ticker candidates");
        let report = validate_candidates(self.validator.as_ref(), &candidates, &self.options).await;
        ImportOutcome {
            text,
            candidates,
            report,
        }
    }
}
