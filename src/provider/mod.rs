//! 生成式 AI 提供方抽象：黑盒 `generate(prompt) -> text`，错误带瞬时/永久分类。
//!
//! # Provider Module
//!
//! The mediation layer treats the model as a black box. Anything that can turn
//! a prompt into text implements [`Provider`]; errors carry an
//! [`ErrorClass`] so the retry layer can tell transient from permanent
//! failures without knowing the transport.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Provider`] | The outbound call |
//! | [`ProviderError`] | Classified provider failure |
//! | [`GeminiProvider`] | Google Gemini `generateContent` over HTTPS |

mod classification;
mod gemini;

pub use classification::{class_from_status, ErrorClass};
pub use gemini::{GeminiConfig, GeminiProvider};

use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Model identifier reported in result metadata.
    fn model(&self) -> &str;
}

#[derive(Debug, Clone, Error)]
#[error("{class}: {message}")]
pub struct ProviderError {
    pub class: ErrorClass,
    pub message: String,
    /// HTTP status when the failure came from an HTTP response.
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            status: None,
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            class: class_from_status(status),
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Timeout, message)
    }

    pub fn is_transient(&self) -> bool {
        self.class.is_transient()
    }
}
