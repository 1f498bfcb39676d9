//! Telegram delivery of CSV exports via the Bot API `sendDocument` method

use repcheck_common::config::TelegramConfig;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Failed to read export: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram rejected the upload (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramClient {
    /// `None` unless both a bot token and a chat id are configured
    pub fn from_config(config: &TelegramConfig) -> Option<Self> {
        let token = config.token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let chat_id = config.chat_id.as_deref().map(str::trim).filter(|c| !c.is_empty())?;

        Some(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    /// Upload `path` as a document to the configured chat
    pub async fn send_document(&self, path: &Path) -> Result<(), TelegramError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export.csv".to_string());

        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("document", Part::bytes(bytes).file_name(file_name.clone()));

        let url = format!("{}/bot{}/sendDocument", self.api_base, self.token);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelegramError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(file = %file_name, chat_id = %self.chat_id, "Export sent to Telegram");
        Ok(())
    }
}
