use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL, GeminiClient};
use crate::database::create_database;
use crate::message::{DEFAULT_MESSAGE_TIMEOUT, MessageProvider};
use crate::session::DrawSession;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub report_path: String,
    pub api_key: Option<String>,
    pub text_model: String,
    pub image_model: String,
    pub message_timeout: Duration,
}

pub fn load() -> Result<Config> {
    let database_url =
        env::var("LUXEDRAW_DB_PATH").unwrap_or_else(|_| "data/luxedraw.db".to_string());
    let report_path = env::var("LUXEDRAW_REPORT_PATH").unwrap_or_else(|_| "reports".to_string());
    let api_key = env::var("GEMINI_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty());
    let text_model =
        env::var("LUXEDRAW_TEXT_MODEL").unwrap_or_else(|_| DEFAULT_TEXT_MODEL.to_string());
    let image_model =
        env::var("LUXEDRAW_IMAGE_MODEL").unwrap_or_else(|_| DEFAULT_IMAGE_MODEL.to_string());
    let message_timeout = match env::var("LUXEDRAW_MESSAGE_TIMEOUT_MS") {
        Ok(ms) => Duration::from_millis(ms.trim().parse()?),
        Err(_) => DEFAULT_MESSAGE_TIMEOUT,
    };

    Ok(Config {
        database_url,
        report_path,
        api_key,
        text_model,
        image_model,
        message_timeout,
    })
}

impl Config {
    pub fn gemini_client(&self) -> Option<Arc<GeminiClient>> {
        self.api_key.as_ref().map(|key| {
            Arc::new(
                GeminiClient::new(key.clone()).with_models(&self.text_model, &self.image_model),
            )
        })
    }

    pub fn message_provider(&self, client: Option<Arc<GeminiClient>>) -> MessageProvider {
        match client {
            Some(client) => MessageProvider::new(client, self.message_timeout),
            None => MessageProvider::predefined_only(),
        }
    }

    /// Opens the store and restores the session, wiring in the AI services when a key is set.
    pub fn open_session(&self) -> Result<DrawSession> {
        let conn = create_database(&self.database_url)?;
        let client = self.gemini_client();
        let session = DrawSession::load(conn, self.message_provider(client.clone()));
        Ok(match client {
            Some(client) => session.with_image_generator(client),
            None => session,
        })
    }
}
