//! Congratulatory messages for winners.
//!
//! `Predefined` mode picks one of a handful of festive templates. `Ai` mode asks
//! a [`TextGenerator`] for a fresh line and falls back to a template on any
//! failure, so a winner always gets a non-empty message.

use async_trait::async_trait;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::warn;

use crate::error::ApiError;
use crate::types::MessageMode;

pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(8);

pub const FALLBACK_TEMPLATES: &[&str] = &[
    "Congratulations on winning the {prize}! Lucky number {number} opens the new year with great fortune and success in everything!",
    "Spring luck comes knocking! The {prize} goes to number {number}. May your home overflow with prosperity and peace!",
    "Smooth sailing with number {number}! Congratulations to the owner of the {prize}, may the new year bring wealth and joy!",
    "Number {number} carries a winning wish! Enjoy the {prize}, and may good health and happiness follow you all year!",
    "Galloping to success with the {prize}! Number {number} marks the start of a brilliant and accomplished 2026!",
    "Ten thousand blessings for the new year! The {prize} calls number {number}. May your fortune flow like a river!",
    "Lucky number {number} brings home the {prize}! Wishing you and your family peace, prosperity and a long happy life!",
];

/// Picks a template at random and fills in the prize name and number.
pub fn fallback_message<R: Rng + ?Sized>(prize_name: &str, number: &str, rng: &mut R) -> String {
    let template = FALLBACK_TEMPLATES
        .choose(rng)
        .copied()
        .unwrap_or(FALLBACK_TEMPLATES[0]);
    template
        .replace("{prize}", prize_name)
        .replace("{number}", number)
}

pub fn winner_prompt(prize_name: &str, number: &str) -> String {
    format!(
        "You are an exuberant host of a Lunar New Year Eve lucky draw for the Year of the Horse 2026. \
         Write a warm, festive congratulation for the guest who just won \"{}\" with the number {}. \
         Requirements:\n\
         - Festive, lively and heartfelt tone.\n\
         - At most two sentences.\n\
         - Wish them a prosperous and successful new year.",
        prize_name, number
    )
}

/// External text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, ApiError>;
}

#[derive(Clone)]
pub struct MessageProvider {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl MessageProvider {
    /// Provider without a text service; `Ai` mode degrades to templates.
    pub fn predefined_only() -> Self {
        Self {
            generator: None,
            timeout: DEFAULT_MESSAGE_TIMEOUT,
        }
    }

    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            generator: Some(generator),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Produces a message for the winner. Never fails.
    pub async fn generate(&self, mode: MessageMode, prize_name: &str, number: &str) -> String {
        if mode == MessageMode::Ai {
            match self.generate_ai(prize_name, number).await {
                Ok(text) => return text,
                Err(e) => warn!(
                    "Message generation failed for {} / {}, using fallback: {}",
                    prize_name, number, e
                ),
            }
        }
        fallback_message(prize_name, number, &mut rand::rng())
    }

    /// Starts producing a message without waiting for it.
    ///
    /// `Predefined` messages are ready immediately; `Ai` requests run on a
    /// spawned task so a slow service never holds up the caller.
    pub fn request<R: Rng + ?Sized>(
        &self,
        mode: MessageMode,
        prize_name: &str,
        number: &str,
        rng: &mut R,
    ) -> PendingMessage {
        match mode {
            MessageMode::Predefined => {
                PendingMessage::Ready(fallback_message(prize_name, number, rng))
            }
            MessageMode::Ai => {
                let provider = self.clone();
                let prize = prize_name.to_string();
                let num = number.to_string();
                let handle = tokio::spawn(async move {
                    provider.generate(MessageMode::Ai, &prize, &num).await
                });
                PendingMessage::InFlight {
                    handle,
                    prize_name: prize_name.to_string(),
                    number: number.to_string(),
                }
            }
        }
    }

    async fn generate_ai(&self, prize_name: &str, number: &str) -> Result<String, ApiError> {
        let generator = self.generator.as_ref().ok_or(ApiError::MissingApiKey)?;
        let prompt = winner_prompt(prize_name, number);
        let text = tokio::time::timeout(self.timeout, generator.generate_text(&prompt))
            .await
            .map_err(|_| ApiError::Timeout)??;
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

/// A message that is either known already or still being generated.
#[derive(Debug)]
pub enum PendingMessage {
    Ready(String),
    InFlight {
        handle: JoinHandle<String>,
        prize_name: String,
        number: String,
    },
}

impl PendingMessage {
    pub fn is_ready(&self) -> bool {
        match self {
            PendingMessage::Ready(_) => true,
            PendingMessage::InFlight { handle, .. } => handle.is_finished(),
        }
    }

    /// Handle that stops the generation task without owning this message.
    pub fn abort_handle(&self) -> Option<AbortHandle> {
        match self {
            PendingMessage::Ready(_) => None,
            PendingMessage::InFlight { handle, .. } => Some(handle.abort_handle()),
        }
    }

    pub async fn resolve(self) -> String {
        match self {
            PendingMessage::Ready(text) => text,
            PendingMessage::InFlight {
                handle,
                prize_name,
                number,
            } => match handle.await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Message task ended abnormally, using fallback: {}", e);
                    fallback_message(&prize_name, &number, &mut rand::rng())
                }
            },
        }
    }

    pub fn cancel(self) {
        if let PendingMessage::InFlight { handle, .. } = self {
            handle.abort();
        }
    }
}
