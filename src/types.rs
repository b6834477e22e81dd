use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::inventory::PrizeInventory;

pub const DEFAULT_MAX_NUMBER: u32 = 9999;
pub const DEFAULT_DIGIT_DELAY_MS: u64 = 1000;
/// Accepted range for the gap between digit reveals.
pub const MIN_DIGIT_DELAY_MS: u64 = 500;
pub const MAX_DIGIT_DELAY_MS: u64 = 60_000;
pub const DEFAULT_BACKGROUND_PROMPT: &str = "A festive, high-quality artistic background for the \
Lunar New Year of the Horse 2026: a majestic horse, blooming yellow apricot and pink peach \
blossoms, red and gold lanterns, warm cinematic lighting, panoramic view, 4k.";

/// One prize tier. `remaining` never exceeds `count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prize {
    pub id: String,
    pub name: String,
    pub count: u32,
    pub remaining: u32,
    /// 1 for the top prize; lower ranks are presented first.
    pub rank: u32,
}

impl Prize {
    pub fn new(id: impl Into<String>, name: impl Into<String>, count: u32, rank: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            count,
            remaining: count,
            rank,
        }
    }

    pub fn is_available(&self) -> bool {
        self.remaining > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub id: String,
    pub number: String,
    pub prize_name: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageMode {
    Ai,
    #[default]
    Predefined,
}

impl fmt::Display for MessageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageMode::Ai => write!(f, "AI"),
            MessageMode::Predefined => write!(f, "PREDEFINED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawConfiguration {
    /// Inclusive upper bound of the draw range.
    pub max_number: u32,
    #[serde(default = "default_digit_delay_ms")]
    pub digit_delay_ms: u64,
    #[serde(default)]
    pub message_mode: MessageMode,
}

fn default_digit_delay_ms() -> u64 {
    DEFAULT_DIGIT_DELAY_MS
}

impl DrawConfiguration {
    pub fn digit_reveal_delay(&self) -> Duration {
        Duration::from_millis(self.digit_delay_ms)
    }

    pub fn digit_count(&self) -> usize {
        crate::utils::digit_count(self.max_number)
    }

    /// Pulls `digit_delay_ms` back into the accepted range. Returns true if it moved.
    pub fn clamp_digit_delay(&mut self) -> bool {
        let clamped = self.digit_delay_ms.clamp(MIN_DIGIT_DELAY_MS, MAX_DIGIT_DELAY_MS);
        let moved = clamped != self.digit_delay_ms;
        self.digit_delay_ms = clamped;
        moved
    }
}

impl Default for DrawConfiguration {
    fn default() -> Self {
        Self {
            max_number: DEFAULT_MAX_NUMBER,
            digit_delay_ms: DEFAULT_DIGIT_DELAY_MS,
            message_mode: MessageMode::Predefined,
        }
    }
}

/// Everything the admin screen edits, persisted as one settings blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotteryConfig {
    #[serde(flatten)]
    pub draw: DrawConfiguration,
    pub prizes: PrizeInventory,
    #[serde(default = "default_background_prompt")]
    pub background_prompt: String,
    #[serde(default)]
    pub muted: bool,
}

fn default_background_prompt() -> String {
    DEFAULT_BACKGROUND_PROMPT.to_string()
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            draw: DrawConfiguration::default(),
            prizes: PrizeInventory::new(vec![
                Prize::new("1", "Grand Prize", 1, 1),
                Prize::new("2", "First Prize", 3, 2),
                Prize::new("3", "Lucky Prize", 10, 3),
            ]),
            background_prompt: default_background_prompt(),
            muted: false,
        }
    }
}

/// Fixed identifiers for binary assets kept apart from the settings blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKey {
    Background,
    Bgm,
    WinSfx,
}

impl AssetKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKey::Background => "asset_background",
            AssetKey::Bgm => "asset_bgm",
            AssetKey::WinSfx => "asset_winsfx",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "asset_background" => Some(AssetKey::Background),
            "asset_bgm" => Some(AssetKey::Bgm),
            "asset_winsfx" => Some(AssetKey::WinSfx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub mime_type: String,
    pub data: Vec<u8>,
}

// Text/image generation wire types

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
pub struct Candidate {
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if any.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    pub fn first_inline_data(&self) -> Option<&InlineData> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_config_without_optional_fields_loads_defaults() {
        let raw = r#"{
            "max_number": 999,
            "prizes": [{"id":"a","name":"Top","count":2,"remaining":1,"rank":1}]
        }"#;
        let config: LotteryConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.draw.max_number, 999);
        assert_eq!(config.draw.digit_delay_ms, DEFAULT_DIGIT_DELAY_MS);
        assert_eq!(config.draw.message_mode, MessageMode::Predefined);
        assert_eq!(config.background_prompt, DEFAULT_BACKGROUND_PROMPT);
        assert!(!config.muted);
        assert_eq!(config.prizes.len(), 1);
    }

    #[test]
    fn digit_delay_is_clamped_into_range() {
        let mut draw = DrawConfiguration {
            digit_delay_ms: u64::MAX,
            ..Default::default()
        };
        assert!(draw.clamp_digit_delay());
        assert_eq!(draw.digit_delay_ms, MAX_DIGIT_DELAY_MS);

        draw.digit_delay_ms = 0;
        assert!(draw.clamp_digit_delay());
        assert_eq!(draw.digit_delay_ms, MIN_DIGIT_DELAY_MS);

        draw.digit_delay_ms = 1000;
        assert!(!draw.clamp_digit_delay());
    }

    #[test]
    fn message_mode_uses_screaming_case_on_the_wire() {
        let json = serde_json::to_string(&MessageMode::Ai).unwrap();
        assert_eq!(json, "\"AI\"");
        let mode: MessageMode = serde_json::from_str("\"PREDEFINED\"").unwrap();
        assert_eq!(mode, MessageMode::Predefined);
    }

    #[test]
    fn response_text_joins_parts_and_rejects_blank() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Happy "},{"text":"New Year"}]}}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text().as_deref(), Some("Happy New Year"));

        let blank = r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(blank).unwrap();
        assert!(response.text().is_none());
    }

    #[test]
    fn asset_keys_round_trip_through_their_identifiers() {
        for key in [AssetKey::Background, AssetKey::Bgm, AssetKey::WinSfx] {
            assert_eq!(AssetKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(AssetKey::parse("asset_unknown"), None);
    }
}
