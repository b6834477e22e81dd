pub mod api;
pub mod config;
pub mod database;
pub mod draw;
pub mod error;
pub mod history;
pub mod inventory;
pub mod message;
pub mod reports;
pub mod session;
pub mod types;
pub mod utils;

pub use api::{GeminiClient, ImageGenerator};
pub use draw::{
    DigitSettle, DigitState, DrawPlan, RevealSchedule, RevealState, finish_draw, start_draw,
};
pub use error::{ApiError, DrawError};
pub use history::HistoryLedger;
pub use inventory::{PrizeInventory, PrizeUpdate};
pub use message::{MessageProvider, PendingMessage, TextGenerator, fallback_message};
pub use session::{ActiveDraw, DrawSession, DrawSettingsUpdate};
pub use types::{
    AssetKey, DrawConfiguration, GeneratedImage, LotteryConfig, MessageMode, Prize, Winner,
};
