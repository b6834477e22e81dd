use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use luxedraw::config;

mod mcp_handler;
mod use_cases;

use mcp_handler::{MCPHandler, stdio};
use use_cases::{DrawUseCase, PrizeUseCase, ReportUseCase, ThemeUseCase};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Stage is set, ready to draw.");

    let session = Arc::new(Mutex::new(config.open_session()?));

    let draw_use_case = DrawUseCase::new(Arc::clone(&session));
    let prize_use_case = PrizeUseCase::new(Arc::clone(&session));
    let theme_use_case = ThemeUseCase::new(Arc::clone(&session));
    let report_use_case = ReportUseCase::new(Arc::clone(&session), config.report_path.clone());

    let handler = MCPHandler::new(
        Arc::new(draw_use_case),
        Arc::new(prize_use_case),
        Arc::new(theme_use_case),
        Arc::new(report_use_case),
    );

    let (reader, writer) = stdio();

    handler.serve(reader, writer).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;

    Ok(())
}
