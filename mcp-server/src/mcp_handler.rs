use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use tracing::{info, warn};

use crate::use_cases::{DrawUseCase, PrizeUseCase, ReportUseCase, ThemeUseCase};

#[derive(Debug, serde::Deserialize)]
struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    jsonrpc: String,
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

#[derive(Debug, serde::Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id: Some(id.unwrap_or(json!(1))),
        }
    }

    fn failure(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id: Some(id.unwrap_or(json!(1))),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, serde::Serialize)]
struct Tool {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

pub struct MCPHandler {
    draw_use_case: Arc<DrawUseCase>,
    prize_use_case: Arc<PrizeUseCase>,
    theme_use_case: Arc<ThemeUseCase>,
    report_use_case: Arc<ReportUseCase>,
}

impl MCPHandler {
    pub fn new(
        draw_use_case: Arc<DrawUseCase>,
        prize_use_case: Arc<PrizeUseCase>,
        theme_use_case: Arc<ThemeUseCase>,
        report_use_case: Arc<ReportUseCase>,
    ) -> Self {
        Self {
            draw_use_case,
            prize_use_case,
            theme_use_case,
            report_use_case,
        }
    }

    pub async fn serve<R, W>(self, reader: R, mut writer: W) -> Result<()>
    where
        R: BufRead,
        W: Write,
    {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(req) => req,
                Err(e) => {
                    warn!("Failed to parse request: {} - Line: {}", e, line);
                    let error_response = JsonRpcResponse {
                        jsonrpc: "2.0".to_string(),
                        result: None,
                        error: Some(JsonRpcError {
                            code: -32700,
                            message: "Parse error".to_string(),
                            data: Some(json!(e.to_string())),
                        }),
                        id: None,
                    };
                    let response_json = serde_json::to_string(&error_response)?;
                    writeln!(writer, "{}", response_json)?;
                    writer.flush()?;
                    continue;
                }
            };

            // Notifications never get a response
            let is_notification =
                request.id.is_none() || request.method.starts_with("notifications/");
            if is_notification {
                if request.method == "notifications/initialized" {
                    info!("🎉 Client initialized");
                }
                continue;
            }

            let response = self.handle_request(request).await;
            let response_json = serde_json::to_string(&response)?;
            writeln!(writer, "{}", response_json)?;
            writer.flush()?;
        }

        Ok(())
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "tools/list" => self.handle_list_tools(request.id),
            "tools/call" => self.handle_call_tool(request.params, request.id).await,
            _ => JsonRpcResponse::failure(
                request.id,
                -32601,
                format!("Method not found: {}", request.method),
            ),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("🎉 Initializing luxedraw MCP server");
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "luxedraw-mcp-server",
                    "version": "0.1.0"
                }
            }),
        )
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({ "tools": self.get_tools() }))
    }

    async fn handle_call_tool(&self, params: Option<Value>, id: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, -32602, "Missing params".to_string());
        };

        let Some(tool_name) = params.get("name").and_then(|n| n.as_str()) else {
            return JsonRpcResponse::failure(id, -32602, "Missing tool name".to_string());
        };

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let arguments_map: HashMap<String, Value> =
            serde_json::from_value(arguments).unwrap_or_default();

        match self.execute_tool(tool_name, &arguments_map).await {
            Ok(content) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [
                        {
                            "type": "text",
                            "text": content
                        }
                    ]
                }),
            ),
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                JsonRpcResponse::failure(id, -32603, format!("Tool execution error: {}", e))
            }
        }
    }

    async fn execute_tool(
        &self,
        tool_name: &str,
        arguments: &HashMap<String, Value>,
    ) -> Result<String> {
        match tool_name {
            "list_prizes" => self.draw_use_case.list_prizes(arguments).await,
            "select_prize" => self.draw_use_case.select_prize(arguments).await,
            "start_draw" => self.draw_use_case.start_draw(arguments).await,
            "get_history" => self.draw_use_case.get_history(arguments).await,
            "add_prize" => self.prize_use_case.add_prize(arguments).await,
            "update_prize" => self.prize_use_case.update_prize(arguments).await,
            "remove_prize" => self.prize_use_case.remove_prize(arguments).await,
            "update_draw_settings" => self.prize_use_case.update_draw_settings(arguments).await,
            "reset_lottery" => self.prize_use_case.reset_lottery(arguments).await,
            "toggle_audio" => self.prize_use_case.toggle_audio(arguments).await,
            "generate_background" => self.theme_use_case.generate_background(arguments).await,
            "generate_history_report" => {
                self.report_use_case.generate_history_report(arguments).await
            }
            _ => Err(anyhow::anyhow!("Unknown tool: {}", tool_name)),
        }
    }

    fn get_tools(&self) -> Vec<Tool> {
        let prize_id = json!({
            "type": "string",
            "description": "Identifier of the prize tier"
        });

        vec![
            tool(
                "list_prizes",
                "List prize tiers by rank with remaining counts and the current selection",
                json!({ "type": "object", "properties": {} }),
            ),
            tool(
                "select_prize",
                "Select the prize tier the next draw is for",
                json!({
                    "type": "object",
                    "properties": { "prize_id": prize_id },
                    "required": ["prize_id"]
                }),
            ),
            tool(
                "start_draw",
                "Draw a unique winning number for the selected prize and record the winner",
                json!({
                    "type": "object",
                    "properties": {
                        "prize_id": {
                            "type": "string",
                            "description": "Optional prize tier to select before drawing"
                        }
                    }
                }),
            ),
            tool(
                "get_history",
                "Get recorded winners, newest first",
                json!({
                    "type": "object",
                    "properties": {
                        "limit": {
                            "type": "integer",
                            "description": "Optional limit for number of winners"
                        }
                    }
                }),
            ),
            tool(
                "add_prize",
                "Add a prize tier at the lowest rank",
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "Prize name" },
                        "count": { "type": "integer", "description": "Number of winners (default: 1)" }
                    },
                    "required": ["name"]
                }),
            ),
            tool(
                "update_prize",
                "Rename, resize or re-rank a prize tier. Changing count refills it",
                json!({
                    "type": "object",
                    "properties": {
                        "prize_id": prize_id,
                        "name": { "type": "string" },
                        "count": { "type": "integer" },
                        "rank": { "type": "integer" }
                    },
                    "required": ["prize_id"]
                }),
            ),
            tool(
                "remove_prize",
                "Remove a prize tier",
                json!({
                    "type": "object",
                    "properties": { "prize_id": prize_id },
                    "required": ["prize_id"]
                }),
            ),
            tool(
                "update_draw_settings",
                "Change the number range, digit reveal delay or message mode",
                json!({
                    "type": "object",
                    "properties": {
                        "max_number": { "type": "integer", "description": "Largest drawable number" },
                        "digit_delay_ms": { "type": "integer", "description": "Gap between digit reveals in ms" },
                        "message_mode": { "type": "string", "enum": ["AI", "PREDEFINED"] }
                    }
                }),
            ),
            tool(
                "reset_lottery",
                "Clear all winners and refill every prize tier",
                json!({
                    "type": "object",
                    "properties": {
                        "confirm": { "type": "boolean", "description": "Must be true" }
                    },
                    "required": ["confirm"]
                }),
            ),
            tool(
                "toggle_audio",
                "Mute or unmute background music and sound effects",
                json!({ "type": "object", "properties": {} }),
            ),
            tool(
                "generate_background",
                "Generate a stage background image and save it",
                json!({
                    "type": "object",
                    "properties": {
                        "prompt": {
                            "type": "string",
                            "description": "Image prompt (default: saved background prompt)"
                        }
                    }
                }),
            ),
            tool(
                "generate_history_report",
                "Generate and save an HTML honor roll of all winners",
                json!({ "type": "object", "properties": {} }),
            ),
        ]
    }
}

pub fn stdio() -> (BufReader<io::Stdin>, io::Stdout) {
    (BufReader::new(io::stdin()), io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::SharedSession;
    use luxedraw::{DrawSession, LotteryConfig, MessageProvider};
    use std::io::Cursor;
    use tokio::sync::Mutex;

    fn handler(session: SharedSession, report_path: &str) -> MCPHandler {
        MCPHandler::new(
            Arc::new(DrawUseCase::new(Arc::clone(&session))),
            Arc::new(PrizeUseCase::new(Arc::clone(&session))),
            Arc::new(ThemeUseCase::new(Arc::clone(&session))),
            Arc::new(ReportUseCase::new(session, report_path.to_string())),
        )
    }

    fn shared_session() -> SharedSession {
        let session =
            DrawSession::in_memory(LotteryConfig::default(), MessageProvider::predefined_only())
                .with_rng_seed(7);
        Arc::new(Mutex::new(session))
    }

    async fn exchange(handler: MCPHandler, requests: &[Value]) -> Vec<Value> {
        let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
        let mut output = Vec::new();
        handler
            .serve(Cursor::new(input), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn tool_text(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let responses = exchange(
            handler(shared_session(), "reports"),
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            ],
        )
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses[0]["result"]["serverInfo"]["name"],
            "luxedraw-mcp-server"
        );
        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 12);
        assert!(tools.iter().any(|t| t["name"] == "start_draw"));
    }

    #[tokio::test]
    async fn test_malformed_line_gets_parse_error() {
        let input = "{not json\n";
        let mut output = Vec::new();
        handler(shared_session(), "reports")
            .serve(Cursor::new(input), &mut output)
            .await
            .unwrap();
        let response: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(response["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let responses = exchange(
            handler(shared_session(), "reports"),
            &[
                json!({"id": 1, "method": "tools/call", "params": {"name": "nope"}}),
                json!({"id": 2, "method": "resources/list"}),
            ],
        )
        .await;

        assert_eq!(responses[0]["error"]["code"], -32603);
        assert_eq!(responses[1]["error"]["code"], -32601);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_draw_records_winner_with_timeline() {
        let session = shared_session();
        let responses = exchange(
            handler(Arc::clone(&session), "reports"),
            &[json!({
                "id": 1,
                "method": "tools/call",
                "params": {"name": "start_draw", "arguments": {"prize_id": "1"}}
            })],
        )
        .await;

        let body = tool_text(&responses[0]);
        assert_eq!(body["success"], true);
        assert_eq!(body["remaining"], 0);
        assert_eq!(body["winner"]["prize_name"], "Grand Prize");
        let offsets: Vec<u64> = body["timeline"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["offset_ms"].as_u64().unwrap())
            .collect();
        assert_eq!(offsets, vec![1500, 2500, 3500, 4500]);

        let session = session.lock().await;
        assert_eq!(session.history().len(), 1);
        assert!(!session.is_drawing());
    }

    #[tokio::test]
    async fn test_reset_requires_confirmation() {
        let responses = exchange(
            handler(shared_session(), "reports"),
            &[
                json!({"id": 1, "method": "tools/call", "params": {"name": "reset_lottery", "arguments": {}}}),
                json!({"id": 2, "method": "tools/call", "params": {"name": "reset_lottery", "arguments": {"confirm": true}}}),
            ],
        )
        .await;

        assert_eq!(responses[0]["error"]["code"], -32603);
        assert_eq!(tool_text(&responses[1])["success"], true);
    }

    #[tokio::test]
    async fn test_draw_settings_reject_unbounded_delay() {
        let session = shared_session();
        let responses = exchange(
            handler(Arc::clone(&session), "reports"),
            &[
                json!({"id": 1, "method": "tools/call", "params": {
                    "name": "update_draw_settings",
                    "arguments": {"digit_delay_ms": u64::MAX}
                }}),
                json!({"id": 2, "method": "tools/call", "params": {
                    "name": "update_draw_settings",
                    "arguments": {"digit_delay_ms": 750, "message_mode": "AI"}
                }}),
            ],
        )
        .await;

        assert_eq!(responses[0]["error"]["code"], -32603);
        let body = tool_text(&responses[1]);
        assert_eq!(body["settings"]["digit_delay_ms"], 750);
        assert_eq!(session.lock().await.config().draw.digit_delay_ms, 750);
    }

    #[tokio::test]
    async fn test_history_report_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().to_str().unwrap();
        let responses = exchange(
            handler(shared_session(), report_path),
            &[json!({"id": 1, "method": "tools/call", "params": {"name": "generate_history_report"}})],
        )
        .await;

        let body = tool_text(&responses[0]);
        let path = body["path"].as_str().unwrap();
        assert!(std::path::Path::new(path).exists());
    }
}
