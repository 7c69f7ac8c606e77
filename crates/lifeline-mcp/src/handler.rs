//! MCP server handler exposing the `ask_human` tool.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, JsonObject, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::json;
use tracing::{info, warn};

use lifeline_core::coordinator::SessionCoordinator;
use lifeline_core::error::AskError;
use lifeline_core::transport::SlackTransport;

const ASK_HUMAN_TOOL: &str = "ask_human";

#[derive(Clone)]
pub struct LifelineHandler {
    coordinator: Arc<SessionCoordinator<SlackTransport>>,
}

impl LifelineHandler {
    pub fn new(coordinator: Arc<SessionCoordinator<SlackTransport>>) -> Self {
        Self { coordinator }
    }

    async fn ask_human(
        &self,
        arguments: Option<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let question = arguments
            .as_ref()
            .and_then(|args| args.get("question"))
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                McpError::invalid_params("ask_human requires a non-empty 'question' string", None)
            })?;

        info!(question = %preview(question, 80), "ask_human invoked");

        // the client's cancellation token flows straight into the session,
        // so an aborted tool call cancels the question
        match self.coordinator.ask(question, context.ct.clone()).await {
            Ok(reply) => Ok(CallToolResult::success(vec![Content::text(reply)])),
            Err(AskError::Timeout(waited)) => Ok(CallToolResult::error(vec![Content::text(
                format!(
                    "No reply from the human within {}s. They may be away; \
                     try again later or proceed with your best judgement.",
                    waited.as_secs()
                ),
            )])),
            Err(AskError::ConcurrentQuestion { destination }) => {
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "A question is already awaiting a reply in {destination}. \
                     Wait for it to resolve before asking another."
                ))]))
            }
            Err(AskError::Cancelled) => Ok(CallToolResult::error(vec![Content::text(
                "The question was cancelled before a reply arrived.",
            )])),
            Err(AskError::Transport(e)) => {
                warn!(error = %e, "ask_human could not reach the chat backend");
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "Could not deliver the question to the chat backend: {e}"
                ))]))
            }
        }
    }
}

fn ask_human_tool() -> Tool {
    let schema = json!({
        "type": "object",
        "properties": {
            "question": {
                "type": "string",
                "description": "The question to ask the human. Be specific and provide \
                                context to help the human understand what information you need."
            }
        },
        "required": ["question"]
    });
    let schema = schema.as_object().cloned().unwrap_or_default();
    Tool::new(
        ASK_HUMAN_TOOL,
        "Ask a human for information that only they would know, such as personal \
         preferences, project-specific context, local environment details, or \
         non-public information",
        Arc::new(schema),
    )
}

/// First `max` characters of `text`, for log lines.
fn preview(text: &str, max: usize) -> String {
    let truncated: String = text.chars().take(max).collect();
    if truncated.len() < text.len() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

impl ServerHandler for LifelineHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Human-in-the-loop bridge: the ask_human tool posts a question to a \
                 configured Slack channel and waits for the designated person to reply \
                 in the thread."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: vec![ask_human_tool()],
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        match request.name.as_ref() {
            ASK_HUMAN_TOOL => self.ask_human(request.arguments, context).await,
            other => Err(McpError::invalid_params(
                format!("unknown tool: {other}"),
                None,
            )),
        }
    }
}
