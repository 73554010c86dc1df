//! Stdio tool server exposing `convert_markdown_to_pdf`.
//!
//! The server owns nothing but a [`ConversionConfig`] and a
//! [`SessionLifecycle`]. Each tool call builds its own
//! [`ConversionRequest`] and runs the normal pipeline. The success line is
//! never printed here: stdout carries the protocol, so the config is
//! forced quiet.

use crate::config::ConversionConfig;
use crate::convert::convert;
use crate::error::{ErrorKind, Md2PdfError};
use crate::pipeline::input::ConversionRequest;
use crate::session::{ActivityReader, SessionLifecycle, ShutdownReason};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name under which the conversion is registered.
pub const TOOL_NAME: &str = "convert_markdown_to_pdf";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConvertParams {
    /// Absolute path to the Markdown file.
    pub input_path: String,
    /// Absolute path for the PDF. Defaults to the input path with a `.pdf` extension.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Clone)]
pub struct Md2PdfServer {
    config: Arc<ConversionConfig>,
    lifecycle: SessionLifecycle,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl Md2PdfServer {
    pub fn new(mut config: ConversionConfig, lifecycle: SessionLifecycle) -> Self {
        config.quiet = true;
        Self {
            config: Arc::new(config),
            lifecycle,
            tool_router: Self::tool_router(),
        }
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    #[tool(
        description = "Convert a Markdown file (with ```mermaid code blocks) to a PDF. Diagrams are rendered to SVG and embedded. Both paths must be absolute."
    )]
    async fn convert_markdown_to_pdf(
        &self,
        Parameters(params): Parameters<ConvertParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let Some(_guard) = self.lifecycle.begin_request() else {
            return Err(ErrorData::internal_error(
                "md2pdf server is shutting down",
                None,
            ));
        };

        debug!(input = %params.input_path, output = ?params.output_path, "Tool call");
        let request = ConversionRequest::new(
            PathBuf::from(params.input_path),
            params.output_path.map(PathBuf::from),
        )
        .map_err(to_error_data)?;

        let output = convert(&request, &self.config)
            .await
            .map_err(to_error_data)?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "PDF written: {}",
            output.output_path.display()
        ))]))
    }
}

#[tool_handler]
impl ServerHandler for Md2PdfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Markdown to PDF converter (tool: convert_markdown_to_pdf). Renders ```mermaid blocks \
                 to SVG, then produces the PDF with md-to-pdf, falling back to pandoc."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Validation errors are the caller's fault; everything else is ours.
fn to_error_data(err: Md2PdfError) -> ErrorData {
    match err.kind() {
        ErrorKind::InputValidation => ErrorData::invalid_params(err.to_string(), None),
        _ => {
            warn!(error = %err, "Conversion failed");
            ErrorData::internal_error(err.to_string(), None)
        }
    }
}

/// Serve the tool over stdin/stdout until the transport closes, a signal
/// arrives, or the session idles out.
///
/// `idle_timeout` of `None` disables idle shutdown.
pub async fn run_stdio(
    config: ConversionConfig,
    idle_timeout: Option<Duration>,
) -> Result<ShutdownReason, Md2PdfError> {
    let lifecycle = SessionLifecycle::new(idle_timeout);
    let server = Md2PdfServer::new(config, lifecycle.clone());
    let ct = CancellationToken::new();

    let transport = (
        ActivityReader::new(tokio::io::stdin(), lifecycle.clone()),
        tokio::io::stdout(),
    );
    let service = server
        .serve_with_ct(transport, ct.clone())
        .await
        .map_err(|e| Md2PdfError::Internal(format!("Tool server failed to start: {e}")))?;

    info!(
        "md2pdf tool server ready on stdio (idle timeout: {})",
        lifecycle
            .idle_timeout()
            .map_or_else(|| "off".to_string(), |d| format!("{}s", d.as_secs()))
    );

    let watcher = tokio::spawn(watch(lifecycle.clone(), ct));

    let quit = service
        .waiting()
        .await
        .map_err(|e| Md2PdfError::Internal(format!("Tool server task failed: {e}")))?;
    debug!(?quit, "Transport loop ended");
    watcher.abort();

    let reason = lifecycle.drain(ShutdownReason::TransportClosed).await;
    info!(?reason, "Tool server stopped");
    Ok(reason)
}

async fn watch(lifecycle: SessionLifecycle, ct: CancellationToken) {
    let reason = tokio::select! {
        _ = lifecycle.idle_expired() => ShutdownReason::IdleTimeout,
        _ = shutdown_signal() => ShutdownReason::Signal,
    };
    info!(?reason, "Shutting down after in-flight requests finish");
    lifecycle.drain(reason).await;
    ct.cancel();
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
