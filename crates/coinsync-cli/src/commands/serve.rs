//! Newline-delimited JSON tool server.
//!
//! Request: `{"id": <any>, "tool": "<name>", "args": {...}}`
//! Response: `{"id": <same>, "result": <tool value>}`
//!
//! With `--sync` the synchronization loop runs on a background task sharing
//! the same store handle, and is stopped once stdin closes.

use std::sync::Arc;

use coinsync_core::{runtime, AppConfig, MarketStore, ToolSurface};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::call_tool;
use super::sync::apply_overrides;
use crate::cli::ServeArgs;
use crate::error::CliError;

#[derive(Debug, Deserialize)]
struct ToolRequest {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default = "empty_args")]
    args: Value,
}

fn empty_args() -> Value {
    json!({})
}

/// A sync loop running beside the tool server.
struct BackgroundSync {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl BackgroundSync {
    fn spawn(
        args: &ServeArgs,
        mut config: AppConfig,
        store: Arc<dyn MarketStore>,
    ) -> Result<Self, CliError> {
        apply_overrides(&mut config, args.interval_secs, args.size);
        let mut sync = runtime::build_sync_loop(&config, store)?;
        let (stop, stopped) = oneshot::channel::<()>();

        info!(
            interval_secs = config.poll_interval.as_secs(),
            snapshot_size = config.snapshot_size,
            "sync loop starting beside the tool server"
        );
        let task = tokio::spawn(async move {
            sync.run_until(async {
                let _ = stopped.await;
            })
            .await;
        });
        Ok(Self { stop, task })
    }

    async fn shutdown(self) {
        let _ = self.stop.send(());
        match self.task.await {
            Ok(()) => {}
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Err(join_error) => warn!(error = %join_error, "sync loop task cancelled"),
        }
    }
}

pub async fn run(
    args: &ServeArgs,
    config: AppConfig,
    store: Arc<dyn MarketStore>,
) -> Result<(), CliError> {
    let surface = ToolSurface::new(Arc::clone(&store));
    let background = if args.sync {
        Some(BackgroundSync::spawn(args, config.clone(), store)?)
    } else {
        None
    };

    info!(sync = args.sync, "serving tool calls on stdin");
    let served = serve_lines(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        &surface,
        &config,
    )
    .await;
    info!("stdin closed; tool server stopping");

    if let Some(background) = background {
        background.shutdown().await;
    }
    served.map(|_| ())
}

/// Answer each request line in order. Returns the number of responses written.
async fn serve_lines<R, W>(
    reader: R,
    mut writer: W,
    surface: &ToolSurface,
    config: &AppConfig,
) -> Result<usize, CliError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut answered = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match parse_request(&line) {
            Ok(request) => {
                debug!(tool = %request.tool, "tool call");
                let result = call_tool(surface, config, &request.tool, request.args).await;
                json!({ "id": request.id, "result": result })
            }
            Err(message) => json!({ "id": Value::Null, "result": { "error": message } }),
        };

        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
        answered += 1;
    }

    Ok(answered)
}

fn parse_request(line: &str) -> Result<ToolRequest, String> {
    serde_json::from_str(line).map_err(|error| format!("malformed request: {error}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use coinsync_core::{
        CoinSymbol, CycleAudit, InsertOutcome, MarketRecord, NewCoin, StoreError,
    };

    use super::*;

    /// Empty store; `fetch_all` optionally stalls before answering.
    struct QuietStore {
        stall: Duration,
    }

    impl MarketStore for QuietStore {
        fn upsert_batch(&self, records: &[MarketRecord]) -> Result<usize, StoreError> {
            Ok(records.len())
        }
        fn fetch_all(&self) -> Result<Vec<MarketRecord>, StoreError> {
            std::thread::sleep(self.stall);
            Ok(Vec::new())
        }
        fn fetch_by_symbol(&self, _: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError> {
            Ok(None)
        }
        fn insert_one(&self, _: &NewCoin) -> Result<InsertOutcome, StoreError> {
            Err(StoreError::unavailable("read-only"))
        }
        fn update_price(&self, _: &CoinSymbol, _: f64) -> Result<Option<MarketRecord>, StoreError> {
            Ok(None)
        }
        fn delete_by_symbol(&self, _: &CoinSymbol) -> Result<Option<MarketRecord>, StoreError> {
            Ok(None)
        }
        fn record_cycle(&self, _: &CycleAudit) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn surface(stall: Duration) -> ToolSurface {
        ToolSurface::new(Arc::new(QuietStore { stall }))
    }

    fn config(store_timeout: Duration) -> AppConfig {
        let mut config = AppConfig::from_lookup(|_| None).expect("config");
        config.store_timeout = store_timeout;
        config
    }

    #[test]
    fn args_default_to_an_empty_object() {
        let request = parse_request(r#"{"id": 7, "tool": "get_all"}"#).expect("parse");
        assert_eq!(request.id, json!(7));
        assert_eq!(request.args, json!({}));
    }

    #[test]
    fn missing_tool_is_malformed() {
        let error = parse_request(r#"{"id": 7}"#).expect_err("must fail");
        assert!(error.starts_with("malformed request"));
    }

    #[tokio::test]
    async fn each_request_line_gets_one_response_echoing_its_id() {
        let input = concat!(
            "{\"id\":\"a-1\",\"tool\":\"get_all\"}\n",
            "\n",
            "not json\n",
            "{\"id\":7,\"tool\":\"get_by_symbol\",\"args\":{\"symbol\":\"btc\"}}\n",
        );
        let mut output = Vec::new();

        let answered = serve_lines(
            input.as_bytes(),
            &mut output,
            &surface(Duration::ZERO),
            &config(Duration::from_secs(5)),
        )
        .await
        .expect("serve");

        let responses = String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).expect("json line"))
            .collect::<Vec<_>>();
        assert_eq!(answered, 3);
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], json!({"id": "a-1", "result": []}));
        assert_eq!(responses[1]["id"], Value::Null);
        assert!(responses[1]["result"]["error"]
            .as_str()
            .expect("message")
            .starts_with("malformed request"));
        assert_eq!(responses[2], json!({"id": 7, "result": null}));
    }

    #[tokio::test]
    async fn a_stalled_store_call_becomes_a_timeout_error_value() {
        let value = call_tool(
            &surface(Duration::from_millis(300)),
            &config(Duration::from_millis(20)),
            "get_all",
            json!({}),
        )
        .await;

        let message = value["error"].as_str().expect("error value");
        assert!(message.contains("timed out after 20ms"), "{message}");
        assert!(message.contains("get_all"));
    }
}
