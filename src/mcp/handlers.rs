use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::mcp::server::MediaMcpServer;

/// MCP请求处理器
pub struct McpRequestHandler {
    server: MediaMcpServer,
}

impl McpRequestHandler {
    pub fn new(server: MediaMcpServer) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &MediaMcpServer {
        &self.server
    }

    /// 处理工具调用请求
    pub async fn handle_tool_call(&self, tool_name: &str, args: Value) -> anyhow::Result<Value> {
        debug!("调用工具: {} {}", tool_name, args);
        match tool_name {
            "download_video" => self.server.tool_download_video(args).await,
            "batch_download_videos" => self.server.tool_batch_download_videos(args).await,
            "get_media_info" => self.server.tool_get_media_info(args).await,
            "get_popular_videos" => self.server.tool_get_popular_videos(args).await,
            "get_task_status" => self.server.tool_get_task_status(args).await,
            "list_tasks" => self.server.tool_list_tasks(args).await,
            "cancel_task" => self.server.tool_cancel_task(args).await,
            "list_platforms" => self.server.tool_list_platforms(args).await,
            "list_downloads" => self.server.tool_list_downloads(args).await,
            _ => Err(anyhow::anyhow!("未知的工具: {}", tool_name)),
        }
    }

    /// 获取可用工具列表
    pub fn get_available_tools(&self) -> Vec<Value> {
        crate::mcp::tools::get_tool_definitions()
    }

    /// 处理一条 JSON-RPC 请求，返回响应
    pub async fn handle_request(&self, request: Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request["method"].as_str().unwrap_or_default();

        let result = match method {
            "tools/list" => Ok(json!({ "tools": self.get_available_tools() })),
            "tools/call" => {
                let params = &request["params"];
                match params["name"].as_str() {
                    Some(name) => {
                        let args = params
                            .get("arguments")
                            .cloned()
                            .unwrap_or_else(|| json!({}));
                        self.handle_tool_call(name, args).await.map(|value| {
                            json!({
                                "content": [{ "type": "text", "text": value.to_string() }],
                                "structuredContent": value,
                            })
                        })
                    }
                    None => Err(anyhow::anyhow!("无效的请求参数")),
                }
            }
            other => Err(anyhow::anyhow!("未知的方法: {}", other)),
        };

        match result {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err(e) => {
                warn!("请求处理失败: {:#}", e);
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32000, "message": format!("{:#}", e) }
                })
            }
        }
    }

    /// 从 stdin 逐行读取请求，响应逐行写到 stdout
    pub async fn serve_stdio(&self) -> anyhow::Result<()> {
        info!(
            "🚀 MCP 服务已启动，共 {} 个工具，等待请求...",
            self.get_available_tools().len()
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<Value>(line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": format!("解析请求失败: {}", e) }
                }),
            };

            stdout.write_all(response.to_string().as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }

        info!("输入已关闭，MCP 服务退出");
        Ok(())
    }
}
