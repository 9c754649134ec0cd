use serde_json::{Value, json};

/// 定义对外的MCP工具
pub fn get_tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "download_video",
            "description": "下载单个视频",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "视频URL"
                    },
                    "output_dir": {
                        "type": "string",
                        "description": "输出目录路径，默认使用配置中的目录"
                    },
                    "filename": {
                        "type": "string",
                        "description": "输出文件名"
                    },
                    "format": {
                        "type": "string",
                        "description": "格式ID或清晰度，如 1080p、80-avc1、audio_30280"
                    },
                    "wait": {
                        "type": "boolean",
                        "description": "是否等待下载结束，为 false 时立即返回任务ID",
                        "default": true
                    }
                },
                "required": ["url"]
            }
        }),

        json!({
            "name": "batch_download_videos",
            "description": "批量下载视频",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "urls": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "视频URL列表"
                    },
                    "output_dir": {
                        "type": "string",
                        "description": "输出目录路径，默认使用配置中的目录"
                    },
                    "wait": {
                        "type": "boolean",
                        "description": "是否等待全部下载结束，为 false 时立即返回任务ID",
                        "default": true
                    }
                },
                "required": ["urls"]
            }
        }),

        json!({
            "name": "get_media_info",
            "description": "获取视频信息但不下载",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "视频URL"
                    }
                },
                "required": ["url"]
            }
        }),

        json!({
            "name": "get_popular_videos",
            "description": "获取平台热门视频",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "platform": {
                        "type": "string",
                        "description": "平台名称",
                        "default": "bilibili"
                    },
                    "count": {
                        "type": "number",
                        "description": "获取数量",
                        "default": 20
                    }
                }
            }
        }),

        json!({
            "name": "get_task_status",
            "description": "获取下载任务状态",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "task_id": {
                        "type": "string",
                        "description": "任务ID"
                    }
                },
                "required": ["task_id"]
            }
        }),

        json!({
            "name": "list_tasks",
            "description": "列出当前进程中的全部下载任务",
            "inputSchema": {
                "type": "object",
                "properties": {}
            }
        }),

        json!({
            "name": "cancel_task",
            "description": "取消指定的下载任务",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "task_id": {
                        "type": "string",
                        "description": "要取消的任务ID"
                    }
                },
                "required": ["task_id"]
            }
        }),

        json!({
            "name": "list_platforms",
            "description": "列出支持的平台",
            "inputSchema": {
                "type": "object",
                "properties": {}
            }
        }),

        json!({
            "name": "list_downloads",
            "description": "列出已下载的视频",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "number",
                        "description": "列出数量限制",
                        "default": 10
                    }
                }
            }
        }),
    ]
}

pub fn tool_names() -> Vec<String> {
    get_tool_definitions()
        .iter()
        .filter_map(|tool| tool["name"].as_str().map(str::to_string))
        .collect()
}
