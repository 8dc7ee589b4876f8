//! 配置类型定义

use serde::{Deserialize, Serialize};

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP 服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 插件配置
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// OpenAI 兼容模型配置
    #[serde(default)]
    pub openai: OpenAIConfig,
    /// WebSocket 配置
    #[serde(default)]
    pub websocket: WebSocketConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 插件配置，`plugins.llm` 对应本插件
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginsConfig {
    #[serde(default)]
    pub llm: LlmPluginConfig,
}

/// llm 插件配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmPluginConfig {
    /// 日志数据库路径，未设置时使用 llm 用户目录下的 logs.db
    #[serde(default)]
    pub db_path: Option<String>,
    /// `/-/llm/chat` 和 `/-/llm/stream` 未指定模型时使用的模型
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmPluginConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            default_model: default_model(),
        }
    }
}

/// OpenAI 兼容 API 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIConfig {
    /// API 密钥，未设置时读取 `OPENAI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
    /// API 地址，带或不带 `/v1` 均可
    #[serde(default)]
    pub base_url: Option<String>,
    /// 注册到模型注册表的模型 ID
    #[serde(default = "default_openai_models")]
    pub models: Vec<String>,
}

fn default_openai_models() -> Vec<String> {
    vec![
        "gpt-4o-mini".to_string(),
        "gpt-4o".to_string(),
        "gpt-4.1-mini".to_string(),
    ]
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            models: default_openai_models(),
        }
    }
}

impl OpenAIConfig {
    /// 配置中的密钥优先，其次是环境变量
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// WebSocket 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSocketConfig {
    /// 最大并发会话数
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// 单条消息大小限制（字节）
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_max_connections() -> usize {
    100
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1MB
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// 默认日志级别，`RUST_LOG` 优先
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
