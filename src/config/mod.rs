//! 配置管理模块
//!
//! 提供 YAML 配置文件支持，以及 llm 用户目录、日志数据库路径的解析

mod path_utils;
mod types;
mod yaml;

pub use path_utils::{
    default_db_path, expand_tilde, llm_user_dir, resolve_db_path, LLM_USER_PATH_ENV,
    LOGS_DB_FILE,
};
pub use types::{
    Config, LlmPluginConfig, LoggingConfig, OpenAIConfig, PluginsConfig, ServerConfig,
    WebSocketConfig,
};
pub use yaml::{default_config_path, load_config, save_config, ConfigError, CONFIG_FILE_NAME};
