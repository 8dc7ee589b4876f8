//! 路径工具
//!
//! llm 用户目录解析，以及配置中 `~` 路径的展开

use std::path::{Path, PathBuf};

/// 覆盖 llm 用户目录的环境变量
pub const LLM_USER_PATH_ENV: &str = "LLM_USER_PATH";

/// llm 用户目录在系统配置目录下的名称
const LLM_APP_DIR: &str = "io.datasette.llm";

/// 日志数据库文件名
pub const LOGS_DB_FILE: &str = "logs.db";

/// 展开路径开头的 `~`
///
/// - `~` -> 用户主目录
/// - `~/path` -> 用户主目录/path
/// - 其他（包括 `~user/path`）原样返回
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if !path_str.starts_with('~') {
        return path.to_path_buf();
    }

    let home_dir = match dirs::home_dir() {
        Some(dir) => dir,
        None => return path.to_path_buf(),
    };

    if path_str == "~" {
        home_dir
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        home_dir.join(rest)
    } else {
        path.to_path_buf()
    }
}

/// 解析 llm 用户目录
///
/// 优先使用 `LLM_USER_PATH`，否则为 `<config_dir>/io.datasette.llm`。
/// 不会创建目录。
pub fn llm_user_dir() -> PathBuf {
    if let Some(custom) = std::env::var_os(LLM_USER_PATH_ENV) {
        if !custom.is_empty() {
            return expand_tilde(PathBuf::from(custom));
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(LLM_APP_DIR)
}

/// 默认日志数据库路径
pub fn default_db_path() -> PathBuf {
    llm_user_dir().join(LOGS_DB_FILE)
}

/// 根据显式配置解析日志数据库路径
pub fn resolve_db_path(configured: Option<&str>) -> PathBuf {
    match configured {
        Some(p) if !p.trim().is_empty() => expand_tilde(p.trim()),
        _ => default_db_path(),
    }
}
