//! 页面模板
//!
//! 模板在编译时嵌入，使用 MiniJinja 渲染；`.html` 模板自动转义。

use crate::models::parse_datetime_utc;
use minijinja::{Environment, Error, Value};
use serde::Serialize;

pub const INDEX_TEMPLATE: &str = "llm.html";
pub const CONVERSATION_TEMPLATE: &str = "llm_conversation.html";

/// 模板引擎
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, Error> {
        let mut env = Environment::new();
        env.set_debug(cfg!(debug_assertions));
        env.add_template(INDEX_TEMPLATE, include_str!("llm.html"))?;
        env.add_template(CONVERSATION_TEMPLATE, include_str!("llm_conversation.html"))?;
        env.add_filter("datetime", format_datetime);
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, Error> {
        let template = self.env.get_template(name)?;
        template.render(ctx)
    }
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates").finish_non_exhaustive()
    }
}

/// 把 ISO 8601 时间格式化为 `YYYY-MM-DD HH:MM:SS`，无法解析时原样输出
fn format_datetime(value: Value) -> String {
    if value.is_none() || value.is_undefined() {
        return String::new();
    }
    let Some(text) = value.as_str() else {
        return value.to_string();
    };
    parse_datetime_utc(text)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_datetime_filter() {
        assert_eq!(
            format_datetime(Value::from("2024-05-01T10:20:30.123456")),
            "2024-05-01 10:20:30"
        );
        assert_eq!(format_datetime(Value::from(())), "");
        assert_eq!(format_datetime(Value::from("yesterday")), "yesterday");
    }

    #[test]
    fn test_index_escapes_model_names() {
        let templates = Templates::new().unwrap();
        let html = templates
            .render(
                INDEX_TEMPLATE,
                context! {
                    messages => Vec::<()>::new(),
                    db_attached => true,
                    start_path => "/-/llm/start",
                    base_path => "/-/llm",
                    default_model => "echo",
                    models => vec![context! { model_id => "echo", name => "<b>Echo</b>" }],
                    conversations => Vec::<()>::new(),
                },
            )
            .unwrap();
        assert!(html.contains("&lt;b&gt;Echo"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("Start conversation"));
        assert!(!html.contains("log database is not attached"));
    }
}
