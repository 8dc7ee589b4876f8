//! 模型注册表
//!
//! 按模型 ID 或别名在运行时解析模型。

use super::echo::EchoModel;
use super::openai_custom::OpenAIChatModel;
use super::traits::{Model, ModelCapabilities};
use super::ModelError;
use crate::config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// 首页展示用的模型信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub capabilities: ModelCapabilities,
}

/// 模型注册表
#[derive(Default, Clone)]
pub struct ModelRegistry {
    models: Vec<(Arc<dyn Model>, Vec<String>)>,
    lookup: HashMap<String, usize>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据配置创建：内置 echo 加上配置中的 OpenAI 兼容模型
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        let api_key = config.openai.resolve_api_key();
        for model_id in &config.openai.models {
            registry.register(
                Arc::new(OpenAIChatModel::new(
                    model_id.clone(),
                    api_key.clone(),
                    config.openai.base_url.clone(),
                )),
                &[],
            );
        }
        registry.register(Arc::new(EchoModel), &[]);
        tracing::info!(
            "[LLM] 已注册 {} 个模型 (OpenAI key configured: {})",
            registry.models.len(),
            api_key.is_some()
        );
        registry
    }

    /// 注册模型，ID 或别名重复时后注册的覆盖先注册的
    pub fn register(&mut self, model: Arc<dyn Model>, aliases: &[&str]) {
        let index = self.models.len();
        self.lookup.insert(model.model_id().to_string(), index);
        for alias in aliases {
            self.lookup.insert(alias.to_string(), index);
        }
        self.models
            .push((model, aliases.iter().map(|a| a.to_string()).collect()));
    }

    /// 按 ID 或别名获取模型
    pub fn get(&self, model_id: &str) -> Result<Arc<dyn Model>, ModelError> {
        self.lookup
            .get(model_id)
            .map(|&i| self.models[i].0.clone())
            .ok_or_else(|| ModelError::UnknownModel(model_id.to_string()))
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.lookup.contains_key(model_id)
    }

    /// 所有模型，按注册顺序
    pub fn list(&self) -> Vec<ModelInfo> {
        self.models
            .iter()
            .map(|(model, aliases)| ModelInfo {
                model_id: model.model_id().to_string(),
                name: model.display_name(),
                aliases: aliases.clone(),
                capabilities: model.capabilities(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = ModelRegistry::from_config(&Config::default());
        assert!(registry.contains("gpt-4o-mini"));
        assert!(registry.contains("echo"));
        let listed: Vec<_> = registry.list().into_iter().map(|m| m.model_id).collect();
        assert_eq!(listed.last().map(String::as_str), Some("echo"));
        assert!(registry.get("gpt-4o").unwrap().capabilities().needs_key);
    }

    #[test]
    fn test_unknown_model() {
        let registry = ModelRegistry::new();
        assert_eq!(
            registry.get("x-unknown").err(),
            Some(ModelError::UnknownModel("x-unknown".to_string()))
        );
    }

    #[test]
    fn test_aliases_resolve_to_model() {
        let mut registry = ModelRegistry::new();
        registry.register(Arc::new(EchoModel), &["parrot"]);
        assert_eq!(registry.get("parrot").unwrap().model_id(), "echo");
        assert_eq!(registry.list()[0].aliases, vec!["parrot".to_string()]);
    }
}
