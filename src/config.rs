//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `APIARY__*` 覆盖（双下划线表示嵌套，
//! 如 `APIARY__API__BASE_URL=...`）。API Key 未配置时回落到 `OPENAI_API_KEY`。

use std::path::PathBuf;

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub assistant: AssistantSection,
    #[serde(default)]
    pub vector_store: VectorStoreSection,
}

/// [api] 段：端点与鉴权
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiSection {
    /// 兼容端点，未设置时用官方默认
    pub base_url: Option<String>,
    /// 未设置时回落到环境变量 OPENAI_API_KEY
    pub api_key: Option<String>,
}

/// [assistant] 段：助手默认值
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_prompt_tokens: u32,
    #[serde(default = "default_max_tokens")]
    pub max_completion_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    10_000
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    1.0
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_prompt_tokens: default_max_tokens(),
            max_completion_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

/// [vector_store] 段：向量库默认值
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreSection {
    #[serde(default = "default_store_name")]
    pub name: String,
    /// 过期窗口（整天）；0 表示不过期
    #[serde(default = "default_expire_days")]
    pub expire_days: u32,
}

fn default_store_name() -> String {
    "Vector_Storage".to_string()
}

fn default_expire_days() -> u32 {
    1
}

impl Default for VectorStoreSection {
    fn default() -> Self {
        Self {
            name: default_store_name(),
            expire_days: default_expire_days(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 APIARY__* 可覆盖
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("APIARY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 按 [api] 段构建客户端；Key 优先级：配置 > OPENAI_API_KEY > 占位符
pub fn build_client(api: &ApiSection) -> Client<OpenAIConfig> {
    let api_key = api
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let config = if let Some(ref url) = api.base_url {
        OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
    } else {
        OpenAIConfig::new().with_api_key(api_key)
    };

    Client::with_config(config)
}
