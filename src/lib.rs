//! Apiary - OpenAI Assistants API 编排层
//!
//! 模块划分：
//! - **assistant**: 助手配置（指令、模型、采样参数、工具声明、向量库引用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: 错误目录（按失败阶段分段的稳定数字错误码）
//! - **run**: 运行/流式编排状态机（事件分发、工具回调挂起、输出提交）
//! - **threads**: 会话目录（别名 -> 远端线程句柄，双射）
//! - **toolset**: 工具声明与函数参数 JSON Schema 生成
//! - **vector_store**: 检索索引托管（文件挂载、过期策略、替换/删除）

pub mod assistant;
pub mod config;
pub mod error;
pub mod run;
pub mod threads;
pub mod toolset;
pub mod vector_store;

pub use assistant::{Assistant, AssistantAttributes, AssistantSpec, ModelParams};
pub use config::{build_client, load_config, AppConfig};
pub use error::{lookup, CatalogEntry, ErrorRecord};
pub use run::{
    run_turn, EventStream, OpenAiRunTransport, RunEventSink, RunPhase, RunSession, RunTransport,
    StreamEvent, ToolInvocation, ToolOutput,
};
pub use threads::{ThreadDirectory, ThreadRecord};
pub use toolset::{FunctionTool, ToolDecl, ToolSet};
pub use vector_store::{FilePurpose, IndexAttributes, VectorIndex};
