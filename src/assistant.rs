//! 助手配置：身份、指令、模型与采样参数、工具声明、向量库引用
//!
//! create 为本地构造后远端物化；adopt 为 fetch-then-overwrite：取回已有助手后
//! 用本地字段按类覆盖远端（名称 / 指令 / 模型采样 / 工具集各用独立错误码）。
//! delete 清空本地 id，之后的远端操作一律报 208。

use std::path::Path;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    CreateAssistantRequest, CreateAssistantToolFileSearchResources, CreateAssistantToolResources,
    ModifyAssistantRequest,
};
use async_openai::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AssistantSection;
use crate::error::ErrorRecord;
use crate::run::{run_turn, OpenAiRunTransport, RunEventSink};
use crate::toolset::ToolSet;
use crate::vector_store::{FilePurpose, IndexAttributes, VectorIndex};

/// 采样参数（范围按远端 API 约束本地校验）
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelParams {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
        }
    }
}

impl ModelParams {
    /// temperature ∈ [0, 2]，top_p ∈ (0, 1]；越界在任何网络调用前报 202
    pub fn validate(&self) -> Result<(), ErrorRecord> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ErrorRecord::emit(
                202,
                format!("temperature {} outside [0, 2]", self.temperature),
            ));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ErrorRecord::emit(
                202,
                format!("top_p {} outside (0, 1]", self.top_p),
            ));
        }
        Ok(())
    }
}

/// 助手的本地配置（create / adopt 的输入）
#[derive(Debug, Clone)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub toolset: ToolSet,
    pub model: String,
    pub params: ModelParams,
    pub max_prompt_tokens: u32,
    pub max_completion_tokens: u32,
    /// 内部向量库的过期窗口（整天；0 表示不过期）
    pub index_expire_days: u32,
}

impl AssistantSpec {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            toolset: ToolSet::new(),
            model: "gpt-4o-mini".to_string(),
            params: ModelParams::default(),
            max_prompt_tokens: 10_000,
            max_completion_tokens: 10_000,
            index_expire_days: 1,
        }
    }

    /// 用配置段的默认值起一个 spec
    pub fn from_config(
        section: &AssistantSection,
        name: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        let mut spec = Self::new(name, instructions);
        spec.model = section.model.clone();
        spec.params = ModelParams {
            temperature: section.temperature,
            top_p: section.top_p,
        };
        spec.max_prompt_tokens = section.max_prompt_tokens;
        spec.max_completion_tokens = section.max_completion_tokens;
        spec
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_toolset(mut self, toolset: ToolSet) -> Self {
        self.toolset = toolset;
        self
    }

    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_token_ceilings(mut self, max_prompt: u32, max_completion: u32) -> Self {
        self.max_prompt_tokens = max_prompt;
        self.max_completion_tokens = max_completion;
        self
    }

    pub fn with_index_expire_days(mut self, days: u32) -> Self {
        self.index_expire_days = days;
        self
    }
}

/// 属性快照（可序列化，供日志与调用方展示）
#[derive(Debug, Clone, Serialize)]
pub struct AssistantAttributes {
    pub id: String,
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_prompt_tokens: u32,
    pub max_completion_tokens: u32,
    pub tool_names: Vec<String>,
    pub vector_store: IndexAttributes,
}

/// 助手句柄：本地配置 + 远端 id + 内部向量库
pub struct Assistant {
    client: Client<OpenAIConfig>,
    id: Option<String>,
    spec: AssistantSpec,
    vector_index: VectorIndex,
}

impl Assistant {
    /// 本地构造并远端物化：先建内部向量库，file_search 工具自动补齐，
    /// 向量库作为 file_search 资源绑定到助手。
    pub async fn create(
        client: Client<OpenAIConfig>,
        mut spec: AssistantSpec,
    ) -> Result<Self, ErrorRecord> {
        spec.params.validate()?;
        spec.toolset.ensure_file_search();

        let index = VectorIndex::create(
            client.clone(),
            format!("{}_Vector_Store", spec.name),
            spec.index_expire_days,
        )
        .await?;
        let store_id = index
            .id()
            .ok_or_else(|| ErrorRecord::emit(401, "created index has no id"))?
            .to_string();

        let request = CreateAssistantRequest {
            model: spec.model.clone(),
            name: Some(spec.name.clone()),
            instructions: Some(spec.instructions.clone()),
            tools: Some(spec.toolset.to_api()),
            tool_resources: Some(file_search_resources(&store_id)),
            temperature: Some(spec.params.temperature),
            top_p: Some(spec.params.top_p),
            ..Default::default()
        };

        let created = client
            .assistants()
            .create(request)
            .await
            .map_err(|e| ErrorRecord::emit(204, e.to_string()))?;

        info!(id = %created.id, name = %spec.name, model = %spec.model, "assistant created");
        Ok(Self {
            client,
            id: Some(created.id),
            spec,
            vector_index: index,
        })
    }

    /// 接管一个已存在的远端助手：先 fetch（205），再用本地字段按类覆盖远端，
    /// 名称（200）、指令（201）、模型与采样（202）、工具集（206）各自独立提交。
    pub async fn adopt(
        client: Client<OpenAIConfig>,
        remote_id: &str,
        mut spec: AssistantSpec,
    ) -> Result<Self, ErrorRecord> {
        spec.params.validate()?;
        spec.toolset.ensure_file_search();

        client
            .assistants()
            .retrieve(remote_id)
            .await
            .map_err(|e| ErrorRecord::emit(205, e.to_string()))?;

        let index = VectorIndex::create(
            client.clone(),
            format!("{}_Vector_Store", spec.name),
            spec.index_expire_days,
        )
        .await?;

        let assistant = Self {
            client,
            id: Some(remote_id.to_string()),
            spec,
            vector_index: index,
        };

        assistant.push_name().await?;
        assistant.push_instructions().await?;
        assistant.push_model_params().await?;
        assistant.push_toolset().await?;

        info!(id = %remote_id, "assistant adopted and overwritten");
        Ok(assistant)
    }

    /// 把一组本地文件送入内部向量库。空输入报 207 且不触达索引；
    /// 单个文件失败即中止后续，但已完成的挂载保留（不回滚）。
    pub async fn attach_files<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
    ) -> Result<Vec<String>, ErrorRecord> {
        if paths.is_empty() {
            return Err(ErrorRecord::emit(207, "no file paths supplied"));
        }

        let mut ids = Vec::with_capacity(paths.len());
        for path in paths {
            let id = self
                .vector_index
                .attach_new_file(path, FilePurpose::Assistants.as_str())
                .await?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// 整体替换工具声明：远端成功后才更新本地，失败时本地保持原状（206）
    pub async fn update_tool_set(&mut self, toolset: ToolSet) -> Result<(), ErrorRecord> {
        let id = self.active_id("update_tool_set")?.to_string();

        self.client
            .assistants()
            .update(
                &id,
                ModifyAssistantRequest {
                    tools: Some(toolset.to_api()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ErrorRecord::emit(206, e.to_string()))?;

        self.spec.toolset = toolset;
        Ok(())
    }

    /// 删除远端助手并清空本地 id。内部向量库先删（失败只告警，不阻断）。
    pub async fn delete(&mut self, clear_index_files: bool) -> Result<(), ErrorRecord> {
        let id = self.active_id("delete")?.to_string();

        if self.vector_index.is_active() {
            if let Err(err) = self.vector_index.delete(clear_index_files).await {
                warn!(code = err.code, detail = %err.detail, "vector store deletion failed; deleting assistant anyway");
            }
        }

        let response = self
            .client
            .assistants()
            .delete(&id)
            .await
            .map_err(|e| ErrorRecord::emit(203, e.to_string()))?;
        if !response.deleted {
            return Err(ErrorRecord::emit(203, "remote reported deleted=false"));
        }

        info!(%id, "assistant deleted");
        self.id = None;
        Ok(())
    }

    /// 对 (thread, 本助手) 驱动一个编排回合，返回累计输出文本
    pub async fn stream_response<S>(
        &self,
        thread_id: &str,
        sink: &mut S,
    ) -> Result<String, ErrorRecord>
    where
        S: RunEventSink + ?Sized,
    {
        let assistant_id = self.active_id("stream_response")?.to_string();
        let transport = OpenAiRunTransport::new(self.client.clone()).with_token_ceilings(
            self.spec.max_prompt_tokens,
            self.spec.max_completion_tokens,
        );
        run_turn(&transport, thread_id, &assistant_id, sink).await
    }

    /// 属性快照；detached 句柄报 208
    pub fn attributes(&self) -> Result<AssistantAttributes, ErrorRecord> {
        let id = self.active_id("attributes")?.to_string();
        Ok(AssistantAttributes {
            id,
            name: self.spec.name.clone(),
            instructions: self.spec.instructions.clone(),
            model: self.spec.model.clone(),
            temperature: self.spec.params.temperature,
            top_p: self.spec.params.top_p,
            max_prompt_tokens: self.spec.max_prompt_tokens,
            max_completion_tokens: self.spec.max_completion_tokens,
            tool_names: self.spec.toolset.names(),
            vector_store: self.vector_index.attributes()?,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    pub fn spec(&self) -> &AssistantSpec {
        &self.spec
    }

    pub fn vector_index(&self) -> &VectorIndex {
        &self.vector_index
    }

    pub fn vector_index_mut(&mut self) -> &mut VectorIndex {
        &mut self.vector_index
    }

    async fn push_name(&self) -> Result<(), ErrorRecord> {
        let id = self.active_id("update_name")?;
        self.client
            .assistants()
            .update(
                id,
                ModifyAssistantRequest {
                    name: Some(self.spec.name.clone()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ErrorRecord::emit(200, e.to_string()))?;
        Ok(())
    }

    async fn push_instructions(&self) -> Result<(), ErrorRecord> {
        let id = self.active_id("update_instructions")?;
        self.client
            .assistants()
            .update(
                id,
                ModifyAssistantRequest {
                    instructions: Some(self.spec.instructions.clone()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ErrorRecord::emit(201, e.to_string()))?;
        Ok(())
    }

    async fn push_model_params(&self) -> Result<(), ErrorRecord> {
        let id = self.active_id("update_model_params")?;
        self.client
            .assistants()
            .update(
                id,
                ModifyAssistantRequest {
                    model: Some(self.spec.model.clone()),
                    temperature: Some(self.spec.params.temperature),
                    top_p: Some(self.spec.params.top_p),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ErrorRecord::emit(202, e.to_string()))?;
        Ok(())
    }

    async fn push_toolset(&self) -> Result<(), ErrorRecord> {
        let id = self.active_id("update_tool_set")?;
        let store_id = self.vector_index.id().map(str::to_string);
        self.client
            .assistants()
            .update(
                id,
                ModifyAssistantRequest {
                    tools: Some(self.spec.toolset.to_api()),
                    tool_resources: store_id.as_deref().map(file_search_resources),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ErrorRecord::emit(206, e.to_string()))?;
        Ok(())
    }

    fn active_id(&self, operation: &str) -> Result<&str, ErrorRecord> {
        match self.id.as_deref() {
            Some(id) => Ok(id),
            None => {
                warn!(operation, "operation on detached assistant handle");
                Err(ErrorRecord::emit(208, operation))
            }
        }
    }

    #[cfg(test)]
    fn stub(active: bool) -> Self {
        Self {
            client: Client::with_config(
                async_openai::config::OpenAIConfig::new().with_api_key("sk-test"),
            ),
            id: active.then(|| "asst_stub".to_string()),
            spec: AssistantSpec::new("Assistant", "You are a simple chat bot."),
            vector_index: VectorIndex::stub(true),
        }
    }
}

/// 把向量库绑定为 file_search 工具资源
fn file_search_resources(store_id: &str) -> CreateAssistantToolResources {
    CreateAssistantToolResources {
        file_search: Some(CreateAssistantToolFileSearchResources {
            vector_store_ids: Some(vec![store_id.to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_files_empty_input_fails_without_touching_index() {
        let mut assistant = Assistant::stub(true);
        let err = assistant.attach_files::<&str>(&[]).await.unwrap_err();
        assert_eq!(err.code, 207);
        assert_eq!(assistant.vector_index().file_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_files_unreadable_path_aborts() {
        let mut assistant = Assistant::stub(true);
        let err = assistant
            .attach_files(&["/no/such/file.txt"])
            .await
            .unwrap_err();
        assert_eq!(err.code, 403);
        assert_eq!(assistant.vector_index().file_count(), 0);
    }

    #[tokio::test]
    async fn test_detached_handle_rejects_remote_operations() {
        let mut assistant = Assistant::stub(false);
        let err = assistant.update_tool_set(ToolSet::new()).await.unwrap_err();
        assert_eq!(err.code, 208);

        struct NoopSink;
        #[async_trait::async_trait]
        impl RunEventSink for NoopSink {}
        let err = assistant
            .stream_response("thread_1", &mut NoopSink)
            .await
            .unwrap_err();
        assert_eq!(err.code, 208);

        assert_eq!(assistant.attributes().unwrap_err().code, 208);
    }

    #[test]
    fn test_model_params_validation() {
        assert!(ModelParams::default().validate().is_ok());
        let err = ModelParams {
            temperature: 3.0,
            top_p: 1.0,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.code, 202);
        let err = ModelParams {
            temperature: 1.0,
            top_p: 0.0,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.code, 202);
    }

    #[test]
    fn test_spec_defaults() {
        let spec = AssistantSpec::new("Example Assistant", "You are a simple chat bot.");
        assert_eq!(spec.model, "gpt-4o-mini");
        assert_eq!(spec.max_prompt_tokens, 10_000);
        assert_eq!(spec.max_completion_tokens, 10_000);
        assert_eq!(spec.index_expire_days, 1);
        assert!(spec.toolset.is_empty());
    }

    #[test]
    fn test_spec_builders() {
        let spec = AssistantSpec::new("A", "B")
            .with_model("gpt-4o")
            .with_token_ceilings(20_000, 8_000)
            .with_index_expire_days(0);
        assert_eq!(spec.model, "gpt-4o");
        assert_eq!(spec.max_prompt_tokens, 20_000);
        assert_eq!(spec.max_completion_tokens, 8_000);
        assert_eq!(spec.index_expire_days, 0);
    }
}
