//! 运行传输层：打开流式运行、提交工具输出，并将线格式事件转为领域事件
//!
//! RunTransport 是编排器与远端之间的接缝：OpenAiRunTransport 走真实 API，
//! 测试用脚本化实现喂入合成事件序列。

use std::pin::Pin;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    AssistantStreamEvent, CreateRunRequest, MessageContent, MessageDeltaContent, RunObject,
    SubmitToolOutputsRunRequest, ToolsOutputs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::error::ErrorRecord;
use crate::run::events::{StreamEvent, ToolInvocation, ToolOutput};

/// 领域事件流（条目错误统一为 303 目录错误）
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ErrorRecord>> + Send>>;

/// 编排器消费的传输接缝
#[async_trait]
pub trait RunTransport: Send + Sync {
    /// 对 (thread, assistant) 打开一次流式运行；失败报 301
    async fn open_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<EventStream, ErrorRecord>;

    /// 整批提交函数输出并恢复流；失败报 303
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<EventStream, ErrorRecord>;
}

/// 真实 API 传输实现
pub struct OpenAiRunTransport {
    client: Client<OpenAIConfig>,
    max_prompt_tokens: Option<u32>,
    max_completion_tokens: Option<u32>,
}

impl OpenAiRunTransport {
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self {
            client,
            max_prompt_tokens: None,
            max_completion_tokens: None,
        }
    }

    /// 设置每次运行的 token 上限（来自助手配置）
    pub fn with_token_ceilings(mut self, max_prompt: u32, max_completion: u32) -> Self {
        self.max_prompt_tokens = Some(max_prompt);
        self.max_completion_tokens = Some(max_completion);
        self
    }
}

#[async_trait]
impl RunTransport for OpenAiRunTransport {
    async fn open_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<EventStream, ErrorRecord> {
        let request = CreateRunRequest {
            assistant_id: assistant_id.to_string(),
            max_prompt_tokens: self.max_prompt_tokens,
            max_completion_tokens: self.max_completion_tokens,
            ..Default::default()
        };

        let stream = self
            .client
            .threads()
            .runs(thread_id)
            .create_stream(request)
            .await
            .map_err(|e| ErrorRecord::emit(301, e.to_string()))?;
        Ok(adapt(stream))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<EventStream, ErrorRecord> {
        debug!(run_id, count = outputs.len(), "submitting tool outputs");
        let request = SubmitToolOutputsRunRequest {
            tool_outputs: outputs
                .into_iter()
                .map(|o| ToolsOutputs {
                    tool_call_id: Some(o.tool_call_id),
                    output: Some(o.output),
                })
                .collect(),
            stream: None,
        };

        let stream = self
            .client
            .threads()
            .runs(thread_id)
            .submit_tool_outputs_stream(run_id, request)
            .await
            .map_err(|e| ErrorRecord::emit(303, e.to_string()))?;
        Ok(adapt(stream))
    }
}

/// 把 SDK 事件流适配成领域事件流
fn adapt<S>(stream: S) -> EventStream
where
    S: Stream<Item = Result<AssistantStreamEvent, OpenAIError>> + Send + 'static,
{
    Box::pin(stream.flat_map(|item| {
        let events = match item {
            Ok(ev) => convert(ev),
            Err(e) => vec![Err(ErrorRecord::emit(303, e.to_string()))],
        };
        futures_util::stream::iter(events)
    }))
}

/// 线格式事件 -> 零或多条领域事件。
/// message.completed 在线格式里没有独立的 text.done，这里拆成 TextDone + MessageDone 两条。
fn convert(event: AssistantStreamEvent) -> Vec<Result<StreamEvent, ErrorRecord>> {
    match event {
        AssistantStreamEvent::ThreadRunCreated(run) => {
            vec![Ok(StreamEvent::Opened { run_id: run.id })]
        }
        AssistantStreamEvent::ThreadRunQueued(_) => vec![Ok(StreamEvent::Status {
            status: "queued".to_string(),
        })],
        AssistantStreamEvent::ThreadRunInProgress(_) => vec![Ok(StreamEvent::Status {
            status: "in_progress".to_string(),
        })],
        AssistantStreamEvent::ThreadRunRequiresAction(run) => {
            let calls = extract_tool_calls(&run);
            vec![Ok(StreamEvent::ToolCallsRequired {
                run_id: run.id,
                calls,
            })]
        }
        AssistantStreamEvent::ThreadRunCompleted(run) => {
            vec![Ok(StreamEvent::Completed { run_id: run.id })]
        }
        AssistantStreamEvent::ThreadRunFailed(run) => vec![Ok(terminated(run, "failed"))],
        AssistantStreamEvent::ThreadRunCancelled(run) => vec![Ok(terminated(run, "cancelled"))],
        AssistantStreamEvent::ThreadRunExpired(run) => vec![Ok(terminated(run, "expired"))],
        AssistantStreamEvent::ThreadMessageCreated(_) => vec![Ok(StreamEvent::TextCreated)],
        AssistantStreamEvent::ThreadMessageDelta(delta) => delta
            .delta
            .content
            .into_iter()
            .flatten()
            .filter_map(|content| match content {
                MessageDeltaContent::Text(text) => text
                    .text
                    .and_then(|t| t.value)
                    .map(|value| Ok(StreamEvent::TextDelta { value })),
                _ => None,
            })
            .collect(),
        AssistantStreamEvent::ThreadMessageCompleted(message) => {
            let text: String = message
                .content
                .iter()
                .filter_map(|c| match c {
                    MessageContent::Text(t) => Some(t.text.value.clone()),
                    _ => None,
                })
                .collect();
            vec![
                Ok(StreamEvent::TextDone { text }),
                Ok(StreamEvent::MessageDone {
                    message_id: message.id,
                }),
            ]
        }
        // run step 等事件不进入领域事件
        _ => Vec::new(),
    }
}

fn terminated(run: RunObject, status: &str) -> StreamEvent {
    StreamEvent::Terminated {
        run_id: run.id,
        status: status.to_string(),
    }
}

/// 把 requires_action 里待提交的全部调用取成一个批次
fn extract_tool_calls(run: &RunObject) -> Vec<ToolInvocation> {
    run.required_action
        .as_ref()
        .map(|ra| {
            ra.submit_tool_outputs
                .tool_calls
                .iter()
                .map(|tc| ToolInvocation {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    arguments: tc.function.arguments.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}
