//! 运行流事件与事件接收器
//!
//! StreamEvent 是与传输层解耦的领域事件（由 RunTransport 从线格式转换而来）；
//! RunEventSink 的六个回调全部给默认实现，调用方只覆盖需要的部分。

use async_trait::async_trait;
use serde::Serialize;

/// 助手请求执行的一次函数调用（requires_action 批次中的一条）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// JSON 编码的实参
    pub arguments: String,
}

/// 调用方对一条函数调用给出的输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// 一次运行流中的领域事件（按到达顺序逐条交给编排器）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// 运行已创建
    Opened { run_id: String },
    /// 非终态状态推进（queued / in_progress / cancelling 等）
    Status { status: String },
    /// 一个文本块开始
    TextCreated,
    /// 文本增量
    TextDelta { value: String },
    /// 文本块结束（text 为该块全文，增量缺失时兜底）
    TextDone { text: String },
    /// 一条消息完成
    MessageDone { message_id: String },
    /// 运行挂起，等待整批函数输出
    ToolCallsRequired {
        run_id: String,
        calls: Vec<ToolInvocation>,
    },
    /// 运行成功结束
    Completed { run_id: String },
    /// 运行以失败 / 取消 / 过期等终态结束
    Terminated { run_id: String, status: String },
    /// 当前流收尾
    Done,
}

/// 事件接收器：每个事件先进 on_event，再按类型进对应回调；
/// 同一运行内回调严格串行、按到达顺序触发。
#[async_trait]
pub trait RunEventSink: Send {
    /// 任意事件（在具体回调之前触发）
    async fn on_event(&mut self, _event: &StreamEvent) {}

    async fn on_text_created(&mut self) {}

    async fn on_text_delta(&mut self, _delta: &str) {}

    /// 每个文本块恰好触发一次，携带该块全文
    async fn on_text_done(&mut self, _text: &str) {}

    async fn on_message_done(&mut self, _message_id: &str) {}

    /// 整批待执行的函数调用（每次 requires_action 只触发一次）。
    /// 返回的输出列表由编排器一次性提交；默认空列表，缺失的调用 id 由远端拒绝。
    async fn on_tool_calls_required(
        &mut self,
        _run_id: &str,
        _calls: &[ToolInvocation],
    ) -> Vec<ToolOutput> {
        Vec::new()
    }
}
