//! 运行/流式编排状态机
//!
//! Idle -> Streaming -> (AwaitingToolOutputs -> Streaming)* -> Completed | Failed。
//! 一个状态值加一个逐事件转移函数：每条事件同步触发至多一次回调，
//! requires_action 整批交给一次工具回调，输出一次性提交后换流继续。
//! 本层不做任何自动重试。

use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::error::ErrorRecord;
use crate::run::events::{RunEventSink, StreamEvent};
use crate::run::transport::RunTransport;

/// 一次编排回合所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Streaming,
    /// 运行挂起，等待调用方补齐整批函数输出
    AwaitingToolOutputs,
    Completed,
    Failed,
}

/// 单回合会话状态：只存活一个编排回合，终态后即丢弃
#[derive(Debug)]
pub struct RunSession {
    pub thread_id: String,
    pub assistant_id: String,
    pub phase: RunPhase,
    pub run_id: Option<String>,
    /// 整个回合累计的输出文本（增量按到达顺序拼接）
    transcript: String,
    /// 当前文本块的累计（text_done 回调用）
    block: String,
}

impl RunSession {
    pub fn new(thread_id: impl Into<String>, assistant_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            assistant_id: assistant_id.into(),
            phase: RunPhase::Idle,
            run_id: None,
            transcript: String::new(),
            block: String::new(),
        }
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// 驱动一个完整的编排回合，返回累计的输出文本。
///
/// 挂起点只有两处：等待下一条流事件、等待工具回调返回。编排器不越过
/// requires_action 推进：整批输出提交成功之前不会回到 Streaming。
pub async fn run_turn<T, S>(
    transport: &T,
    thread_id: &str,
    assistant_id: &str,
    sink: &mut S,
) -> Result<String, ErrorRecord>
where
    T: RunTransport + ?Sized,
    S: RunEventSink + ?Sized,
{
    let mut session = RunSession::new(thread_id, assistant_id);

    let mut stream = match transport.open_run(thread_id, assistant_id).await {
        Ok(stream) => stream,
        Err(err) => {
            session.phase = RunPhase::Failed;
            warn!(thread_id, code = err.code, "failed to open run stream");
            return Err(err);
        }
    };
    session.phase = RunPhase::Streaming;

    loop {
        let Some(item) = stream.next().await else {
            // 流在终态之前耗尽：按流层故障处理
            session.phase = RunPhase::Failed;
            return Err(ErrorRecord::emit(
                303,
                "stream ended before a terminal run status",
            ));
        };
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                session.phase = RunPhase::Failed;
                return Err(err);
            }
        };

        sink.on_event(&event).await;

        match event {
            StreamEvent::Opened { run_id } => {
                debug!(%run_id, "run opened");
                session.run_id = Some(run_id);
            }
            StreamEvent::Status { .. } => {}
            StreamEvent::TextCreated => {
                session.block.clear();
                sink.on_text_created().await;
            }
            StreamEvent::TextDelta { value } => {
                session.block.push_str(&value);
                session.transcript.push_str(&value);
                sink.on_text_delta(&value).await;
            }
            StreamEvent::TextDone { text } => {
                // 以增量累计为准；无增量的块退回事件携带的全文
                let done = if session.block.is_empty() {
                    text
                } else {
                    std::mem::take(&mut session.block)
                };
                sink.on_text_done(&done).await;
            }
            StreamEvent::MessageDone { message_id } => {
                sink.on_message_done(&message_id).await;
            }
            StreamEvent::ToolCallsRequired { run_id, calls } => {
                info!(%run_id, count = calls.len(), "run requires tool outputs");
                session.phase = RunPhase::AwaitingToolOutputs;
                session.run_id = Some(run_id.clone());

                // 整批一次回调，回调跑完之前不再读流
                let outputs = sink.on_tool_calls_required(&run_id, &calls).await;

                match transport
                    .submit_tool_outputs(thread_id, &run_id, outputs)
                    .await
                {
                    Ok(next) => {
                        stream = next;
                        session.phase = RunPhase::Streaming;
                    }
                    Err(err) => {
                        session.phase = RunPhase::Failed;
                        return Err(err);
                    }
                }
            }
            StreamEvent::Completed { run_id } => {
                info!(%run_id, chars = session.transcript.len(), "run completed");
                session.phase = RunPhase::Completed;
                return Ok(std::mem::take(&mut session.transcript));
            }
            StreamEvent::Terminated { run_id, status } => {
                warn!(%run_id, %status, "run ended in failure state");
                session.phase = RunPhase::Failed;
                return Err(ErrorRecord::emit(302, &status));
            }
            StreamEvent::Done => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::events::{ToolInvocation, ToolOutput};
    use crate::run::transport::EventStream;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 脚本化传输：open_run / submit_tool_outputs 依次弹出预置事件序列
    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Vec<Result<StreamEvent, ErrorRecord>>>>,
        submissions: Mutex<Vec<(String, Vec<ToolOutput>)>>,
        open_failure: Option<ErrorRecord>,
        submit_failure: Option<ErrorRecord>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Vec<Result<StreamEvent, ErrorRecord>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into_iter().collect()),
                submissions: Mutex::new(Vec::new()),
                open_failure: None,
                submit_failure: None,
            }
        }

        fn failing_open(err: ErrorRecord) -> Self {
            let mut t = Self::new(Vec::new());
            t.open_failure = Some(err);
            t
        }

        fn pop_script(&self) -> EventStream {
            let events = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
            Box::pin(futures_util::stream::iter(events))
        }
    }

    #[async_trait]
    impl RunTransport for ScriptedTransport {
        async fn open_run(
            &self,
            _thread_id: &str,
            _assistant_id: &str,
        ) -> Result<EventStream, ErrorRecord> {
            if let Some(err) = &self.open_failure {
                return Err(err.clone());
            }
            Ok(self.pop_script())
        }

        async fn submit_tool_outputs(
            &self,
            _thread_id: &str,
            run_id: &str,
            outputs: Vec<ToolOutput>,
        ) -> Result<EventStream, ErrorRecord> {
            self.submissions
                .lock()
                .unwrap()
                .push((run_id.to_string(), outputs));
            if let Some(err) = &self.submit_failure {
                return Err(err.clone());
            }
            Ok(self.pop_script())
        }
    }

    /// 记录回调触发顺序的接收器
    #[derive(Default)]
    struct RecordingSink {
        trace: Vec<String>,
        handler_invocations: usize,
        outputs_to_return: Vec<ToolOutput>,
    }

    #[async_trait]
    impl RunEventSink for RecordingSink {
        async fn on_event(&mut self, _event: &StreamEvent) {
            self.trace.push("event".to_string());
        }

        async fn on_text_created(&mut self) {
            self.trace.push("text_created".to_string());
        }

        async fn on_text_delta(&mut self, delta: &str) {
            self.trace.push(format!("delta:{}", delta));
        }

        async fn on_text_done(&mut self, text: &str) {
            self.trace.push(format!("text_done:{}", text));
        }

        async fn on_message_done(&mut self, message_id: &str) {
            self.trace.push(format!("message_done:{}", message_id));
        }

        async fn on_tool_calls_required(
            &mut self,
            _run_id: &str,
            calls: &[ToolInvocation],
        ) -> Vec<ToolOutput> {
            self.handler_invocations += 1;
            self.trace.push(format!("tool_calls:{}", calls.len()));
            self.outputs_to_return.clone()
        }
    }

    fn text_turn(deltas: &[&str], full: &str) -> Vec<Result<StreamEvent, ErrorRecord>> {
        let mut events = vec![
            Ok(StreamEvent::Opened {
                run_id: "run_1".to_string(),
            }),
            Ok(StreamEvent::TextCreated),
        ];
        events.extend(deltas.iter().map(|d| {
            Ok(StreamEvent::TextDelta {
                value: d.to_string(),
            })
        }));
        events.push(Ok(StreamEvent::TextDone {
            text: full.to_string(),
        }));
        events.push(Ok(StreamEvent::MessageDone {
            message_id: "msg_1".to_string(),
        }));
        events.push(Ok(StreamEvent::Completed {
            run_id: "run_1".to_string(),
        }));
        events
    }

    #[tokio::test]
    async fn test_transcript_is_delta_concatenation_in_arrival_order() {
        let transport = ScriptedTransport::new(vec![text_turn(&["Hel", "lo", " world"], "")]);
        let mut sink = RecordingSink::default();

        let out = run_turn(&transport, "t", "a", &mut sink).await.unwrap();
        assert_eq!(out, "Hello world");
        assert!(sink.trace.contains(&"text_done:Hello world".to_string()));
    }

    #[tokio::test]
    async fn test_callback_ordering_within_one_block() {
        let transport = ScriptedTransport::new(vec![text_turn(&["a", "b"], "")]);
        let mut sink = RecordingSink::default();
        run_turn(&transport, "t", "a", &mut sink).await.unwrap();

        let positions: Vec<usize> = ["text_created", "delta:a", "delta:b", "text_done:ab"]
            .iter()
            .map(|tag| sink.trace.iter().position(|t| t == *tag).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted, "trace: {:?}", sink.trace);

        let message_done = sink
            .trace
            .iter()
            .position(|t| t == "message_done:msg_1")
            .unwrap();
        assert!(message_done > positions[3]);
    }

    #[tokio::test]
    async fn test_open_failure_maps_to_301() {
        let transport = ScriptedTransport::failing_open(ErrorRecord::emit(301, "boom"));
        let mut sink = RecordingSink::default();
        let err = run_turn(&transport, "t", "a", &mut sink).await.unwrap_err();
        assert_eq!(err.code, 301);
    }

    #[tokio::test]
    async fn test_terminal_failure_interpolates_status() {
        let transport = ScriptedTransport::new(vec![vec![
            Ok(StreamEvent::Opened {
                run_id: "run_1".to_string(),
            }),
            Ok(StreamEvent::Terminated {
                run_id: "run_1".to_string(),
                status: "expired".to_string(),
            }),
        ]]);
        let mut sink = RecordingSink::default();
        let err = run_turn(&transport, "t", "a", &mut sink).await.unwrap_err();
        assert_eq!(err.code, 302);
        assert!(err.message.contains("expired"));
    }

    #[tokio::test]
    async fn test_stream_item_error_maps_to_303() {
        let transport = ScriptedTransport::new(vec![vec![
            Ok(StreamEvent::Opened {
                run_id: "run_1".to_string(),
            }),
            Err(ErrorRecord::emit(303, "connection reset")),
        ]]);
        let mut sink = RecordingSink::default();
        let err = run_turn(&transport, "t", "a", &mut sink).await.unwrap_err();
        assert_eq!(err.code, 303);
    }

    #[tokio::test]
    async fn test_premature_stream_end_is_a_stream_failure() {
        let transport = ScriptedTransport::new(vec![vec![Ok(StreamEvent::Opened {
            run_id: "run_1".to_string(),
        })]]);
        let mut sink = RecordingSink::default();
        let err = run_turn(&transport, "t", "a", &mut sink).await.unwrap_err();
        assert_eq!(err.code, 303);
    }

    #[tokio::test]
    async fn test_batch_of_k_calls_yields_one_handler_invocation() {
        let calls: Vec<ToolInvocation> = (0..3)
            .map(|i| ToolInvocation {
                id: format!("call_{}", i),
                name: "f".to_string(),
                arguments: "{}".to_string(),
            })
            .collect();
        let transport = ScriptedTransport::new(vec![
            vec![
                Ok(StreamEvent::Opened {
                    run_id: "run_1".to_string(),
                }),
                Ok(StreamEvent::ToolCallsRequired {
                    run_id: "run_1".to_string(),
                    calls,
                }),
            ],
            text_turn(&["done"], ""),
        ]);
        let mut sink = RecordingSink::default();
        sink.outputs_to_return = (0..3)
            .map(|i| ToolOutput {
                tool_call_id: format!("call_{}", i),
                output: "ok".to_string(),
            })
            .collect();

        let out = run_turn(&transport, "t", "a", &mut sink).await.unwrap();
        assert_eq!(out, "done");
        assert_eq!(sink.handler_invocations, 1);

        let submissions = transport.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0, "run_1");
        assert_eq!(submissions[0].1.len(), 3);
    }

    #[tokio::test]
    async fn test_submit_failure_does_not_complete() {
        let transport = {
            let mut t = ScriptedTransport::new(vec![vec![
                Ok(StreamEvent::Opened {
                    run_id: "run_1".to_string(),
                }),
                Ok(StreamEvent::ToolCallsRequired {
                    run_id: "run_1".to_string(),
                    calls: vec![ToolInvocation {
                        id: "call_0".to_string(),
                        name: "f".to_string(),
                        arguments: "{}".to_string(),
                    }],
                }),
            ]]);
            t.submit_failure = Some(ErrorRecord::emit(303, "rejected"));
            t
        };
        let mut sink = RecordingSink::default();
        let err = run_turn(&transport, "t", "a", &mut sink).await.unwrap_err();
        assert_eq!(err.code, 303);
    }

    #[tokio::test]
    async fn test_requires_action_can_repeat_within_one_turn() {
        let call = |id: &str| {
            vec![
                Ok(StreamEvent::Opened {
                    run_id: "run_1".to_string(),
                }),
                Ok(StreamEvent::ToolCallsRequired {
                    run_id: "run_1".to_string(),
                    calls: vec![ToolInvocation {
                        id: id.to_string(),
                        name: "f".to_string(),
                        arguments: "{}".to_string(),
                    }],
                }),
            ]
        };
        let transport = ScriptedTransport::new(vec![
            call("call_a"),
            call("call_b"),
            text_turn(&["final"], ""),
        ]);
        let mut sink = RecordingSink::default();
        sink.outputs_to_return = vec![ToolOutput {
            tool_call_id: "call_x".to_string(),
            output: "21C".to_string(),
        }];

        let out = run_turn(&transport, "t", "a", &mut sink).await.unwrap();
        assert_eq!(out, "final");
        assert_eq!(sink.handler_invocations, 2);
        assert_eq!(transport.submissions.lock().unwrap().len(), 2);
    }
}
