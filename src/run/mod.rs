//! 运行/流式编排：事件、接收器、传输接缝与状态机

pub mod events;
pub mod orchestrator;
pub mod transport;

pub use events::{RunEventSink, StreamEvent, ToolInvocation, ToolOutput};
pub use orchestrator::{run_turn, RunPhase, RunSession};
pub use transport::{EventStream, OpenAiRunTransport, RunTransport};
