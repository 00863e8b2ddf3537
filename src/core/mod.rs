//! 核心编排层：错误、线程状态与守卫、线程监管、工具工作池、状态机主循环

pub mod error;
pub mod orchestrator;
pub mod session_supervisor;
pub mod state;
pub mod task_scheduler;

pub use error::{AgentError, ToolFailure};
pub use orchestrator::{Orchestrator, TurnOutcome, DEFAULT_MAX_STEPS};
pub use session_supervisor::{SessionSupervisor, TurnPermit};
pub use state::{AgentState, HaltReason, Phase, ToolStatus, STOPPED_MESSAGE};
pub use task_scheduler::{panic_message, TaskScheduler};
