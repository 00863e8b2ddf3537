//! 认知层：推理步（Planner）与工具执行步（act），由 core::Orchestrator 驱动

pub mod act;
pub mod planner;

pub use act::{execute_tool_calls, ActOutcome};
pub use planner::Planner;
