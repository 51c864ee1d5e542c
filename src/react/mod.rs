//! 交互执行层：Planner 与调度主循环（推理器逐轮驱动原语菜单）

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::DispatchEvent;
pub use loop_::{dispatch, DispatchOutcome, DispatchSession, FALLBACK_RESPONSE, MAX_DISPATCH_ROUNDS};
pub use planner::{Planner, DEFAULT_SYSTEM_PROMPT};
