//! Core domain types: messages, tool calls, supervisor state

mod message;
mod state;
mod tool_call;

pub use message::{last_content, Message, Role};
pub use state::{
    AgentOutcome, AgentSlice, EscalationContext, EscalationReason, SupervisorState,
};
pub use tool_call::{ToolCall, ToolDefinition};
