//! The built-in node set (spec.md §4.7–§4.6, §2 "Built-in nodes"):
//! `preModel` (compaction), `model` (stream collection + deterministic
//! rewrite), `toolGate` (approval policy), `toolExecute` (sequential tool
//! invocation).

mod model;
mod pre_model;
mod tool_execute;
mod tool_gate;

pub use model::{model_router, ModelNode, MODEL_NODE_ID};
pub use pre_model::{PreModelNode, PRE_MODEL_NODE_ID};
pub use tool_execute::{ToolExecuteNode, TOOL_EXECUTE_NODE_ID};
pub use tool_gate::{ToolGateNode, TOOL_GATE_NODE_ID};
