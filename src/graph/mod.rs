//! Graph declaration, compilation and the node contract (spec.md §4.2).

mod builder;
mod compile_error;
pub mod node;

pub use builder::{CompiledGraph, GraphBuilder};
pub use compile_error::CompilationError;
pub use node::{Node, NodeInput, NodeOutput, Router, RoutingDecision};
