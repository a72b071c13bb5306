//! Graph compilation errors (spec.md §4.2).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilationError {
    #[error("start frontier must be non-empty")]
    EmptyStartFrontier,

    #[error("edge references unregistered node {0}")]
    UnknownEdgeTarget(String),

    #[error("start frontier references unregistered node {0}")]
    UnknownStartNode(String),

    #[error("router registered on unregistered node {0}")]
    RouterOnUnknownNode(String),

    #[error("node {0} is unreachable from the start frontier")]
    UnreachableNode(String),

    #[error("node id {0} is registered more than once")]
    DuplicateNodeId(String),
}
