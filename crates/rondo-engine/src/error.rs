//! Error type for engine assembly.

use rondo_core::{GraphError, ProcessorError};
use rondo_source::SourceError;

/// Errors from building and wiring a session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A connection or node operation failed validation.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Source content could not be loaded or bound.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A unit refused to be created or prepared.
    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// The graph refused a node.
    #[error("Node rejected: {0}")]
    NodeRejected(String),

    /// The engine configuration is unusable.
    #[error("Config error: {0}")]
    Config(#[from] rondo_config::ConfigError),

    /// The factory has no unit of this kind.
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    /// The plugin loader thread could not be started.
    #[error("Loader thread failed to start: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_wraps_inner() {
        let err = EngineError::from(GraphError::CycleDetected);
        assert_eq!(
            err.to_string(),
            "Graph error: adding this connection would create a cycle"
        );
        let err = EngineError::UnknownPlugin("fuzz".into());
        assert_eq!(err.to_string(), "Unknown plugin: fuzz");
    }
}
