#[derive(Debug)]
pub enum ToolExecutionError {
    ArgumentParsing(String),
    ExecutionFailed(String),
    ToolNotFound(String),
}

impl std::fmt::Display for ToolExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolExecutionError::ArgumentParsing(s) => write!(f, "tool argument parsing error: {s}"),
            ToolExecutionError::ExecutionFailed(s) => write!(f, "tool execution failed: {s}"),
            ToolExecutionError::ToolNotFound(s) => write!(f, "tool not found: {s}"),
        }
    }
}

impl std::error::Error for ToolExecutionError {}
