//! The tool-execution surface (`spec.md` §4.1) and the registry/schema types
//! it depends on.

mod errors;
mod registry;
mod surface;
mod tool;

pub use errors::ToolExecutionError;
pub use registry::ToolRegistry;
pub use surface::{SurfaceError, ToolExecutionSurface};
pub use tool::{AsyncToolFn, Function, FunctionParameters, Property, Tool, ToolCall, ToolType};
