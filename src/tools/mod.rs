pub mod echo;
pub mod executor;
pub mod python;
pub mod registry;
pub mod schema;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use python::{PythonTool, PYTHON_TOOL_NAME};
pub use registry::{Tool, ToolRegistry, ToolRegistryBuilder};
pub use schema::parameters_schema_for;
