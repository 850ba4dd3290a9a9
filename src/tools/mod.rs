//! 工具箱：注册表、执行器与内置能力（calculate、echo、文件、命令、网页、启动程序、键盘输入）

pub mod calculator;
pub mod echo;
pub mod executor;
pub mod filesystem;
pub mod keyboard;
pub mod process;
pub mod registry;
pub mod schema;
pub mod shell;
pub mod web;

pub use calculator::CalculatorTool;
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use filesystem::{ListDirectoryTool, ReadFileTool, SafeFs};
pub use keyboard::TypeTextTool;
pub use process::OpenProgramTool;
pub use registry::{FunctionDefinition, Tool, ToolDefinition, ToolDescriptor, ToolOutcome, ToolRegistry};
pub use schema::schema_of;
pub use shell::ShellTool;
pub use web::FetchWebpageTool;
