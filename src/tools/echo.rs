//! echo：原样返回文本，用于连通性自检

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tools::schema::{parse_args, schema_of};
use crate::tools::{Tool, ToolOutcome};

#[derive(Deserialize, JsonSchema)]
struct EchoArgs {
    /// Texto a ser devolvido
    #[serde(default)]
    text: String,
}

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Devolve o texto recebido. Útil para testar se as ferramentas estão funcionando."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<EchoArgs>()
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolOutcome {
        match parse_args::<EchoArgs>(args) {
            Ok(a) => ToolOutcome::ok(json!({ "text": a.text })),
            Err(e) => ToolOutcome::invalid_arguments(e),
        }
    }
}
