//! Structured events the assistant emits while it gathers a mission.
//!
//! The remote model speaks in function calls with loosely typed JSON
//! arguments. They are validated here, at the boundary, into [`ToolCall`]
//! before anything touches the entry form.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ToolCallError;
use crate::form::FormField;

pub const UPDATE_FIELD_TOOL: &str = "update_task_field";
pub const COMMIT_TOOL: &str = "launch_mission";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolCall {
    UpdateField { field: FormField, value: String },
    Commit,
}

impl ToolCall {
    /// Validate a raw function call (`name` + JSON `args`).
    pub fn from_function_call(name: &str, args: &Value) -> Result<Self, ToolCallError> {
        match name {
            COMMIT_TOOL => Ok(ToolCall::Commit),
            UPDATE_FIELD_TOOL => {
                let obj = args.as_object().ok_or_else(|| ToolCallError::BadArguments {
                    tool: name.to_string(),
                    message: "arguments must be an object".to_string(),
                })?;

                let field_raw = obj
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolCallError::BadArguments {
                        tool: name.to_string(),
                        message: "missing 'field'".to_string(),
                    })?;
                let field = field_raw
                    .parse::<FormField>()
                    .map_err(|_| ToolCallError::UnknownField(field_raw.to_string()))?;

                // models sometimes send numbers/bools for "time" or "alarm"
                let value = match obj.get("value") {
                    Some(Value::String(s)) => s.clone(),
                    Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
                    _ => {
                        return Err(ToolCallError::BadArguments {
                            tool: name.to_string(),
                            message: "missing 'value'".to_string(),
                        });
                    }
                };

                Ok(ToolCall::UpdateField { field, value })
            }
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }
}

/// Function declarations advertised to the model.
pub fn function_declarations() -> Value {
    json!([
        {
            "name": UPDATE_FIELD_TOOL,
            "description": "Update one field of the mission being entered.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "field": {
                        "type": "STRING",
                        "enum": ["objective", "category", "priority", "time", "date", "alarm"]
                    },
                    "value": { "type": "STRING" }
                },
                "required": ["field", "value"]
            }
        },
        {
            "name": COMMIT_TOOL,
            "description": "Save the mission once every field has been gathered.",
            "parameters": { "type": "OBJECT", "properties": {} }
        }
    ])
}
