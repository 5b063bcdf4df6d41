use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::graph::{DataType, PathConfig, PathVariableConfig};
use switchboard_core::traits::Tool;
use switchboard_core::types::{ToolContext, ToolKind, ToolOutput};
use switchboard_tools::schema::slugify;

/// Stores one path variable in the session before the path's transfer.
pub struct VariableCaptureTool {
    name: String,
    description: String,
    path_id: String,
    variable: PathVariableConfig,
}

impl VariableCaptureTool {
    pub fn new(path: &PathConfig, variable: &PathVariableConfig) -> Self {
        let label = path.label();
        let variable_name = display_variable(variable);
        let description = variable
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Capture {} for path {}.", variable_name, label));

        Self {
            name: slugify(&format!("record_{}_{}", label, variable_name), "record_value"),
            description: format!("{} (Required).", description),
            path_id: path.id.clone(),
            variable: variable.clone(),
        }
    }

    /// Replace the generated name, e.g. to keep names unique on one agent.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path_id(&self) -> &str {
        &self.path_id
    }

    pub fn variable_name(&self) -> &str {
        &self.variable.name
    }
}

fn display_variable(variable: &PathVariableConfig) -> &str {
    if variable.name.is_empty() {
        "value"
    } else {
        variable.name.as_str()
    }
}

impl Tool for VariableCaptureTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        let value_type = match self.variable.data_type {
            DataType::Number | DataType::Integer | DataType::Boolean => self.variable.data_type.json_type(),
            _ => "string",
        };
        let description = self
            .variable
            .description
            .clone()
            .unwrap_or_else(|| format!("Value for {}.", display_variable(&self.variable)));
        json!({
            "type": "object",
            "properties": {
                "value": { "type": value_type, "description": description }
            },
            "required": ["value"],
            "additionalProperties": false,
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::VariableCapture
    }

    fn execute(&self, input: Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move {
            let args = input.as_object().ok_or_else(|| {
                SwitchboardError::ToolValidation(
                    "Invalid arguments payload for variable collection.".into(),
                )
            })?;
            let raw = args.get("value").ok_or_else(|| {
                SwitchboardError::ToolValidation("Parameter 'value' is required.".into())
            })?;

            let value = coerce_value(raw, self.variable.data_type)?;
            debug!(path_id = %self.path_id, variable = %self.variable.name, "Captured path variable");
            ctx.session
                .record_variable(&self.path_id, &self.variable.name, value);

            Ok(ToolOutput::Payload(json!({
                "stored": true,
                "path_id": self.path_id,
                "variable": self.variable.name,
            })))
        })
    }
}

/// Coerce a caller-supplied value to the variable's declared type.
pub fn coerce_value(value: &Value, data_type: DataType) -> Result<Value> {
    match data_type {
        DataType::Number => coerce_number(value)
            .map(Value::from)
            .ok_or_else(|| invalid("Value must be a number.")),
        DataType::Integer => coerce_integer(value)
            .map(Value::from)
            .ok_or_else(|| invalid("Value must be an integer.")),
        DataType::Boolean => coerce_bool(value)
            .map(Value::Bool)
            .ok_or_else(|| invalid("Value must be boolean (true/false).")),
        DataType::String | DataType::Object | DataType::Array => match value {
            Value::Null => Err(invalid("Value cannot be null.")),
            Value::String(s) => Ok(Value::String(s.clone())),
            other => Ok(Value::String(other.to_string())),
        },
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Integral values only; `3.5` is rejected rather than truncated.
fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn invalid(message: &str) -> SwitchboardError {
    SwitchboardError::ToolValidation(message.to_string())
}
