use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use switchboard_core::graph::ToolParameterConfig;

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static regex"))
}

/// Lower-case ASCII identifier: runs of anything but letters and digits become
/// a single `_`, leading and trailing `_` are dropped. Empty results fall back
/// to `fallback`.
pub fn slugify(input: &str, fallback: &str) -> String {
    let slug = non_alnum()
        .replace_all(input, "_")
        .trim_matches('_')
        .to_lowercase();
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// Integration tool name: slugified tool type plus the first eight
/// alphanumerics of the tool id, e.g. `gmail_send_email_1f2e3d4c`.
pub fn tool_name(tool_type: &str, tool_id: &str) -> String {
    let suffix: String = tool_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_lowercase();
    format!("{}_{}", slugify(&tool_type.replace('.', "_"), "tool"), suffix)
}

/// JSON Schema for a tool's arguments. Optional parameters are nullable and no
/// undeclared properties are accepted.
pub fn raw_schema(parameters: &[ToolParameterConfig]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in parameters {
        let base = param.data_type.json_type();
        let ty = if param.required {
            json!(base)
        } else {
            json!([base, "null"])
        };
        properties.insert(
            param.name.clone(),
            json!({ "type": ty, "description": param.description }),
        );
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false,
    });
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::graph::DataType;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Transfer to Billing!", "x"), "transfer_to_billing");
        assert_eq!(slugify("  --  ", "transfer"), "transfer");
        assert_eq!(slugify("Über Menü", "x"), "ber_men");
    }

    #[test]
    fn test_tool_name_uses_id_prefix() {
        assert_eq!(
            tool_name("airtable.find_record_by_field", "9A1B2C3D-4E5F-6789-abcd-ef0123456789"),
            "airtable_find_record_by_field_9a1b2c3d"
        );
        assert_eq!(tool_name("...", "t1"), "tool_t1");
    }

    #[test]
    fn test_raw_schema_nullable_optional() {
        let params = vec![
            ToolParameterConfig {
                name: "to".into(),
                description: "Recipients".into(),
                required: true,
                data_type: DataType::String,
            },
            ToolParameterConfig {
                name: "count".into(),
                description: String::new(),
                required: false,
                data_type: DataType::Integer,
            },
        ];
        let schema = raw_schema(&params);
        assert_eq!(schema["properties"]["to"]["type"], "string");
        assert_eq!(schema["properties"]["count"]["type"], json!(["integer", "null"]));
        assert_eq!(schema["required"], json!(["to"]));
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn test_raw_schema_without_required() {
        let schema = raw_schema(&[]);
        assert!(schema.get("required").is_none());
    }
}
