//! Caller-argument parsing and static-configuration validation shared by the
//! integration builders.

use lettre::message::{Mailbox, Mailboxes};
use lettre::Address;
use serde_json::{Map, Value};

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::graph::{DataType, ToolParameterConfig};

/// First configured parameter whose name matches one of `aliases`, ignoring case.
pub fn find_parameter<'a>(
    parameters: &'a [ToolParameterConfig],
    aliases: &[&str],
) -> Option<&'a ToolParameterConfig> {
    parameters
        .iter()
        .find(|p| aliases.iter().any(|a| a.eq_ignore_ascii_case(&p.name)))
}

/// Keep a matched parameter's name (and description, when set) but force the
/// role's required flag and type; otherwise use the canonical defaults.
pub fn normalize_parameter(
    existing: Option<&ToolParameterConfig>,
    fallback_name: &str,
    description: &str,
    required: bool,
    data_type: DataType,
) -> ToolParameterConfig {
    match existing {
        Some(param) => ToolParameterConfig {
            name: param.name.clone(),
            description: if param.description.is_empty() {
                description.to_string()
            } else {
                param.description.clone()
            },
            required,
            data_type,
        },
        None => ToolParameterConfig {
            name: fallback_name.to_string(),
            description: description.to_string(),
            required,
            data_type,
        },
    }
}

/// The argument object of a tool call.
pub fn arguments(input: &Value) -> Result<&Map<String, Value>> {
    input
        .as_object()
        .ok_or_else(|| SwitchboardError::ToolValidation("Invalid arguments payload.".into()))
}

/// Trimmed string argument. A blank optional value reads as absent.
pub fn string_argument(
    args: &Map<String, Value>,
    field: &str,
    required: bool,
) -> Result<Option<String>> {
    match args.get(field) {
        None | Some(Value::Null) => {
            if required {
                Err(validation(format!("Parameter '{}' is required.", field)))
            } else {
                Ok(None)
            }
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                if required {
                    Err(validation(format!("Parameter '{}' cannot be empty.", field)))
                } else {
                    Ok(None)
                }
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(_) => Err(validation(format!(
            "Parameter '{}' must be provided as a string.",
            field
        ))),
    }
}

pub fn required_string(args: &Map<String, Value>, field: &str) -> Result<String> {
    string_argument(args, field, true)?
        .ok_or_else(|| validation(format!("Parameter '{}' is required.", field)))
}

/// `true/1/yes` and `false/0/no`, case-insensitive.
pub fn parse_bool_text(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub fn boolean_argument(args: &Map<String, Value>, field: &str) -> Result<Option<bool>> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => parse_bool_text(s)
            .map(Some)
            .ok_or_else(|| validation(format!("Parameter '{}' must be a boolean value.", field))),
        Some(_) => Err(validation(format!(
            "Parameter '{}' must be a boolean value.",
            field
        ))),
    }
}

/// Non-empty, with an `@` that is neither first nor last.
pub fn is_valid_address(address: &str) -> bool {
    address.contains('@') && !address.starts_with('@') && !address.ends_with('@')
}

/// Parse a comma-separated address list. Entries may be bare addresses or
/// `Display Name <address>`.
pub fn parse_email_addresses(raw: Option<&str>, field: &str, required: bool) -> Result<Vec<String>> {
    let Some(raw) = raw else {
        if required {
            return Err(validation(format!("Parameter '{}' is required.", field)));
        }
        return Ok(Vec::new());
    };

    let mailboxes: Vec<Mailbox> = match raw.parse::<Mailboxes>() {
        Ok(list) => list.into_iter().collect(),
        Err(_) => parse_entries(raw, field)?,
    };
    let addresses: Vec<String> = mailboxes.iter().map(|m| m.email.to_string()).collect();

    if addresses.is_empty() {
        if required {
            return Err(validation(format!(
                "Parameter '{}' must include at least one email address.",
                field
            )));
        }
        return Ok(addresses);
    }

    if let Some(bad) = addresses.iter().find(|a| !is_valid_address(a)) {
        return Err(invalid_address(field, bad));
    }
    Ok(addresses)
}

/// Entry-by-entry parse for lists `Mailboxes` rejects as a whole: blank
/// entries are skipped and the first bad entry is named.
fn parse_entries(raw: &str, field: &str) -> Result<Vec<Mailbox>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.parse::<Mailbox>().map_err(|_| invalid_address(field, entry)))
        .collect()
}

fn invalid_address(field: &str, address: &str) -> SwitchboardError {
    validation(format!(
        "Parameter '{}' contains an invalid email address: {}.",
        field, address
    ))
}

/// Optional email address from static configuration. Blank counts as absent.
pub fn config_email(value: Option<&Value>, field: &str) -> std::result::Result<Option<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => {
            let address = s.trim();
            if is_valid_address(address) && address.parse::<Address>().is_ok() {
                Ok(Some(address.to_string()))
            } else {
                Err(format!("Configuration '{}' must be a valid email address.", field))
            }
        }
        Some(_) => Err(format!("Configuration '{}' must be a non-empty string.", field)),
    }
}

pub fn config_bool(value: Option<&Value>, field: &str) -> std::result::Result<Option<bool>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => parse_bool_text(s)
            .map(Some)
            .ok_or_else(|| format!("Configuration '{}' must be a boolean value.", field)),
        Some(_) => Err(format!("Configuration '{}' must be a boolean value.", field)),
    }
}

pub fn config_string(value: Option<&Value>) -> Option<String> {
    value.and_then(|v| v.as_str()).map(str::to_string)
}

/// Clamp a configured count. Missing, non-numeric and non-positive values
/// give `default`; values above `ceiling` give `ceiling`.
pub fn clamp_limit(raw: Option<&Value>, default: u32, ceiling: u32) -> u32 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n < 1 => default,
        Some(n) if n > i64::from(ceiling) => ceiling,
        Some(n) => n as u32,
        None => default,
    }
}

/// Trimmed field name usable inside an Airtable formula reference.
pub fn validate_field_name(field_name: &str) -> std::result::Result<String, String> {
    let cleaned = field_name.trim();
    if cleaned.is_empty() {
        return Err("Field name cannot be empty.".into());
    }
    if cleaned.chars().any(|c| "{}\"'\n\r\t".contains(c)) {
        return Err("Field name contains invalid characters like braces or quotes.".into());
    }
    Ok(cleaned.to_string())
}

/// `{field} = "value"` with embedded double quotes doubled.
pub fn filter_formula(field_name: &str, value: &str) -> String {
    format!("{{{}}} = \"{}\"", field_name, value.replace('"', "\"\""))
}

fn validation(message: String) -> SwitchboardError {
    SwitchboardError::ToolValidation(message)
}
