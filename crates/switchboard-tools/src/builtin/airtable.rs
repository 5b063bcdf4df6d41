use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use switchboard_core::error::Result;
use switchboard_core::graph::{DataType, ToolConfig, ToolParameterConfig, WorkflowGraph};
use switchboard_core::traits::Tool;
use switchboard_core::types::{ToolContext, ToolOutput};

use super::{provider_error, read_body, tool_description, transport_error};
use crate::params::{self, clamp_limit, filter_formula, validate_field_name};
use crate::registry::{IntegrationEnv, ToolBuilder};
use crate::retry::with_auth_retry;
use crate::schema::{raw_schema, tool_name};

pub const TOOL_TYPE: &str = "airtable.find_record_by_field";
const PROVIDER: &str = "airtable";
const LABEL: &str = "Airtable";

const SEARCH_ALIASES: &[&str] = &["searchValue", "search_value", "value", "lookupValue", "recordValue"];

pub struct AirtableFindRecordBuilder {
    env: Arc<IntegrationEnv>,
}

impl AirtableFindRecordBuilder {
    pub fn new(env: Arc<IntegrationEnv>) -> Self {
        Self { env }
    }
}

fn config_text<'a>(tool: &'a ToolConfig, key: &str) -> Option<&'a str> {
    tool.config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

impl ToolBuilder for AirtableFindRecordBuilder {
    fn build(&self, tool: &ToolConfig, _graph: &WorkflowGraph) -> Option<Arc<dyn Tool>> {
        let Some(base_id) = config_text(tool, "baseId") else {
            warn!(tool_id = %tool.id, "Airtable tool missing baseId; skipping registration");
            return None;
        };
        let Some(table_id) = config_text(tool, "tableId") else {
            warn!(tool_id = %tool.id, "Airtable tool missing tableId; skipping registration");
            return None;
        };
        let Some(raw_field) = config_text(tool, "fieldName").or_else(|| config_text(tool, "field")) else {
            warn!(tool_id = %tool.id, "Airtable tool missing fieldName; skipping registration");
            return None;
        };
        let field_name = match validate_field_name(raw_field) {
            Ok(name) => name,
            Err(reason) => {
                warn!(tool_id = %tool.id, %reason, "Airtable tool has invalid fieldName; skipping registration");
                return None;
            }
        };

        let limits = &self.env.config.airtable;
        let max_records = clamp_limit(
            tool.config.get("maxRecords"),
            limits.default_max_records,
            limits.max_records_limit,
        );

        let search_param = match params::find_parameter(&tool.runtime_parameters, SEARCH_ALIASES) {
            Some(found) => params::normalize_parameter(
                Some(found),
                "searchValue",
                "Provide the value to search for.",
                true,
                DataType::String,
            ),
            None => params::normalize_parameter(
                None,
                "searchValue",
                "Value provided by the caller to look up a record.",
                true,
                DataType::String,
            ),
        };

        Some(Arc::new(AirtableFindRecordTool {
            name: tool_name(&tool.tool_type, &tool.id),
            description: tool_description(tool, "Use this Airtable operation when appropriate."),
            base_id: base_id.to_string(),
            table_id: table_id.to_string(),
            field_name,
            max_records,
            search_param,
            env: self.env.clone(),
        }))
    }
}

/// Looks up records whose `field_name` equals the caller's value.
pub struct AirtableFindRecordTool {
    name: String,
    description: String,
    base_id: String,
    table_id: String,
    field_name: String,
    max_records: u32,
    search_param: ToolParameterConfig,
    env: Arc<IntegrationEnv>,
}

impl AirtableFindRecordTool {
    fn table_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.env.config.airtable.api_base.trim_end_matches('/'),
            urlencoding::encode(&self.base_id),
            urlencoding::encode(&self.table_id)
        )
    }

    async fn query(&self, access_token: String, url: &str, formula: &str) -> Result<Value> {
        let max_records = self.max_records.to_string();
        let resp = self
            .env
            .http
            .get(url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .query(&[("filterByFormula", formula), ("maxRecords", max_records.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(LABEL, e))?;

        let status = resp.status();
        let body = read_body(resp).await;
        if status.is_success() {
            Ok(body)
        } else {
            Err(provider_error(LABEL, status.as_u16(), &body, "Airtable request failed."))
        }
    }
}

impl Tool for AirtableFindRecordTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        raw_schema(std::slice::from_ref(&self.search_param))
    }

    fn execute(&self, input: Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move {
            let args = params::arguments(&input)?;
            let search_value = params::required_string(args, &self.search_param.name)?;

            let url = self.table_url();
            let formula = filter_formula(&self.field_name, &search_value);
            debug!(tool = %self.name, base_id = %self.base_id, table_id = %self.table_id, "Querying Airtable");

            let payload = with_auth_retry(
                &self.env.credentials,
                &ctx.organization_id,
                PROVIDER,
                |token| self.query(token, &url, &formula).boxed(),
            )
            .await?;

            let records = payload
                .get("records")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let count = records.len();

            Ok(ToolOutput::Payload(json!({
                "matched": count > 0,
                "count": count,
                "records": records,
                "baseId": self.base_id,
                "tableId": self.table_id,
                "fieldName": self.field_name,
                "searchValue": search_value,
                "maxRecords": self.max_records,
            })))
        })
    }
}
