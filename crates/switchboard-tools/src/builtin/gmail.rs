use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::graph::{DataType, ToolConfig, ToolParameterConfig, WorkflowGraph};
use switchboard_core::traits::Tool;
use switchboard_core::types::{ToolContext, ToolOutput};

use super::message::OutgoingEmail;
use super::{provider_error, read_body, tool_description, transport_error};
use crate::params::{self, clamp_limit, config_bool, config_email, config_string};
use crate::registry::{IntegrationEnv, ToolBuilder};
use crate::retry::with_auth_retry;
use crate::schema::{raw_schema, tool_name};

pub const TOOL_TYPE: &str = "gmail.send_email";
const PROVIDER: &str = "gmail";
const LABEL: &str = "Gmail";

const TO_ALIASES: &[&str] = &[
    "to",
    "recipient",
    "toaddress",
    "to_address",
    "recipientemail",
    "recipient_email",
    "toemail",
    "to_email",
];
const SUBJECT_ALIASES: &[&str] = &["subject", "email_subject", "subjectline", "subject_line", "emailsubject"];
const BODY_ALIASES: &[&str] = &[
    "body",
    "message",
    "email_body",
    "bodytext",
    "body_text",
    "messagebody",
    "message_body",
    "emailbody",
];
const CC_ALIASES: &[&str] = &["cc", "ccaddress", "cc_address", "ccemails", "cc_emails"];
const BCC_ALIASES: &[&str] = &["bcc", "bccaddress", "bcc_address", "bccemails", "bcc_emails"];
const HTML_ALIASES: &[&str] = &["ishtml", "bodyishtml", "html", "body_is_html", "html_body", "use_html"];

const NO_SENDER: &str = "Unable to determine a Gmail sender address. Specify a 'fromAddress' override or reconnect the Gmail integration.";

pub struct GmailSendEmailBuilder {
    env: Arc<IntegrationEnv>,
}

impl GmailSendEmailBuilder {
    pub fn new(env: Arc<IntegrationEnv>) -> Self {
        Self { env }
    }
}

/// Static per-tool settings from the tool row's configuration.
#[derive(Debug, Clone, Default)]
struct SenderSettings {
    from_override: Option<String>,
    reply_to: Option<String>,
    sender_name: Option<String>,
    default_subject: Option<String>,
    default_body: Option<String>,
    default_body_is_html: Option<bool>,
}

fn read_settings(tool: &ToolConfig) -> std::result::Result<SenderSettings, String> {
    let config = &tool.config;
    Ok(SenderSettings {
        from_override: config_email(config.get("fromAddress"), "fromAddress")?,
        reply_to: config_email(config.get("replyTo"), "replyTo")?,
        sender_name: config_string(config.get("senderName")),
        default_subject: config_string(config.get("defaultSubject")),
        default_body: config_string(config.get("defaultBody")),
        default_body_is_html: config_bool(config.get("defaultBodyIsHtml"), "defaultBodyIsHtml")?,
    })
}

/// Caller-facing parameter names after alias matching.
#[derive(Debug, Clone)]
struct ParameterNames {
    to: String,
    subject: String,
    subject_required: bool,
    body: String,
    body_required: bool,
    cc: String,
    bcc: String,
    html: String,
}

impl ToolBuilder for GmailSendEmailBuilder {
    fn build(&self, tool: &ToolConfig, _graph: &WorkflowGraph) -> Option<Arc<dyn Tool>> {
        let settings = match read_settings(tool) {
            Ok(settings) => settings,
            Err(reason) => {
                warn!(tool_id = %tool.id, %reason, "Gmail tool has invalid configuration; skipping registration");
                return None;
            }
        };

        let limits = &self.env.config.gmail;
        let max_recipients = clamp_limit(
            tool.config.get("maxRecipients"),
            limits.default_max_recipients,
            limits.max_recipients_limit,
        );

        let configured = &tool.runtime_parameters;
        let role = |aliases: &[&str], fallback: &str, description: &str, required: bool, data_type: DataType| {
            params::normalize_parameter(
                params::find_parameter(configured, aliases),
                fallback,
                description,
                required,
                data_type,
            )
        };
        let to = role(
            TO_ALIASES,
            "to",
            "Comma-separated email addresses for the primary recipients.",
            true,
            DataType::String,
        );
        let subject = role(
            SUBJECT_ALIASES,
            "subject",
            "Subject line for the email.",
            settings.default_subject.is_none(),
            DataType::String,
        );
        let body = role(
            BODY_ALIASES,
            "body",
            "Body content of the email.",
            settings.default_body.is_none(),
            DataType::String,
        );
        let cc = role(CC_ALIASES, "cc", "Optional comma-separated CC recipients.", false, DataType::String);
        let bcc = role(BCC_ALIASES, "bcc", "Optional comma-separated BCC recipients.", false, DataType::String);
        let html = role(
            HTML_ALIASES,
            "bodyIsHtml",
            "Set to true if the body content is HTML.",
            false,
            DataType::Boolean,
        );

        let names = ParameterNames {
            to: to.name.clone(),
            subject: subject.name.clone(),
            subject_required: subject.required,
            body: body.name.clone(),
            body_required: body.required,
            cc: cc.name.clone(),
            bcc: bcc.name.clone(),
            html: html.name.clone(),
        };

        let mut schema_parameters = vec![to, subject, body, cc, bcc, html];
        let handled: Vec<String> = schema_parameters.iter().map(|p| p.name.to_lowercase()).collect();
        schema_parameters.extend(
            configured
                .iter()
                .filter(|p| !handled.contains(&p.name.to_lowercase()))
                .cloned(),
        );

        Some(Arc::new(GmailSendEmailTool {
            name: tool_name(&tool.tool_type, &tool.id),
            description: tool_description(tool, "Send an email through the connected Gmail account."),
            parameters: schema_parameters,
            names,
            settings,
            max_recipients,
            env: self.env.clone(),
        }))
    }
}

/// Sends an email from the organization's connected Gmail account.
pub struct GmailSendEmailTool {
    name: String,
    description: String,
    parameters: Vec<ToolParameterConfig>,
    names: ParameterNames,
    settings: SenderSettings,
    max_recipients: u32,
    env: Arc<IntegrationEnv>,
}

impl GmailSendEmailTool {
    /// Validated message without a sender.
    fn draft(&self, input: &Value) -> Result<OutgoingEmail> {
        let args = params::arguments(input)?;
        let names = &self.names;

        let to_value = params::required_string(args, &names.to)?;
        let subject = params::string_argument(args, &names.subject, names.subject_required)?;
        let body = params::string_argument(args, &names.body, names.body_required)?;
        let cc_value = params::string_argument(args, &names.cc, false)?;
        let bcc_value = params::string_argument(args, &names.bcc, false)?;
        let html = params::boolean_argument(args, &names.html)?;

        let to = params::parse_email_addresses(Some(&to_value), &names.to, true)?;
        let cc = params::parse_email_addresses(cc_value.as_deref(), &names.cc, false)?;
        let bcc = params::parse_email_addresses(bcc_value.as_deref(), &names.bcc, false)?;

        let total = to.len() + cc.len() + bcc.len();
        if total == 0 {
            return Err(SwitchboardError::ToolValidation(
                "At least one recipient email address must be provided.".into(),
            ));
        }
        if total > self.max_recipients as usize {
            return Err(SwitchboardError::ToolValidation(format!(
                "Too many recipients provided. Limit is {} for this tool.",
                self.max_recipients
            )));
        }

        let body = body
            .or_else(|| self.settings.default_body.clone())
            .ok_or_else(|| {
                SwitchboardError::ToolValidation(format!("Parameter '{}' is required.", names.body))
            })?;

        Ok(OutgoingEmail {
            from_address: String::new(),
            sender_name: self.settings.sender_name.clone(),
            to,
            cc,
            bcc,
            reply_to: self.settings.reply_to.clone(),
            subject: subject.or_else(|| self.settings.default_subject.clone()),
            body,
            body_is_html: html.or(self.settings.default_body_is_html).unwrap_or(false),
        })
    }

    /// OpenID userinfo email for the token's account, remembered on the
    /// connection record when found.
    async fn fetch_sender(&self, access_token: &str, organization_id: &str) -> Result<Option<String>> {
        let resp = self
            .env
            .http
            .get(&self.env.config.gmail.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(LABEL, e))?;

        let status = resp.status();
        let body = read_body(resp).await;
        if !status.is_success() {
            let code = status.as_u16();
            if code == 401 || code == 403 {
                return Err(provider_error(LABEL, code, &body, ""));
            }
            debug!(status = code, "Failed to fetch Gmail profile email");
            return Err(SwitchboardError::Integration {
                provider: LABEL.into(),
                status: Some(code),
                message: format!("Failed to fetch Gmail user info (status {}).", code),
            });
        }

        let email = body
            .get("email")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        if let Some(email) = &email {
            self.env
                .credentials
                .remember_profile_email(organization_id, PROVIDER, email)
                .await;
        }
        Ok(email)
    }

    /// Resolve the sender and send with one access token.
    async fn deliver(
        &self,
        access_token: String,
        organization_id: &str,
        stored_sender: Option<&str>,
        draft: &OutgoingEmail,
    ) -> Result<(Value, String)> {
        let from_address = match self
            .settings
            .from_override
            .as_deref()
            .or(stored_sender)
        {
            Some(address) => address.to_string(),
            None => self
                .fetch_sender(&access_token, organization_id)
                .await?
                .ok_or_else(|| SwitchboardError::ToolFailed(NO_SENDER.into()))?,
        };

        let raw = OutgoingEmail {
            from_address: from_address.clone(),
            ..draft.clone()
        }
        .encode_raw()?;
        let resp = self
            .env
            .http
            .post(&self.env.config.gmail.send_url)
            .bearer_auth(&access_token)
            .header("Accept", "application/json")
            .json(&json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| transport_error(LABEL, e))?;

        let status = resp.status();
        let body = read_body(resp).await;
        if status.is_success() {
            Ok((body, from_address))
        } else {
            Err(provider_error(LABEL, status.as_u16(), &body, "Gmail request failed."))
        }
    }
}

impl Tool for GmailSendEmailTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        raw_schema(&self.parameters)
    }

    fn execute(&self, input: Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move {
            let draft = self.draft(&input)?;
            let org = ctx.organization_id.as_str();

            let stored_sender = if self.settings.from_override.is_some() {
                None
            } else {
                self.env
                    .credentials
                    .connection(org, PROVIDER)
                    .await?
                    .profile_email
                    .filter(|e| !e.is_empty())
            };

            debug!(tool = %self.name, recipients = draft.to.len() + draft.cc.len() + draft.bcc.len(), "Sending Gmail message");
            let (response, from_address) =
                with_auth_retry(&self.env.credentials, org, PROVIDER, |token| {
                    self.deliver(token, org, stored_sender.as_deref(), &draft).boxed()
                })
                .await?;

            Ok(ToolOutput::Payload(json!({
                "status": "sent",
                "messageId": response.get("id"),
                "threadId": response.get("threadId"),
                "labelIds": response.get("labelIds").cloned().unwrap_or_else(|| json!([])),
                "fromAddress": from_address,
                "to": draft.to,
                "cc": draft.cc,
                "bcc": draft.bcc,
                "subject": draft.subject,
                "bodyIsHtml": draft.body_is_html,
            })))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use switchboard_core::config::IntegrationsConfig;
    use switchboard_core::types::SessionId;
    use switchboard_credentials::CredentialResolver;
    use switchboard_test_utils::{
        auth_billing_graph, connection, tool_config, MemoryConnections, MemorySession, MemoryVault,
        StaticRefresher, ORG_ID,
    };
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    struct Fixture {
        env: Arc<IntegrationEnv>,
        connections: Arc<MemoryConnections>,
        refresher: Arc<StaticRefresher>,
    }

    fn fixture(server: &str, profile_email: Option<&str>) -> Fixture {
        let vault = Arc::new(MemoryVault::new());
        let connections = Arc::new(MemoryConnections::new());
        let access = vault.insert("access", "at-old");
        let refresh = vault.insert("refresh", "rt-old");
        let mut record = connection("gmail", Some(&access), Some(&refresh), 3600);
        record.profile_email = profile_email.map(String::from);
        connections.insert(record);

        let refresher = Arc::new(StaticRefresher::new("gmail", "at-new"));
        let credentials = Arc::new(
            CredentialResolver::new(vault, connections.clone(), 30).with_refresher(refresher.clone()),
        );
        let mut config = IntegrationsConfig::default();
        config.gmail.send_url = format!("{}/gmail/v1/users/me/messages/send", server);
        config.gmail.userinfo_url = format!("{}/v1/userinfo", server);
        Fixture {
            env: Arc::new(IntegrationEnv::new(credentials, config).unwrap()),
            connections,
            refresher,
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            session_id: SessionId::new(),
            organization_id: ORG_ID.into(),
            session: Arc::new(MemorySession::new()),
        }
    }

    fn build(env: &Arc<IntegrationEnv>, config: Value) -> Option<Arc<dyn Tool>> {
        let tool = tool_config("0a1b2c3d4e5f", TOOL_TYPE, config);
        GmailSendEmailBuilder::new(env.clone()).build(&tool, &auth_billing_graph())
    }

    fn decoded_raw(request: &Request) -> String {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let raw = body["raw"].as_str().unwrap();
        String::from_utf8(URL_SAFE_NO_PAD.decode(raw).unwrap()).unwrap()
    }

    fn sent() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg-1",
            "threadId": "thr-1",
            "labelIds": ["SENT"]
        }))
    }

    #[test]
    fn test_schema_requirements_follow_defaults() {
        let f = fixture("http://unused", None);
        let tool = build(&f.env, json!({})).unwrap();
        assert_eq!(tool.name(), "gmail_send_email_0a1b2c3d");
        let schema = tool.input_schema();
        assert_eq!(schema["required"], json!(["to", "subject", "body"]));
        assert_eq!(schema["properties"]["bodyIsHtml"]["type"], json!(["boolean", "null"]));

        let with_defaults = build(&f.env, json!({"defaultSubject": "Hi", "defaultBody": "Hello"})).unwrap();
        assert_eq!(with_defaults.input_schema()["required"], json!(["to"]));
    }

    #[test]
    fn test_aliases_and_extra_parameters() {
        let f = fixture("http://unused", None);
        let mut tool = tool_config("t-1", TOOL_TYPE, json!({}));
        tool.runtime_parameters = vec![
            ToolParameterConfig {
                name: "Recipient_Email".into(),
                description: "Patient email".into(),
                required: false,
                data_type: DataType::Object,
            },
            ToolParameterConfig {
                name: "appointmentId".into(),
                description: "Appointment reference".into(),
                required: true,
                data_type: DataType::String,
            },
        ];
        let built = GmailSendEmailBuilder::new(f.env.clone())
            .build(&tool, &auth_billing_graph())
            .unwrap();
        let schema = built.input_schema();
        assert_eq!(schema["properties"]["Recipient_Email"]["type"], "string");
        assert_eq!(schema["properties"]["Recipient_Email"]["description"], "Patient email");
        assert!(schema["properties"].get("to").is_none());
        assert_eq!(schema["properties"]["appointmentId"]["type"], "string");
        assert_eq!(
            schema["required"],
            json!(["Recipient_Email", "subject", "body", "appointmentId"])
        );
    }

    #[test]
    fn test_invalid_config_is_skipped() {
        let f = fixture("http://unused", None);
        assert!(build(&f.env, json!({"replyTo": "not-an-address"})).is_none());
        assert!(build(&f.env, json!({"fromAddress": 42})).is_none());
        assert!(build(&f.env, json!({"defaultBodyIsHtml": "sometimes"})).is_none());
        assert!(build(&f.env, json!({"defaultBodyIsHtml": "true", "replyTo": ""})).is_some());
    }

    #[tokio::test]
    async fn test_sends_with_override_sender() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/send"))
            .and(header("authorization", "Bearer at-old"))
            .respond_with(sent())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/userinfo"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), None);
        let tool = build(
            &f.env,
            json!({"fromAddress": "clinic@example.com", "senderName": "Front Desk", "replyTo": "help@example.com"}),
        )
        .unwrap();
        let output = tool
            .execute(
                json!({"to": "a@example.com, B <b@example.com>", "subject": "Reminder", "body": "<p>Hi</p>", "bodyIsHtml": "yes"}),
                ctx(),
            )
            .await
            .unwrap();

        let payload = output.payload().unwrap();
        assert_eq!(payload["status"], "sent");
        assert_eq!(payload["messageId"], "msg-1");
        assert_eq!(payload["labelIds"], json!(["SENT"]));
        assert_eq!(payload["fromAddress"], "clinic@example.com");
        assert_eq!(payload["to"], json!(["a@example.com", "b@example.com"]));
        assert_eq!(payload["bodyIsHtml"], true);

        let requests = server.received_requests().await.unwrap();
        let message = decoded_raw(&requests[0]);
        let from = message.lines().find(|l| l.starts_with("From: ")).unwrap();
        assert!(from.contains("Front Desk") && from.ends_with("<clinic@example.com>"));
        assert!(message.contains("Reply-To: help@example.com\r\n"));
        assert!(message.contains("Content-Type: text/html"));
        let to = message.lines().find(|l| l.starts_with("To: ")).unwrap();
        assert!(to.contains("a@example.com") && to.contains("b@example.com"));
    }

    #[tokio::test]
    async fn test_userinfo_sender_is_remembered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "owner@example.com"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/send"))
            .respond_with(sent())
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), None);
        let tool = build(&f.env, json!({"defaultSubject": "Update"})).unwrap();
        let output = tool
            .execute(json!({"to": "a@example.com", "body": "Hello"}), ctx())
            .await
            .unwrap();
        let payload = output.payload().unwrap();
        assert_eq!(payload["fromAddress"], "owner@example.com");
        assert_eq!(payload["subject"], "Update");
        assert_eq!(
            f.connections.record(ORG_ID, "gmail").unwrap().profile_email.as_deref(),
            Some("owner@example.com")
        );
    }

    #[tokio::test]
    async fn test_stored_profile_email_skips_userinfo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/userinfo"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(sent())
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Some("stored@example.com"));
        let tool = build(&f.env, json!({})).unwrap();
        let output = tool
            .execute(json!({"to": "a@example.com", "subject": "S", "body": "B"}), ctx())
            .await
            .unwrap();
        assert_eq!(output.payload().unwrap()["fromAddress"], "stored@example.com");
    }

    #[tokio::test]
    async fn test_send_rejection_refreshes_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer at-old"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "Invalid Credentials"}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer at-new"))
            .respond_with(sent())
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Some("stored@example.com"));
        let tool = build(&f.env, json!({})).unwrap();
        tool.execute(json!({"to": "a@example.com", "subject": "S", "body": "B"}), ctx())
            .await
            .unwrap();
        assert_eq!(f.refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_userinfo_rejection_shares_retry_cycle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/userinfo"))
            .and(header("authorization", "Bearer at-old"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/userinfo"))
            .and(header("authorization", "Bearer at-new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "owner@example.com"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer at-old"))
            .respond_with(sent())
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/send"))
            .and(header("authorization", "Bearer at-new"))
            .respond_with(sent())
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), None);
        let tool = build(&f.env, json!({})).unwrap();
        let output = tool
            .execute(json!({"to": "a@example.com", "subject": "S", "body": "B"}), ctx())
            .await
            .unwrap();

        assert_eq!(f.refresher.calls(), 1);
        assert_eq!(output.payload().unwrap()["fromAddress"], "owner@example.com");
        assert_eq!(
            f.connections.record(ORG_ID, "gmail").unwrap().profile_email.as_deref(),
            Some("owner@example.com")
        );
    }

    #[tokio::test]
    async fn test_missing_sender_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sub": "123"})))
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), None);
        let tool = build(&f.env, json!({})).unwrap();
        let err = tool
            .execute(json!({"to": "a@example.com", "subject": "S", "body": "B"}), ctx())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), NO_SENDER);
    }

    #[tokio::test]
    async fn test_recipient_validation() {
        let f = fixture("http://unused", Some("stored@example.com"));
        let tool = build(&f.env, json!({"maxRecipients": 2})).unwrap();

        let err = tool
            .execute(
                json!({"to": "a@example.com", "cc": "b@example.com, c@example.com", "subject": "S", "body": "B"}),
                ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Too many recipients provided. Limit is 2 for this tool.");

        let err = tool
            .execute(json!({"to": "a@", "subject": "S", "body": "B"}), ctx())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Parameter 'to' contains an invalid email address: a@.");

        let err = tool
            .execute(json!({"to": "a@example.com", "subject": "S"}), ctx())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Parameter 'body' is required.");

        let err = tool
            .execute(json!({"to": "a@example.com", "subject": "S", "body": "B", "bodyIsHtml": "maybe"}), ctx())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Parameter 'bodyIsHtml' must be a boolean value.");
    }
}
