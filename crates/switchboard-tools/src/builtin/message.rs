//! Gmail `raw` message assembly on top of `lettre`'s message builder.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::Mailbox;
use lettre::{Address, Message};

use switchboard_core::error::{Result, SwitchboardError};

#[derive(Debug, Clone, Default)]
pub struct OutgoingEmail {
    pub from_address: String,
    pub sender_name: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    pub body_is_html: bool,
}

impl OutgoingEmail {
    /// Single-part UTF-8 message with a base64 body. Bcc stays in the headers
    /// since Gmail reads recipients from the raw message.
    pub fn to_message(&self) -> Result<Message> {
        let sender_name = self
            .sender_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(single_line);
        let mut builder = Message::builder()
            .from(Mailbox::new(sender_name, parse_address(&self.from_address)?))
            .keep_bcc();

        for address in &self.to {
            builder = builder.to(mailbox(address)?);
        }
        for address in &self.cc {
            builder = builder.cc(mailbox(address)?);
        }
        for address in &self.bcc {
            builder = builder.bcc(mailbox(address)?);
        }
        if let Some(reply_to) = self.reply_to.as_deref().filter(|r| !r.is_empty()) {
            builder = builder.reply_to(mailbox(reply_to)?);
        }
        if let Some(subject) = self.subject.as_deref().filter(|s| !s.is_empty()) {
            builder = builder.subject(single_line(subject));
        }

        let content_type = if self.body_is_html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };
        builder
            .header(content_type)
            .header(ContentTransferEncoding::Base64)
            .body(self.body.clone())
            .map_err(|e| SwitchboardError::ToolFailed(format!("Unable to build email message: {}", e)))
    }

    /// The message as Gmail's `raw` field expects it: base64url, no padding.
    pub fn encode_raw(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_message()?.formatted()))
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    Ok(Mailbox::new(None, parse_address(address)?))
}

fn parse_address(address: &str) -> Result<Address> {
    address
        .parse::<Address>()
        .map_err(|_| SwitchboardError::ToolValidation(format!("Invalid email address: {}.", address)))
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
