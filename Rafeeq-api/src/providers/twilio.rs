//! Twilio voice-call adapter
//!
//! Places a call through the Calls resource of the Twilio REST API. The
//! message is spoken with a TwiML `<Say>` verb using the configured voice.

use async_trait::async_trait;
use rafeeq_domain::error::CallError;
use rafeeq_domain::services::{CallProviderTrait, MessageTemplates};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Twilio account settings
#[derive(Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Caller id the call is placed from
    pub from_number: String,
    pub api_base: String,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TwilioConfig {
    /// Read credentials from the environment. `None` when any is missing.
    pub fn from_env() -> Option<Self> {
        let account_sid = non_empty_var("TWILIO_ACCOUNT_SID")?;
        let auth_token = non_empty_var("TWILIO_AUTH_TOKEN")?;
        let from_number = non_empty_var("TWILIO_PHONE_NUMBER")?;

        Some(Self {
            account_sid,
            auth_token,
            from_number,
            api_base: env::var("TWILIO_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
    code: Option<i64>,
}

/// Voice-call provider backed by Twilio
#[derive(Debug, Clone)]
pub struct TwilioCallProvider {
    client: reqwest::Client,
    config: TwilioConfig,
    voice: String,
    language: String,
}

impl TwilioCallProvider {
    /// `timeout` bounds each HTTP request
    pub fn new(config: TwilioConfig, templates: &MessageTemplates, timeout: Duration) -> Result<Self, CallError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config,
            voice: templates.voice.clone(),
            language: templates.language.clone(),
        })
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// TwiML document speaking `message`
    pub fn twiml(&self, message: &str) -> String {
        format!(
            r#"<Response><Say voice="{}" language="{}">{}</Say></Response>"#,
            escape_xml(&self.voice),
            escape_xml(&self.language),
            escape_xml(message)
        )
    }
}

#[async_trait]
impl CallProviderTrait for TwilioCallProvider {
    async fn place_call(&self, contact: &str, message: &str) -> Result<String, CallError> {
        let twiml = self.twiml(message);
        let form = [
            ("To", contact),
            ("From", self.config.from_number.as_str()),
            ("Twiml", twiml.as_str()),
        ];

        debug!(contact = %contact, "Submitting call to Twilio");

        let response = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<TwilioErrorBody>().await.ok();
            let detail = match body {
                Some(TwilioErrorBody {
                    message: Some(message),
                    code,
                }) => match code {
                    Some(code) => format!("{} (code {})", message, code),
                    None => message,
                },
                _ => status.to_string(),
            };
            warn!(status = %status, detail = %detail, "Twilio rejected the call");
            return Err(CallError::Rejected(format!("HTTP {}: {}", status.as_u16(), detail)));
        }

        let call = response
            .json::<CallResource>()
            .await
            .map_err(|e| CallError::Transport(format!("unreadable Twilio response: {}", e)))?;

        Ok(call.sid)
    }
}

/// Escape text for an XML element or attribute
pub fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(templates: &MessageTemplates) -> TwilioCallProvider {
        let config = TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from_number: "+15550199".to_string(),
            api_base: "https://api.twilio.com/".to_string(),
        };
        TwilioCallProvider::new(config, templates, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"a<b & "c">'d'"#), "a&lt;b &amp; &quot;c&quot;&gt;&apos;d&apos;");
    }

    #[test]
    fn test_twiml_uses_template_voice() {
        let templates = MessageTemplates::arabic();
        let twiml = provider(&templates).twiml("تنبيه <عاجل>");
        assert_eq!(
            twiml,
            r#"<Response><Say voice="Polly.Zeina" language="ar-SA">تنبيه &lt;عاجل&gt;</Say></Response>"#
        );
    }

    #[test]
    fn test_calls_url() {
        let provider = provider(&MessageTemplates::english());
        assert_eq!(provider.calls_url(), "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json");
    }

    #[test]
    fn test_debug_redacts_token() {
        let provider = provider(&MessageTemplates::english());
        let debug = format!("{:?}", provider.config);
        assert!(!debug.contains("secret"));
    }
}
