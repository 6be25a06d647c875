use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;

use super::{Notification, NotificationSink};
use crate::config::NotifySettings;

const BREVO_ENDPOINT: &str = "https://api.brevo.com/v3/smtp/email";
const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
const EMAIL_SUBJECT: &str = "Hallway detection alert";
const EMAIL_SENDER_NAME: &str = "Notification Service";

/// Writes notifications to the log only.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        log::info!("notification: {}", notification.message);
        Ok(())
    }
}

/// POSTs `{ "message": ... }` as JSON to a URL.
pub struct WebhookSink {
    agent: ureq::Agent,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            agent: agent(timeout),
            url,
        }
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        let result = self.agent.post(&self.url).send_json(notification);
        check(result, &self.url)
    }
}

/// Transactional email through the Brevo HTTP API.
pub struct EmailSink {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    sender_email: String,
    recipient: String,
}

impl EmailSink {
    pub fn from_settings(settings: &NotifySettings) -> Result<Self> {
        Ok(Self {
            agent: agent(settings.timeout),
            endpoint: settings
                .url
                .clone()
                .unwrap_or_else(|| BREVO_ENDPOINT.to_string()),
            api_key: required(&settings.api_key, "api_key")?,
            sender_email: required(&settings.sender_email, "sender_email")?,
            recipient: required(&settings.recipient, "recipient")?,
        })
    }
}

impl NotificationSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        let body = json!({
            "sender": { "name": EMAIL_SENDER_NAME, "email": self.sender_email },
            "to": [{ "email": self.recipient }],
            "subject": EMAIL_SUBJECT,
            "htmlContent": notification.message,
        });
        let result = self
            .agent
            .post(&self.endpoint)
            .set("api-key", &self.api_key)
            .set("accept", "application/json")
            .send_json(body);
        check(result, &self.endpoint)
    }
}

/// SMS through the Twilio Messages API.
pub struct SmsSink {
    agent: ureq::Agent,
    endpoint: String,
    authorization: String,
    from_number: String,
    recipient: String,
}

impl SmsSink {
    pub fn from_settings(settings: &NotifySettings) -> Result<Self> {
        let account_sid = required(&settings.account_sid, "account_sid")?;
        let auth_token = required(&settings.auth_token, "auth_token")?;
        let endpoint = match &settings.url {
            Some(url) => url.clone(),
            None => format!("{}/Accounts/{}/Messages.json", TWILIO_API_BASE, account_sid),
        };
        let credentials = STANDARD.encode(format!("{}:{}", account_sid, auth_token));
        Ok(Self {
            agent: agent(settings.timeout),
            endpoint,
            authorization: format!("Basic {}", credentials),
            from_number: required(&settings.from_number, "from_number")?,
            recipient: required(&settings.recipient, "recipient")?,
        })
    }
}

impl NotificationSink for SmsSink {
    fn name(&self) -> &'static str {
        "sms"
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        let result = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &self.authorization)
            .send_form(&[
                ("Body", notification.message.as_str()),
                ("From", self.from_number.as_str()),
                ("To", self.recipient.as_str()),
            ]);
        check(result, &self.endpoint)
    }
}

fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

fn check(result: std::result::Result<ureq::Response, ureq::Error>, target: &str) -> Result<()> {
    match result {
        Ok(response) if (200..300).contains(&response.status()) => Ok(()),
        Ok(response) => Err(anyhow!(
            "{} answered with status {}",
            target,
            response.status()
        )),
        Err(ureq::Error::Status(code, response)) => {
            let detail = response.into_string().unwrap_or_default();
            Err(anyhow!("{} answered with status {}: {}", target, code, detail.trim()))
        }
        Err(ureq::Error::Transport(transport)) => {
            Err(anyhow!("transport error reaching {}: {}", target, transport))
        }
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String> {
    value
        .as_ref()
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| anyhow!("notify.{} is required for this backend", field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyBackend;

    #[test]
    fn sms_sink_builds_basic_auth_and_endpoint() {
        let settings = NotifySettings {
            backend: NotifyBackend::Sms,
            account_sid: Some("AC123".to_string()),
            auth_token: Some("secret".to_string()),
            from_number: Some("+15550001".to_string()),
            recipient: Some("+15550002".to_string()),
            ..NotifySettings::default()
        };
        let sink = SmsSink::from_settings(&settings).unwrap();
        assert_eq!(
            sink.endpoint,
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
        assert_eq!(sink.authorization, "Basic QUMxMjM6c2VjcmV0");
    }

    #[test]
    fn email_sink_requires_credentials() {
        let settings = NotifySettings {
            backend: NotifyBackend::Email,
            api_key: Some("key".to_string()),
            ..NotifySettings::default()
        };
        assert!(EmailSink::from_settings(&settings).is_err());
    }
}
