use std::env;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Notifier, NotifyError};

const SEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection details for the Mailgun messages API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailgunConfig {
    /// Full messages endpoint, e.g. `https://api.mailgun.net/v3/<domain>/messages`
    pub api_url: String,
    pub api_token: String,
    pub from: String,
}

impl MailgunConfig {
    /// Read `MAILGUN_API_URL`, `MAILGUN_API_TOKEN` and `MAILGUN_FROM`
    pub fn from_env() -> Result<Self, NotifyError> {
        let var = |name: &str| {
            env::var(name)
                .ok()
                .filter(|value| !value.is_empty())
                .ok_or_else(|| NotifyError::NotConfigured(format!("{name} is not set")))
        };

        Ok(Self {
            api_url: var("MAILGUN_API_URL")?,
            api_token: var("MAILGUN_API_TOKEN")?,
            from: var("MAILGUN_FROM")?,
        })
    }

    fn check(&self) -> Result<(), NotifyError> {
        for (name, value) in
            [("api_url", &self.api_url), ("api_token", &self.api_token), ("from", &self.from)]
        {
            if value.trim().is_empty() {
                return Err(NotifyError::NotConfigured(format!("mailgun {name} is empty")));
            }
        }
        Ok(())
    }
}

/// Sends plain-text mail through Mailgun
#[derive(Debug, Clone)]
pub struct MailgunNotifier {
    config: MailgunConfig,
    client: reqwest::Client,
}

impl MailgunNotifier {
    pub fn new(config: MailgunConfig) -> Result<Self, NotifyError> {
        config.check()?;
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self, NotifyError> {
        Self::new(MailgunConfig::from_env()?)
    }

    pub fn config(&self) -> &MailgunConfig {
        &self.config
    }
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let form = [
            ("from", self.config.from.as_str()),
            ("to", recipient),
            ("subject", subject),
            ("text", body),
        ];

        let response = self
            .client
            .post(&self.config.api_url)
            .basic_auth("api", Some(&self.config.api_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status: status.as_u16(), body });
        }

        debug!("Mailgun accepted message to {}", recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MailgunConfig {
        MailgunConfig {
            api_url: "https://api.mailgun.net/v3/example.com/messages".into(),
            api_token: "key-123".into(),
            from: "watchdog@example.com".into(),
        }
    }

    #[test]
    fn test_new_accepts_complete_config() {
        let notifier = MailgunNotifier::new(config()).unwrap();
        assert_eq!(notifier.config().from, "watchdog@example.com");
    }

    #[test]
    fn test_new_rejects_missing_fields() {
        let err = MailgunNotifier::new(MailgunConfig { api_token: " ".into(), ..config() })
            .unwrap_err();
        assert!(matches!(err, NotifyError::NotConfigured(message) if message.contains("api_token")));
    }
}
