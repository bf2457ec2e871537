//! Outbound transport backed by lettre over SMTP STARTTLS.

use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::SmtpConfig;
use crate::error::{ConnectivityError, DispatchError};
use crate::mail::{OutboundMessage, OutboundTransport};

/// Typed wrapper for the correlation token header.
#[derive(Debug, Clone)]
struct TokenHeader(String);

impl Header for TokenHeader {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str(crate::token::TOKEN_HEADER)
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// SMTP sender. The transport is built once and reused across sends.
pub struct SmtpSender {
    config: SmtpConfig,
    transport: SmtpTransport,
}

impl SmtpSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, ConnectivityError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| ConnectivityError::Smtp {
                host: config.host.clone(),
                port: config.port,
                reason: format!("relay setup failed: {e}"),
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config: config.clone(),
            transport,
        })
    }

    fn build_message(&self, message: &OutboundMessage) -> Result<Message, DispatchError> {
        // Authenticated relays reject a From that differs from the login
        // identity, so the case's sender rides on Reply-To instead.
        let from = self
            .config
            .from_address
            .parse()
            .map_err(|e| DispatchError::InvalidAddress {
                address: self.config.from_address.clone(),
                reason: format!("{e}"),
            })?;
        let reply_to = message
            .sender
            .parse()
            .map_err(|e| DispatchError::InvalidAddress {
                address: message.sender.clone(),
                reason: format!("{e}"),
            })?;
        let to = message
            .to
            .parse()
            .map_err(|e| DispatchError::InvalidAddress {
                address: message.to.clone(),
                reason: format!("{e}"),
            })?;

        Message::builder()
            .from(from)
            .reply_to(reply_to)
            .to(to)
            .subject(&message.subject)
            .header(TokenHeader(message.token.as_str().to_string()))
            .body(message.body.clone())
            .map_err(|e| DispatchError::BuildFailed {
                case_id: message.case_id.clone(),
                reason: format!("{e}"),
            })
    }
}

#[async_trait::async_trait]
impl OutboundTransport for SmtpSender {
    async fn check(&self) -> Result<(), ConnectivityError> {
        let transport = self.transport.clone();
        let host = self.config.host.clone();
        let port = self.config.port;

        let outcome = tokio::task::spawn_blocking(move || transport.test_connection())
            .await
            .map_err(|e| ConnectivityError::Smtp {
                host: host.clone(),
                port,
                reason: format!("check task failed: {e}"),
            })?;

        match outcome {
            Ok(true) => Ok(()),
            Ok(false) => Err(ConnectivityError::Smtp {
                host: self.config.host.clone(),
                port,
                reason: "NOOP rejected".into(),
            }),
            Err(e) => Err(ConnectivityError::Smtp {
                host: self.config.host.clone(),
                port,
                reason: format!("{e}"),
            }),
        }
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
        let email = self.build_message(message)?;
        let transport = self.transport.clone();
        let case_id = message.case_id.clone();

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| DispatchError::SendFailed {
                case_id: case_id.clone(),
                reason: format!("send task failed: {e}"),
            })?
            .map_err(|e| DispatchError::SendFailed {
                case_id,
                reason: format!("{e}"),
            })?;

        tracing::debug!(case_id = %message.case_id, token = %message.token, "Test message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::CorrelationToken;
    use std::time::Duration;

    fn test_config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "harness".into(),
            password: "secret".into(),
            from_address: "harness@example.com".into(),
            send_delay: Duration::ZERO,
        }
    }

    fn test_message(sender: &str, to: &str) -> OutboundMessage {
        let token = CorrelationToken::mint();
        OutboundMessage {
            case_id: "case_001".into(),
            to: to.into(),
            sender: sender.into(),
            subject: "Invoice 42".into(),
            body: token.append_marker("Please process."),
            token,
        }
    }

    #[test]
    fn build_message_embeds_token_header() {
        let sender = SmtpSender::new(&test_config()).unwrap();
        let msg = test_message("alice@example.com", "inbox@example.com");
        let email = sender.build_message(&msg).unwrap();
        let formatted = String::from_utf8(email.formatted()).unwrap();
        assert!(formatted.contains(&format!("X-Routecheck-Token: {}", msg.token)));
        assert!(formatted.contains("[TEST-ID: "));
    }

    #[test]
    fn build_message_uses_configured_from_with_case_sender_as_reply_to() {
        let sender = SmtpSender::new(&test_config()).unwrap();
        let msg = test_message("alice@example.com", "inbox@example.com");
        let email = sender.build_message(&msg).unwrap();
        let formatted = String::from_utf8(email.formatted()).unwrap();
        assert!(formatted.contains("From: harness@example.com"));
        assert!(formatted.contains("Reply-To: alice@example.com"));
    }

    #[test]
    fn build_message_rejects_bad_address() {
        let sender = SmtpSender::new(&test_config()).unwrap();
        let msg = test_message("not an address", "inbox@example.com");
        assert!(matches!(
            sender.build_message(&msg),
            Err(DispatchError::InvalidAddress { .. })
        ));
    }
}
