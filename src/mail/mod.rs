//! Mail transport seams.
//!
//! The pipeline under test is reachable only through these two traits:
//! [`OutboundTransport`] delivers correlated test messages, and
//! [`MailboxInspector`] observes where they ended up. Integration tests
//! substitute in-memory implementations for both.

pub mod imap;
pub mod smtp;

use async_trait::async_trait;

use crate::error::{CleanupError, ConnectivityError, DispatchError, InspectError};
use crate::token::CorrelationToken;

pub use imap::ImapInspector;
pub use smtp::SmtpSender;

/// A fully-rendered outgoing test message. The body already carries the
/// trailing marker line; the token is additionally set as a header.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub case_id: String,
    pub to: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub token: CorrelationToken,
}

/// Identity of one message in the inspected mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub folder: String,
    /// IMAP UID — stable across expunges, unlike sequence numbers.
    pub uid: u32,
    pub subject: Option<String>,
}

/// Outbound mail delivery.
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// Pre-flight connectivity check. Must pass before any message is sent.
    async fn check(&self) -> Result<(), ConnectivityError>;

    /// Deliver a single test message.
    async fn send(&self, message: &OutboundMessage) -> Result<(), DispatchError>;
}

/// Read (and delete) access to the inspected mailbox.
#[async_trait]
pub trait MailboxInspector: Send + Sync {
    /// Pre-flight connectivity check.
    async fn check(&self) -> Result<(), ConnectivityError>;

    /// Every observable folder on the server.
    async fn list_folders(&self) -> Result<Vec<String>, InspectError>;

    /// Messages in `folder` whose `header` equals `value` exactly.
    async fn search_header(
        &self,
        folder: &str,
        header: &str,
        value: &str,
    ) -> Result<Vec<MessageRef>, InspectError>;

    /// Messages in `folder` containing `needle` anywhere in their text.
    async fn search_body(&self, folder: &str, needle: &str)
    -> Result<Vec<MessageRef>, InspectError>;

    /// Permanently delete one message.
    async fn delete(&self, message: &MessageRef) -> Result<(), CleanupError>;
}
