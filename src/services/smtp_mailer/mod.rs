use async_trait::async_trait;
use lettre::address::AddressError;
use std::fmt;

#[derive(Debug)]
pub enum MailError {
    Other(String),
    InvalidEmailAddress(String),
    SendError(String),
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailError::Other(e) => write!(f, "Error: {}", e),
            MailError::InvalidEmailAddress(e) => write!(f, "Invalid Address: {}", e),
            MailError::SendError(e) => write!(f, "Send error: {}", e),
        }
    }
}

impl std::error::Error for MailError {}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        MailError::SendError(err.to_string())
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        MailError::SendError(err.to_string())
    }
}

impl From<AddressError> for MailError {
    fn from(e: AddressError) -> Self {
        MailError::InvalidEmailAddress(e.to_string())
    }
}

/// Templates the core asks the mail collaborator to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTemplate {
    /// Sent to an email that has no account yet: sign up, then join.
    SignupInvite {
        token: String,
        url: String,
        workspace_name: String,
    },
    /// Sent to an existing account.
    WorkspaceInvite {
        token: String,
        url: String,
        workspace_name: String,
    },
}

impl MailTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            MailTemplate::SignupInvite { .. } => "signup-invite",
            MailTemplate::WorkspaceInvite { .. } => "workspace-invite",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            MailTemplate::SignupInvite { workspace_name, .. }
            | MailTemplate::WorkspaceInvite { workspace_name, .. } => {
                format!("You're invited to join {}", workspace_name)
            }
        }
    }

    pub fn body(&self) -> String {
        match self {
            MailTemplate::SignupInvite {
                url,
                workspace_name,
                ..
            } => format!(
                "You have been invited to collaborate on {}.\n\nCreate your account and join here:\n{}\n\nThis invitation expires in 7 days.",
                workspace_name, url
            ),
            MailTemplate::WorkspaceInvite {
                url,
                workspace_name,
                ..
            } => format!(
                "You have been invited to join {}.\n\nAccept the invitation here:\n{}\n\nThis invitation expires in 7 days.",
                workspace_name, url
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_template(&self, to: &str, template: &MailTemplate) -> Result<(), MailError>;
}

#[cfg(test)]
mod mock_mailer;
mod smtp_impl;

#[cfg(test)]
pub use mock_mailer::MockMailer;
pub use smtp_impl::SmtpMailer;
