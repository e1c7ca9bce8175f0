use crate::services::smtp_mailer::{MailError, MailTemplate, Mailer};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A mock mailer that records sent emails for testing purposes.
#[derive(Debug, Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<(String, MailTemplate)>>,
    pub fail_send: AtomicBool,
}

impl MockMailer {
    pub fn set_failing(&self, failing: bool) {
        self.fail_send.store(failing, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_token(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, template)| match template {
                MailTemplate::SignupInvite { token, .. }
                | MailTemplate::WorkspaceInvite { token, .. } => token.clone(),
            })
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_template(&self, to: &str, template: &MailTemplate) -> Result<(), MailError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(MailError::Other("mock failure".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), template.clone()));
        Ok(())
    }
}
