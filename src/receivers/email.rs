/*!
 * Mail service receiver, the typical target of queued commands
 */

use thiserror::Error;

use super::{lock, Shared};
use crate::command::{Command, CommandCore, CommandId, CommandResult, CommandState};
use crate::error::CommandError;

/// Default maximum subject length
pub const DEFAULT_MAX_SUBJECT_LEN: usize = 120;

/// Mail delivery failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailError {
    #[error("Recipient is required")]
    MissingRecipient,

    #[error("Subject too long: {len} > {max} characters")]
    SubjectTooLong { len: usize, max: usize },

    #[error("Mail service temporarily unavailable")]
    Unavailable,
}

impl From<EmailError> for CommandError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::Unavailable => CommandError::Transient(err.to_string()),
            EmailError::MissingRecipient | EmailError::SubjectTooLong { .. } => {
                CommandError::Validation(err.to_string())
            }
        }
    }
}

/// A delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub id: u64,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// In-memory mail service with a simulated outage window
#[derive(Debug, Clone)]
pub struct EmailService {
    max_subject_len: usize,
    outbox: Vec<SentEmail>,
    outage_remaining: u32,
    next_id: u64,
}

impl Default for EmailService {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUBJECT_LEN)
    }
}

impl EmailService {
    pub fn new(max_subject_len: usize) -> Self {
        Self {
            max_subject_len,
            outbox: Vec::new(),
            outage_remaining: 0,
            next_id: 1,
        }
    }

    /// Make the next `sends` delivery attempts fail with [`EmailError::Unavailable`]
    pub fn fail_next(&mut self, sends: u32) {
        self.outage_remaining = sends;
    }

    pub fn outbox(&self) -> &[SentEmail] {
        &self.outbox
    }

    /// Deliver a message, returning its id
    pub fn send(&mut self, to: &str, subject: &str, body: &str) -> Result<u64, EmailError> {
        if to.is_empty() {
            return Err(EmailError::MissingRecipient);
        }
        let len = subject.chars().count();
        if len > self.max_subject_len {
            return Err(EmailError::SubjectTooLong {
                len,
                max: self.max_subject_len,
            });
        }
        if self.outage_remaining > 0 {
            self.outage_remaining -= 1;
            return Err(EmailError::Unavailable);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.outbox.push(SentEmail {
            id,
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(id)
    }

    /// Pull a message back out of the outbox
    pub fn retract(&mut self, id: u64) -> Option<SentEmail> {
        let index = self.outbox.iter().position(|m| m.id == id)?;
        Some(self.outbox.remove(index))
    }
}

/// Sends one email; undo retracts that message from the outbox
pub struct SendEmailCommand {
    core: CommandCore,
    service: Shared<EmailService>,
    to: String,
    subject: String,
    body: String,
    sent_id: Option<u64>,
}

impl SendEmailCommand {
    pub fn new(
        service: Shared<EmailService>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let to = to.into();
        Self {
            core: CommandCore::new(format!("SendEmail(to={})", to)),
            service,
            to,
            subject: subject.into(),
            body: body.into(),
            sent_id: None,
        }
    }
}

impl Command for SendEmailCommand {
    fn id(&self) -> CommandId {
        self.core.id()
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self) -> CommandResult {
        self.core.execute_with(|| {
            let id = lock(&self.service).send(&self.to, &self.subject, &self.body)?;
            self.sent_id = Some(id);
            Ok(format!("Sent message {} to {}", id, self.to))
        })
    }

    fn undo(&mut self) -> CommandResult {
        self.core.undo_with(|| {
            let id = self
                .sent_id
                .ok_or_else(|| CommandError::Permanent("no message id recorded".to_string()))?;
            lock(&self.service).retract(id).ok_or_else(|| {
                CommandError::Permanent(format!("message {} is no longer in the outbox", id))
            })?;
            Ok(format!("Retracted message {}", id))
        })
    }
}
