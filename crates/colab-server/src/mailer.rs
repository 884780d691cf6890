//! Transactional email seam.
//!
//! The SMTP relay is an external collaborator; handlers only know this
//! trait. The default implementation records the send as a structured log
//! line, which is also what the tests assert against. Delivery failures
//! are never fatal to the request that triggered them.

use std::sync::Mutex;

use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, mail: OutgoingMail);
}

/// Logs instead of relaying. Dev default.
#[derive(Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: OutgoingMail) {
        info!(to = %mail.to, subject = %mail.subject, "outgoing mail");
    }
}

/// Captures sends for assertions.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: OutgoingMail) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(mail);
    }
}

pub fn verification_mail(name: &str, email: &str, origin: &str, token: &str) -> OutgoingMail {
    let url = format!("{origin}/auth/verify?token={token}");
    OutgoingMail {
        to: email.to_string(),
        subject: "Verify your email - CoLab Manager".to_string(),
        body: format!(
            "Hello {name},\n\nverify your email address to finish registration:\n{url}\n\n\
             This link expires in 24 hours. If you didn't create an account, ignore this mail."
        ),
    }
}

pub fn project_invite_mail(
    inviter: &str,
    project: &str,
    email: &str,
    origin: &str,
    setup_token: Option<&str>,
    project_id: &str,
) -> OutgoingMail {
    let url = match setup_token {
        Some(token) => format!("{origin}/auth/setup?token={token}"),
        None => format!("{origin}/projects/{project_id}"),
    };
    OutgoingMail {
        to: email.to_string(),
        subject: format!("You've been added to {project} - CoLab Manager"),
        body: format!(
            "{inviter} invited you to collaborate on \"{project}\".\n\nOpen the project:\n{url}\n"
        ),
    }
}
