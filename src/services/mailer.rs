//! Outgoing account email.
//!
//! Handlers pass a [`Message`] to the [`Mailer`] held in the application
//! state. [`LogMailer`] writes messages to the log, with the token itself
//! only at debug level; a deployment with a mail relay plugs in its own
//! implementation.

use chrono::{DateTime, Utc};

use crate::{error::AppError, models::token::Token};

#[derive(Debug)]
pub enum Message<'a> {
    /// Sent on registration, carries the activation token.
    Welcome {
        username: &'a str,
        activation_token: &'a Token,
    },
    PasswordReset { reset_token: &'a Token },
}

impl Message<'_> {
    pub fn template(&self) -> &'static str {
        match self {
            Message::Welcome { .. } => "user_welcome",
            Message::PasswordReset { .. } => "password_reset",
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Message::Welcome { username, .. } => Some(username),
            Message::PasswordReset { .. } => None,
        }
    }

    fn token(&self) -> &Token {
        match self {
            Message::Welcome {
                activation_token, ..
            } => activation_token,
            Message::PasswordReset { reset_token } => reset_token,
        }
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.token().expiry
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, recipient: &str, message: &Message<'_>) -> Result<(), AppError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, recipient: &str, message: &Message<'_>) -> Result<(), AppError> {
        tracing::info!(
            recipient,
            template = message.template(),
            username = message.username(),
            expiry = %message.expiry(),
            "email sent"
        );
        tracing::debug!(
            recipient,
            template = message.template(),
            token = %message.token().plaintext,
            "email token"
        );
        Ok(())
    }
}

/// Send `message`, logging rather than failing the request when delivery
/// does not work out. The token stays valid either way.
pub fn deliver(mailer: &dyn Mailer, recipient: &str, message: &Message<'_>) {
    if let Err(err) = mailer.send(recipient, message) {
        tracing::error!(
            error = %err,
            recipient,
            template = message.template(),
            "failed to send email"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::token::{SCOPE_ACTIVATION, SCOPE_PASSWORD_RESET, activation_ttl};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FailingMailer {
        attempts: Mutex<Vec<&'static str>>,
    }

    impl Mailer for FailingMailer {
        fn send(&self, _recipient: &str, message: &Message<'_>) -> Result<(), AppError> {
            self.attempts.lock().unwrap().push(message.template());
            Err(anyhow::anyhow!("relay unavailable").into())
        }
    }

    #[test]
    fn templates_follow_the_message_kind() {
        let token = Token::generate(Uuid::nil(), activation_ttl(), SCOPE_ACTIVATION);
        let welcome = Message::Welcome {
            username: "ada",
            activation_token: &token,
        };
        assert_eq!(welcome.template(), "user_welcome");
        assert_eq!(welcome.username(), Some("ada"));
        assert_eq!(welcome.expiry(), token.expiry);

        let reset = Token::generate(Uuid::nil(), activation_ttl(), SCOPE_PASSWORD_RESET);
        assert_eq!(
            Message::PasswordReset {
                reset_token: &reset
            }
            .template(),
            "password_reset"
        );
    }

    #[test]
    fn delivery_failures_are_swallowed() {
        let mailer = FailingMailer::default();
        let token = Token::generate(Uuid::nil(), activation_ttl(), SCOPE_PASSWORD_RESET);

        deliver(
            &mailer,
            "ada@example.com",
            &Message::PasswordReset {
                reset_token: &token,
            },
        );

        assert_eq!(*mailer.attempts.lock().unwrap(), vec!["password_reset"]);
    }

    #[test]
    fn log_mailer_always_succeeds() {
        let token = Token::generate(Uuid::nil(), activation_ttl(), SCOPE_ACTIVATION);
        let message = Message::Welcome {
            username: "ada",
            activation_token: &token,
        };
        assert!(LogMailer.send("ada@example.com", &message).is_ok());
    }
}
