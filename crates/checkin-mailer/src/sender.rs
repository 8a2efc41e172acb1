//! SMTP sender for confirmation images.
//!
//! This module provides the [`Mailer`] struct, which delivers a multipart
//! message (text body plus image attachment) over an implicit-TLS relay.

use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

use crate::{MailConfig, MailerError, Result};

/// Sends confirmation images through the configured relay.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: MailConfig,
}

impl Mailer {
    /// Creates a mailer for the given relay settings.
    #[must_use]
    pub const fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Returns the relay settings.
    #[must_use]
    pub const fn config(&self) -> &MailConfig {
        &self.config
    }

    /// Sends `image_path` to `recipient` using the configured subject and body.
    pub async fn send_confirmation(&self, recipient: &str, image_path: &Path) -> Result<()> {
        self.send_image(recipient, &self.config.subject, &self.config.body, image_path)
            .await
    }

    /// Sends `image_path` as an attachment to `recipient`.
    ///
    /// Connection, authentication and delivery failures are returned as-is;
    /// nothing is retried.
    #[instrument(skip(self, body), fields(image = %image_path.display()))]
    pub async fn send_image(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        image_path: &Path,
    ) -> Result<()> {
        let image = tokio::fs::read(image_path).await?;
        let message = build_message(
            self.config.sender(),
            recipient,
            subject,
            body,
            image_path,
            image,
        )?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)?
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build();
        transport.send(message).await?;

        info!(to = recipient, "Confirmation email sent");
        Ok(())
    }
}

/// Assembles the multipart message without sending it.
///
/// The attachment is named after the base file name of `image_path`.
pub fn build_message(
    sender: &str,
    recipient: &str,
    subject: &str,
    body: &str,
    image_path: &Path,
    image: Vec<u8>,
) -> Result<Message> {
    let from: Mailbox = sender.parse()?;
    let to: Mailbox = recipient.parse()?;

    let file_name = image_path
        .file_name()
        .map_or_else(|| "checkin.jpg".to_string(), |n| n.to_string_lossy().to_string());
    let content_type = ContentType::parse(content_type_for(image_path))
        .map_err(|e| MailerError::Build(e.to_string()))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body.to_string()))
                .singlepart(Attachment::new(file_name).body(image, content_type)),
        )
        .map_err(|e| MailerError::Build(e.to_string()))
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") | None => "image/jpeg",
        Some(_) => "application/octet-stream",
    }
}
