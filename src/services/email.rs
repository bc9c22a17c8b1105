//! Outbound email collaborator: an SMTP-backed sender plus the nurture
//! templates used by workflow actions.

use crate::config::SmtpConfig;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

/// Delivery outcome reported back to the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn delivered(message_id: String) -> Self {
        Self {
            success: true,
            message_id: Some(message_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> SendOutcome;
}

#[derive(Debug, Clone)]
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpEmailSender {
    pub fn new(smtp_config: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(smtp_config.username.clone(), smtp_config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    fn build_message(&self, email: &OutboundEmail) -> CoreResult<(Message, String)> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| CoreError::collaborator("email", format!("invalid sender: {}", e)))?;
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| CoreError::collaborator("email", format!("invalid recipient: {}", e)))?;
        let message_id = format!("<{}@meridiantax.com>", uuid::Uuid::new_v4());

        let builder = Message::builder()
            .from(from)
            .to(to)
            .message_id(Some(message_id.clone()))
            .subject(&email.subject);

        let message = if let Some(text) = &email.text_body {
            builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
        } else {
            builder.body(email.html_body.clone())
        }
        .map_err(|e| CoreError::collaborator("email", e.to_string()))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: &OutboundEmail) -> SendOutcome {
        let (message, message_id) = match self.build_message(email) {
            Ok(built) => built,
            Err(e) => return SendOutcome::failed(e.to_string()),
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent to {}", email.to);
                SendOutcome::delivered(message_id)
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", email.to, e);
                SendOutcome::failed(e.to_string())
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

/// Welcome email for a newly captured lead.
pub fn lead_welcome_template(first_name: &str, portal_url: &str) -> EmailTemplate {
    let subject = "Welcome to Meridian Tax".to_string();

    let html_body = format!(
        r#"
        <html>
        <head>
            <style>
                body {{ font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }}
                .container {{ max-width: 600px; margin: 0 auto; background: white; border-radius: 8px; overflow: hidden; }}
                .header {{ background: #0f766e; color: white; padding: 20px; text-align: center; }}
                .content {{ padding: 30px; }}
                .btn {{ display: inline-block; background: #0f766e; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; margin: 10px 0; }}
                .footer {{ background: #f8fafc; padding: 20px; text-align: center; color: #666; }}
            </style>
        </head>
        <body>
            <div class="container">
                <div class="header">
                    <h1>Welcome to Meridian Tax</h1>
                </div>
                <div class="content">
                    <p>Hello {},</p>
                    <p>Thanks for reaching out. A tax preparer will review your information and follow up shortly.</p>
                    <p>You can start your intake any time:</p>
                    <a href="{}" class="btn">Start Your Intake</a>
                    <p>Best regards,<br>The Meridian Tax Team</p>
                </div>
                <div class="footer">
                    <p>This is an automated message. Please do not reply directly to this email.</p>
                </div>
            </div>
        </body>
        </html>
        "#,
        first_name, portal_url
    );

    let text_body = format!(
        "Welcome to Meridian Tax\n\n\
        Hello {},\n\n\
        Thanks for reaching out. A tax preparer will review your information and follow up shortly.\n\n\
        Start your intake at: {}\n\n\
        Best regards,\n\
        The Meridian Tax Team",
        first_name, portal_url
    );

    EmailTemplate {
        subject,
        html_body,
        text_body: Some(text_body),
    }
}

/// Notification sent to a lead when a preparer is assigned to them.
pub fn preparer_assignment_template(
    first_name: &str,
    preparer_name: &str,
    portal_url: &str,
) -> EmailTemplate {
    let subject = format!("{} will be preparing your return", preparer_name);

    let html_body = format!(
        r#"
        <html>
        <head>
            <style>
                body {{ font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }}
                .container {{ max-width: 600px; margin: 0 auto; background: white; border-radius: 8px; overflow: hidden; }}
                .header {{ background: #0f766e; color: white; padding: 20px; text-align: center; }}
                .content {{ padding: 30px; }}
                .btn {{ display: inline-block; background: #0f766e; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; margin: 10px 0; }}
            </style>
        </head>
        <body>
            <div class="container">
                <div class="header">
                    <h1>Your Preparer Is Ready</h1>
                </div>
                <div class="content">
                    <p>Hello {},</p>
                    <p>{} has been assigned to prepare your return and will be in touch soon.</p>
                    <a href="{}" class="btn">View Your Account</a>
                    <p>Best regards,<br>The Meridian Tax Team</p>
                </div>
            </div>
        </body>
        </html>
        "#,
        first_name, preparer_name, portal_url
    );

    EmailTemplate {
        subject,
        html_body,
        text_body: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_outcome_constructors() {
        let ok = SendOutcome::delivered("<abc@meridiantax.com>".to_string());
        assert!(ok.success);
        assert!(ok.message_id.is_some());
        assert!(ok.error.is_none());

        let failed = SendOutcome::failed("connection refused");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_welcome_template_contains_name_and_link() {
        let template = lead_welcome_template("Dana", "https://app.meridiantax.com/intake");
        assert!(template.html_body.contains("Hello Dana"));
        assert!(template.html_body.contains("https://app.meridiantax.com/intake"));
        assert!(template.text_body.as_ref().unwrap().contains("Dana"));
    }

    #[test]
    fn test_assignment_template_subject() {
        let template =
            preparer_assignment_template("Dana", "Alma Reyes", "https://app.meridiantax.com");
        assert_eq!(template.subject, "Alma Reyes will be preparing your return");
        assert!(template.text_body.is_none());
    }
}
