// External collaborators consumed by the core: email delivery and
// identity resolution.

pub mod email;
pub mod identity;

pub use email::{EmailSender, EmailTemplate, OutboundEmail, SendOutcome, SmtpEmailSender};
pub use identity::{IdentityResolver, PgIdentityResolver, Profile};
