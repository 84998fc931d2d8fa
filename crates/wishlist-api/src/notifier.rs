use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

/// An invitation to collaborate on a wishlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub to_email: String,
    pub wishlist_name: String,
    pub inviter_name: String,
    pub join_link: String,
}

/// Delivers invitations. Returns whether delivery succeeded; callers treat a
/// failure as non-fatal.
#[async_trait]
pub trait InvitationNotifier: Send + Sync {
    async fn notify(&self, invitation: &Invitation) -> bool;
}

/// Used when no mail relay is configured: the invitation is only logged.
pub struct LogNotifier;

#[async_trait]
impl InvitationNotifier for LogNotifier {
    async fn notify(&self, invitation: &Invitation) -> bool {
        info!(
            "Invitation for {} to \"{}\" from {}: {}",
            invitation.to_email, invitation.wishlist_name, invitation.inviter_name, invitation.join_link
        );
        true
    }
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(host: &str, username: &str, password: &str, from: &str) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();
        Ok(Self {
            transport,
            from: from.parse()?,
        })
    }

    fn build(&self, invitation: &Invitation) -> anyhow::Result<Message> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(invitation.to_email.parse()?)
            .subject("You've been invited to collaborate on a wishlist!")
            .header(ContentType::TEXT_HTML)
            .body(render_invitation(invitation))?)
    }
}

#[async_trait]
impl InvitationNotifier for SmtpNotifier {
    async fn notify(&self, invitation: &Invitation) -> bool {
        let message = match self.build(invitation) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invitation to {} not built: {}", invitation.to_email, e);
                return false;
            }
        };
        match self.transport.send(message).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Error sending invitation to {}: {}", invitation.to_email, e);
                false
            }
        }
    }
}

pub fn render_invitation(invitation: &Invitation) -> String {
    format!(
        r#"<h2>Wishlist Invitation</h2>
<p>Hi there!</p>
<p>{inviter} has invited you to collaborate on the wishlist "{wishlist}".</p>
<p>Click the link below to join:</p>
<a href="{link}" style="display: inline-block; padding: 10px 20px; background-color: #4F46E5; color: white; text-decoration: none; border-radius: 5px;">Join Wishlist</a>
<p>If you don't have an account yet, you'll be able to create one when you click the link.</p>
<p>Happy collaborating!</p>
"#,
        inviter = escape_html(&invitation.inviter_name),
        wishlist = escape_html(&invitation.wishlist_name),
        link = escape_html(&invitation.join_link),
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation() -> Invitation {
        Invitation {
            to_email: "yasmin@example.com".into(),
            wishlist_name: "Birthday <3".into(),
            inviter_name: "xavier".into(),
            join_link: "http://localhost:5173/wishlist/abc".into(),
        }
    }

    #[test]
    fn invitation_html_names_inviter_and_escapes() {
        let html = render_invitation(&invitation());
        assert!(html.contains("xavier has invited you"));
        assert!(html.contains("\"Birthday &lt;3\""));
        assert!(html.contains(r#"href="http://localhost:5173/wishlist/abc""#));
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.notify(&invitation()).await);
    }
}
