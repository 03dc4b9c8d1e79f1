//! Account commands: sign-up, sign-in and password management.

use serde::Serialize;
use tracing::info;

use daybook_providers::{IdentityProvider, Profile, SignUpOutcome, User};

use crate::cli::AccountAction;
use crate::commands::{Context, value_or_prompt};
use crate::error::ClientResult;

pub async fn run(ctx: &Context, action: AccountAction) -> ClientResult<()> {
    let backend = ctx.backend()?;
    let identity = backend.identity();

    match action {
        AccountAction::Signup {
            email,
            name,
            password,
        } => {
            let password = value_or_prompt(password, "Password: ")?;
            let outcome = sign_up(identity, &email, &password, name.as_deref()).await?;
            ctx.emit(&AccountStatus::from(&outcome), || match &outcome {
                SignUpOutcome::Active(session) => {
                    format!("Account created. Signed in as {}.", session.user.label())
                }
                SignUpOutcome::PendingConfirmation(user) => format!(
                    "Account created. Check {} for a confirmation link, \
                     then run 'daybook account signin'.",
                    user.email.as_deref().unwrap_or(&email)
                ),
            })
        }
        AccountAction::Signin { email, password } => {
            let password = value_or_prompt(password, "Password: ")?;
            let session = identity.sign_in(&email, &password).await?;
            info!(user = %session.user.id, "signed in");
            ctx.emit(&AccountStatus::signed_in(&session.user), || {
                format!("Signed in as {}.", session.user.label())
            })
        }
        AccountAction::SigninOauth { provider } => {
            println!("Opening the browser to sign in with {}...", provider);
            let session = identity.sign_in_with_oauth(&provider).await?;
            info!(user = %session.user.id, %provider, "signed in with OAuth");
            ctx.emit(&AccountStatus::signed_in(&session.user), || {
                format!("Signed in as {}.", session.user.label())
            })
        }
        AccountAction::Signout => {
            identity.sign_out().await?;
            ctx.emit(&AccountStatus::signed_out(), || "Signed out.".to_string())
        }
        AccountAction::Whoami => {
            let session = identity.current_session().await?;
            match session {
                Some(session) => ctx.emit(&AccountStatus::signed_in(&session.user), || {
                    whoami_text(&session.user)
                }),
                None => ctx.emit(&AccountStatus::signed_out(), || {
                    "Not signed in. Run 'daybook account signin'.".to_string()
                }),
            }
        }
        AccountAction::ResetPassword { email } => {
            identity.request_password_reset(&email).await?;
            println!("If {} has an account, a reset link is on its way.", email);
            Ok(())
        }
        AccountAction::UpdatePassword { password } => {
            let password = value_or_prompt(password, "New password: ")?;
            identity.update_password(&password).await?;
            println!("Password updated.");
            Ok(())
        }
    }
}

/// Signs up with an optional display name; a blank name is not sent.
pub async fn sign_up(
    identity: &dyn IdentityProvider,
    email: &str,
    password: &str,
    name: Option<&str>,
) -> ClientResult<SignUpOutcome> {
    let outcome = identity.sign_up(email, password, Profile::new(name)).await?;
    match &outcome {
        SignUpOutcome::Active(session) => info!(user = %session.user.id, "signed up"),
        SignUpOutcome::PendingConfirmation(user) => {
            info!(user = %user.id, "signed up, waiting for email confirmation")
        }
    }
    Ok(outcome)
}

fn whoami_text(user: &User) -> String {
    let mut lines = vec![format!("Signed in as {}", user.label())];
    if let Some(ref email) = user.email
        && user.display_name.is_some()
    {
        lines.push(format!("  email: {}", email));
    }
    lines.push(format!("  id:    {}", user.id));
    if !user.email_confirmed {
        lines.push("  email not confirmed yet".to_string());
    }
    lines.join("\n")
}

/// JSON shape for account commands. Tokens are never printed.
#[derive(Debug, Serialize)]
struct AccountStatus<'a> {
    signed_in: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pending_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a User>,
}

impl<'a> AccountStatus<'a> {
    fn signed_in(user: &'a User) -> Self {
        Self {
            signed_in: true,
            pending_confirmation: false,
            user: Some(user),
        }
    }

    fn signed_out() -> Self {
        Self {
            signed_in: false,
            pending_confirmation: false,
            user: None,
        }
    }
}

impl<'a> From<&'a SignUpOutcome> for AccountStatus<'a> {
    fn from(outcome: &'a SignUpOutcome) -> Self {
        match outcome {
            SignUpOutcome::Active(session) => Self::signed_in(&session.user),
            SignUpOutcome::PendingConfirmation(user) => Self {
                signed_in: false,
                pending_confirmation: true,
                user: Some(user),
            },
        }
    }
}
