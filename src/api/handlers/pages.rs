//! Server-rendered pages.
//!
//! The page content is deliberately thin; the interesting behavior is the
//! authorization gate these routes sit behind. Every route registered here
//! must also be covered by the gate's route classifier.

use axum::{response::Html, routing::get, Router};

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title} - Nexus OS</title>\n</head>\n<body>\n<main>\n{body}\n</main>\n</body>\n</html>\n"
    ))
}

pub async fn home() -> Html<String> {
    layout(
        "Welcome",
        "<h1>Nexus OS</h1>\n<p>Inventory health for your store.</p>\n\
         <p><a href=\"/signup\">Create an account</a> or <a href=\"/login\">sign in</a>.</p>",
    )
}

pub async fn login() -> Html<String> {
    layout(
        "Sign in",
        "<h1>Sign in</h1>\n<form method=\"post\" action=\"/v1/auth/login\" id=\"login-form\">\n\
         <input name=\"email\" type=\"email\" placeholder=\"Email\">\n\
         <input name=\"password\" type=\"password\" placeholder=\"Password\">\n\
         <button type=\"submit\">Sign in</button>\n</form>\n\
         <p><a href=\"/reset-password\">Forgot your password?</a></p>",
    )
}

pub async fn signup() -> Html<String> {
    layout(
        "Create account",
        "<h1>Create account</h1>\n<form method=\"post\" action=\"/v1/auth/signup\" id=\"signup-form\">\n\
         <input name=\"email\" type=\"email\" placeholder=\"Email\">\n\
         <input name=\"password\" type=\"password\" placeholder=\"Password\">\n\
         <button type=\"submit\">Sign up</button>\n</form>",
    )
}

pub async fn reset_password() -> Html<String> {
    layout(
        "Reset password",
        "<h1>Reset password</h1>\n<p>Enter your email and we will send a reset link.</p>",
    )
}

pub async fn two_factor() -> Html<String> {
    layout(
        "Two-factor",
        "<h1>Two-factor verification</h1>\n<p>Enter the code from your authenticator app.</p>",
    )
}

pub async fn activate() -> Html<String> {
    layout(
        "Activate account",
        "<h1>Activate your account</h1>\n<p>Hold on while we confirm your activation link.</p>",
    )
}

pub async fn invite() -> Html<String> {
    layout(
        "Accept invite",
        "<h1>You're invited</h1>\n<p>Choose a password to finish setting up your account.</p>",
    )
}

pub async fn checkout() -> Html<String> {
    layout(
        "Checkout",
        "<h1>Upgrade to PRO</h1>\n<p>Unlock manual sync and premium dashboards.</p>",
    )
}

pub async fn bling() -> Html<String> {
    layout(
        "Bling",
        "<h1>Bling connection</h1>\n<p>Connect your Bling account to start syncing inventory.</p>",
    )
}

pub async fn dashboard() -> Html<String> {
    layout(
        "Dashboard",
        "<h1>Dashboard</h1>\n<p>Inventory alerts and overview metrics appear here after a sync.</p>",
    )
}

pub async fn onboarding() -> Html<String> {
    layout(
        "Onboarding",
        "<h1>Welcome aboard</h1>\n<p>A few steps to get your inventory flowing.</p>",
    )
}

pub async fn settings() -> Html<String> {
    layout(
        "Settings",
        "<h1>Settings</h1>\n<p>Account, security, and billing preferences.</p>",
    )
}

pub async fn admin() -> Html<String> {
    layout("Admin", "<h1>Admin</h1>\n<p>Operational tools.</p>")
}

pub async fn users() -> Html<String> {
    layout("Users", "<h1>Users</h1>\n<p>Manage accounts and invites.</p>")
}

pub async fn not_authorized() -> Html<String> {
    layout(
        "Not authorized",
        "<h1>Sem permissao</h1>\n<p>Your account does not have access to this page.</p>\n\
         <p><a href=\"/bling\">Back to the app</a></p>",
    )
}

/// Page router; the authorization gate middleware is layered on by the
/// server assembly so these handlers never see an unauthorized request.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login))
        .route("/signup", get(signup))
        .route("/reset-password", get(reset_password))
        .route("/two-factor", get(two_factor))
        .route("/activate", get(activate))
        .route("/invite", get(invite))
        .route("/checkout", get(checkout))
        .route("/bling", get(bling))
        .route("/dashboard", get(dashboard))
        .route("/onboarding", get(onboarding))
        .route("/settings", get(settings))
        .route("/admin", get(admin))
        .route("/users", get(users))
        .route("/sem-permissao", get(not_authorized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_render_within_the_layout() {
        let Html(body) = home().await;
        assert!(body.starts_with("<!doctype html>"));
        assert!(body.contains("Nexus OS"));

        let Html(body) = not_authorized().await;
        assert!(body.contains("Sem permissao"));
    }
}
