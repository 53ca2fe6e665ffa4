//! HTML pages and cookie construction.

use std::time::Duration;

use chrono::Utc;

use cerberus_core::Config;

/// Everything the browser worker needs to solve a challenge
#[derive(Debug, Clone)]
pub struct ChallengeData {
    pub challenge: String,
    pub difficulty: u32,
    pub nonce: u32,
    pub ts: i64,
    pub signature: String,
    pub redir: String,
}

/// Simple HTML escaping for safety
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn http_date_in(ttl: Duration) -> String {
    let expires = Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64);
    expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn http_date_past() -> String {
    let past = Utc::now() - chrono::Duration::hours(1);
    past.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `Set-Cookie` value carrying a signed approval token.
pub fn approval_cookie(name: &str, token: &str, ttl: Duration) -> String {
    format!(
        "{}={}; Path=/; SameSite=Lax; Expires={}",
        name,
        token,
        http_date_in(ttl)
    )
}

/// `Set-Cookie` value that clears any previous approval.
pub fn clear_cookie(name: &str) -> String {
    format!(
        "{}=; Path=/; SameSite=Lax; Max-Age=0; Expires={}",
        name,
        http_date_past()
    )
}

/// Render the interstitial challenge page.
///
/// The solve parameters are embedded as JSON for the worker script; the form
/// is what ultimately posts the solution back.
pub fn challenge_page(config: &Config, base: &str, data: &ChallengeData) -> String {
    let params = serde_json::json!({
        "challenge": data.challenge,
        "difficulty": data.difficulty,
        "nonce": data.nonce,
        "ts": data.ts,
        "signature": data.signature,
        "action": format!("{base}/answer"),
    })
    .to_string()
    .replace('<', "\\u003c");

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="{base}/static/style.css">
</head>
<body>
    <div class="container">
        <div class="brand">
            <span class="brand-logo">&#128274;</span>
            <div class="brand-text">
                <h1>{title}</h1>
                <p class="subtitle">Making sure you're not a bot!</p>
            </div>
        </div>

        <div class="challenge-box">
            <div class="spinner" id="spinner"></div>
            <p class="instructions" id="status">Your browser is solving a small puzzle. This usually takes a few seconds.</p>
            <p class="progress" id="progress"></p>
        </div>

        <form method="POST" action="{base}/answer" id="answer-form">
            <input type="hidden" name="nonce" value="{nonce}">
            <input type="hidden" name="ts" value="{ts}">
            <input type="hidden" name="signature" value="{signature}">
            <input type="hidden" name="redir" value="{redir}">
            <input type="hidden" name="solution" value="" id="solution">
            <input type="hidden" name="response" value="" id="response">
            <noscript>
                <p class="error" style="display:block">JavaScript is required to pass this check.</p>
            </noscript>
        </form>

        <div class="footer">
            Protected by Cerberus
        </div>
    </div>
    <script>window.CERBERUS_CHALLENGE = {params};</script>
    <script src="{base}/static/challenge.js" defer></script>
</body>
</html>"##,
        title = html_escape(&config.title),
        base = base,
        nonce = data.nonce,
        ts = data.ts,
        signature = html_escape(&data.signature),
        redir = html_escape(&data.redir),
        params = params,
    )
}

/// Render a failure page. Carries no detail beyond the message itself.
pub fn error_page(config: &Config, base: &str, header: &str, msg: &str) -> String {
    let mail_html = if config.mail.is_empty() {
        String::new()
    } else {
        format!(
            r#"<p class="contact">If this keeps happening, contact <a href="mailto:{mail}">{mail}</a>.</p>"#,
            mail = html_escape(&config.mail)
        )
    };

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="{base}/static/style.css">
</head>
<body>
    <div class="container">
        <div class="brand">
            <span class="brand-logo">&#9888;</span>
            <div class="brand-text">
                <h1>{header}</h1>
            </div>
        </div>
        <div class="error" style="display:block">{msg}</div>
        {mail_html}
        <div class="footer">
            Protected by Cerberus
        </div>
    </div>
</body>
</html>"##,
        title = html_escape(&config.title),
        base = base,
        header = html_escape(header),
        msg = html_escape(msg),
        mail_html = mail_html,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape(r#"<b>"bold"&'x'</b>"#),
            "&lt;b&gt;&quot;bold&quot;&amp;&#39;x&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn challenge_page_embeds_solve_params() {
        let config = Config::default();
        let data = ChallengeData {
            challenge: "ab".repeat(32),
            difficulty: 4,
            nonce: 42,
            ts: 1_700_000_000,
            signature: "cd".repeat(64),
            redir: "/account?page=2".to_string(),
        };

        let html = challenge_page(&config, "/cerberus", &data);
        assert!(html.contains(&data.challenge));
        assert!(html.contains(r#"name="nonce" value="42""#));
        assert!(html.contains("/cerberus/answer"));
        assert!(html.contains("/cerberus/static/challenge.js"));
    }

    #[test]
    fn error_page_never_leaks_internals() {
        let mut config = Config::default();
        config.mail = "ops@example.org".into();
        let html = error_page(&config, "/cerberus", "An error occurred", "nonce already used");
        assert!(html.contains("nonce already used"));
        assert!(html.contains("ops@example.org"));
        assert!(!html.contains("Fingerprint"));
    }

    #[test]
    fn cookies_carry_expected_attributes() {
        let cookie = approval_cookie("cerberus-auth", "tok", Duration::from_secs(3600));
        assert!(cookie.starts_with("cerberus-auth=tok; Path=/; SameSite=Lax; Expires="));
        assert!(cookie.ends_with("GMT"));

        let cleared = clear_cookie("cerberus-auth");
        assert!(cleared.starts_with("cerberus-auth=; Path=/; SameSite=Lax; Max-Age=0"));
    }
}
