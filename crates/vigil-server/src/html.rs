//! Minimal HTML rendering for the dashboard.
//!
//! Templating is deliberately plain `format!` — only the data model and the
//! 5-second polling cadence are contracts. Requests carrying `HX-Request`
//! get the content fragment alone; everything else gets the layout shell.

use axum::http::HeaderMap;

/// Poll interval for live pages, seconds.
pub const POLL_SECONDS: u32 = 5;

/// Escape text for safe interpolation into HTML.
#[must_use]
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Whether the request came from HTMX polling (fragment-only rendering).
#[must_use]
pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key("HX-Request")
}

/// Wrap a content fragment in the layout shell, unless HTMX asked for the
/// fragment alone.
#[must_use]
pub fn page(headers: &HeaderMap, title: &str, fragment: &str) -> String {
    if is_htmx(headers) {
        return fragment.to_string();
    }
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} · vigil</title>
<script src="https://unpkg.com/htmx.org@2.0.4"></script>
<style>
body {{ font-family: ui-monospace, monospace; margin: 2rem; background: #101418; color: #d6dde4; }}
a {{ color: #6fb3ff; text-decoration: none; }}
table {{ border-collapse: collapse; width: 100%; }}
td, th {{ border-bottom: 1px solid #2a3138; padding: 0.3rem 0.6rem; text-align: left; }}
.critical {{ color: #ff6f6f; }} .warning {{ color: #ffc76f; }} .info {{ color: #8fd18f; }}
nav a {{ margin-right: 1rem; }}
pre {{ white-space: pre-wrap; background: #161b21; padding: 0.8rem; }}
form.inline {{ display: inline; }}
</style>
</head>
<body>
<nav>
<a href="/">overview</a><a href="/sessions">sessions</a><a href="/events">events</a>
<a href="/memories">memories</a><a href="/cooldowns">cooldowns</a><a href="/config">config</a>
</nav>
<h1>{title}</h1>
{fragment}
</body>
</html>"#
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
