//! Locally rendered HTML error pages.
//!
//! The data path answers for the upstream when routing fails or the
//! upstream itself errors; these pages are what the client sees instead
//! of a bare status line.

use http::StatusCode;

/// Error page template. Placeholders are substituted by [`render`].
const ERROR_PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><title>{#title#}</title></head>
<body>
<h1>{#title#}</h1>
<p>{#msg#}</p>
<table>
<tr><td>URL:</td><td>{#url#}</td></tr>
<tr><td>Server:</td><td>{#host#}</td></tr>
</table>
<hr/>Powered by steelyard</body>
</html>
"#;

/// Renders the HTML error page for the given status and context.
pub fn render(status: StatusCode, msg: &str, url: &str, host: &str) -> String {
    let title = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );
    ERROR_PAGE_TEMPLATE
        .replace("{#title#}", &title)
        .replace("{#msg#}", msg)
        .replace("{#url#}", url)
        .replace("{#host#}", host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_status_line() {
        let page = render(StatusCode::BAD_GATEWAY, "upstream failed", "/x", "example.com");
        assert!(page.contains("502 Bad Gateway"));
        assert!(page.contains("upstream failed"));
        assert!(page.contains("/x"));
        assert!(page.contains("example.com"));
    }

    #[test]
    fn test_render_unknown_status() {
        let status = StatusCode::from_u16(599).unwrap();
        let page = render(status, "odd", "/", "h");
        assert!(page.contains("599 Error"));
    }
}
