//! Directory listings rendered as HTML

use crate::path::RequestPath;
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use ftpgate_ftp::DirEntry;

/// GET /dir/ - Render the backend listing of a directory
pub async fn list_directory(state: &AppState, path: &RequestPath) -> Result<Response, ApiError> {
    // Any listing fault is a 500, a missing directory included
    let entries = state.backend.list_directory(&path.decoded).await?;
    tracing::debug!(path = %path.decoded, entries = entries.len(), "listed directory");

    let html = render_listing(&path.decoded, &entries);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CONTENT_LENGTH, html.len().to_string())
        .body(Body::from(html))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Build the listing document for `display_path`, keeping backend order
pub fn render_listing(display_path: &str, entries: &[DirEntry]) -> String {
    let title = format!("Directory listing for {}", escape_html(display_path));

    let mut lines = vec![
        r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 4.01//EN" "http://www.w3.org/TR/html4/strict.dtd">"#
            .to_string(),
        "<html>\n<head>".to_string(),
        r#"<meta http-equiv="Content-Type" content="text/html; charset=utf-8">"#.to_string(),
        format!("<title>{}</title>\n</head>", title),
        format!("<body>\n<h1>{}</h1>", title),
        "<hr>\n<ul>".to_string(),
    ];

    for entry in entries.iter().filter(|e| !e.is_self_or_parent()) {
        let name = if entry.is_dir() && !entry.name.ends_with('/') {
            format!("{}/", entry.name)
        } else {
            entry.name.clone()
        };
        lines.push(format!(
            r#"<li><a href="{}">{}</a></li>"#,
            encode_link(&name),
            escape_html(&name)
        ));
    }

    lines.push("</ul>\n<hr>\n</body>\n</html>\n".to_string());
    lines.join("\n")
}

/// Percent-encode a link target segment by segment, keeping `/`
pub fn encode_link(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Escape text content; quotes are left alone
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
