//! File and directory responses for the bundled static-file handler.

use chrono::{DateTime, Local};
use std::path::Path;

use crate::http::mime;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Resolves a decoded URI path under `root` into a response: a streamed
/// file body with its MIME type, or an HTML directory listing.
pub async fn respond_path(root: &Path, uri_path: &str) -> Response {
    let rel = uri_path.trim_start_matches('/');
    if rel.split('/').any(|seg| seg == "..") {
        return Response::not_found();
    }
    let target = if rel.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    };

    let meta = match tokio::fs::metadata(&target).await {
        Ok(meta) => meta,
        Err(_) => return Response::not_found(),
    };

    if meta.is_dir() {
        match dir_listing(uri_path, &target).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(path = %target.display(), error = %e, "Directory listing failed");
                Response::internal_error()
            }
        }
    } else {
        ResponseBuilder::new(StatusCode::Ok)
            .content_type(mime::by_path(&target))
            .file(target, meta.len())
            .build()
    }
}

/// Renders an HTML listing in directory order: name, modified time,
/// size. Dotfiles are skipped; a per-entry metadata failure becomes an
/// inline error row instead of aborting the listing.
async fn dir_listing(uri_path: &str, dir: &Path) -> std::io::Result<Response> {
    let title = if uri_path.is_empty() || uri_path == "/" {
        "."
    } else {
        uri_path.trim_start_matches('/')
    };
    let mut html = format!(
        "<html><head><title>Index of {title}</title></head><body><h1>Index of {title}</h1><hr>\
         <a href=\"..\">../</a><br><br><table width=\"100%\" border=\"0\">"
    );

    let base = if uri_path.ends_with('/') {
        uri_path.to_string()
    } else {
        format!("{}/", uri_path)
    };

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        match entry.metadata().await {
            Ok(meta) => {
                let slash = if meta.is_dir() { "/" } else { "" };
                let mtime = meta
                    .modified()
                    .map(|t| DateTime::<Local>::from(t).format("%F %T").to_string())
                    .unwrap_or_default();
                html.push_str(&format!(
                    "<tr><td><a href=\"{base}{name}{slash}\">{name}{slash}</a></td>\
                     <td>{mtime}</td><td>{}</td></tr>",
                    meta.len()
                ));
            }
            Err(_) => {
                html.push_str(&format!("<tr><td>ERROR: {name}</td><td>N/A</td></tr>"));
            }
        }
    }
    html.push_str("</table><hr></body>");

    Ok(ResponseBuilder::new(StatusCode::Ok)
        .content_type("text/html")
        .body(html.into_bytes())
        .build())
}
