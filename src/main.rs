use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use filament::config::Config;
use filament::http::request::Request;
use filament::http::response::Response;
use filament::server::{Handler, HttpServer, files};

/// Serves files and directory listings from the configured root.
struct StaticFiles {
    root: PathBuf,
}

#[async_trait]
impl Handler for StaticFiles {
    async fn handle(&self, request: &Request) -> Response {
        files::respond_path(&self.root, &request.path).await
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load();
    let handler = Arc::new(StaticFiles {
        root: cfg.server.root_dir.clone(),
    });
    let server = HttpServer::bind(&cfg.server, handler)?;

    tokio::select! {
        res = server.run() => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
