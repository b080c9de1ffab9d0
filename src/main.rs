#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() -> std::io::Result<()> {
    use schemaflow::core::api::schema_router;
    use schemaflow::core::backup::{BackupStore, BackupWriter, FileBackupStore, MemoryBackupStore};
    use schemaflow::core::config::Config;
    use schemaflow::core::editor::{EditorConfig, SchemaEditor};
    use schemaflow::core::mutation_source::HttpMutationSource;
    use std::sync::Arc;
    use tower_http::compression::{CompressionLayer, CompressionLevel};
    use tower_http::cors::CorsLayer;
    use tracing_subscriber::EnvFilter;

    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    tracing::info!(
        ai_backend = config.has_ai_backend(),
        backup_dir = config.has_backup_dir(),
        max_tables = config.max_tables,
        allow_destructive = config.allow_destructive,
        "config loaded"
    );

    let store: Arc<dyn BackupStore> = match &config.backup_dir {
        Some(dir) => Arc::new(FileBackupStore::new(dir)),
        None => Arc::new(MemoryBackupStore::new()),
    };
    let backup = BackupWriter::spawn(store, config.backup_debounce());

    let source = HttpMutationSource::new(config.ai_backend_url.as_deref());
    let editor = Arc::new(
        SchemaEditor::new(source, EditorConfig::from_config(&config)).with_backup(backup),
    );

    let app = schema_router(Arc::clone(&editor))
        .layer(CorsLayer::permissive())
        .layer(
            CompressionLayer::new()
                .br(true)
                .gzip(true)
                .quality(CompressionLevel::Default),
        );

    let listener = tokio::net::TcpListener::bind(&config.site_addr).await?;
    tracing::info!("listening on http://{}", config.site_addr);
    tracing::info!("schema API: http://{}/api/schema", config.site_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Edits from the last debounce window are still pending
    editor.flush_backup().await;
    tracing::info!("server stopped");
    Ok(())
}

#[cfg(feature = "ssr")]
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(feature = "ssr"))]
pub fn main() {
    // the server needs the `ssr` feature
}
