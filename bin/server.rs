// Statement Convert - Web Server
// Upload → background conversion → status polling → download

use anyhow::Context;
use std::sync::Arc;

use statement_convert::api::run_server;
use statement_convert::{
    CsvTableExtractor, JobStore, LocalObjectStore, MemoryJobStore, Orchestrator,
    OrchestratorSettings, Settings, SqliteJobStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statement_convert=debug,tower_http=debug".into()),
        )
        .init();

    let settings = Settings::from_env()?;

    println!("🌐 Statement Convert - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Storage root: {}", settings.storage.root.display());
    println!("Statement year: {}", settings.statement.year());
    println!("Production mode: {}", settings.production);

    std::fs::create_dir_all(&settings.storage.root).with_context(|| {
        format!("Failed to create storage root {}", settings.storage.root.display())
    })?;

    let jobs: Arc<dyn JobStore> = match &settings.storage.job_db {
        Some(path) => {
            println!("✓ Job database: {}", path.display());
            Arc::new(SqliteJobStore::open(path)?)
        }
        None => {
            println!("⚠️  No job database configured; job status is kept in memory");
            Arc::new(MemoryJobStore::new())
        }
    };

    let orchestrator = Orchestrator::new(
        Arc::new(LocalObjectStore::new(&settings.storage.root)),
        jobs,
        Arc::new(CsvTableExtractor::new()),
        OrchestratorSettings::from(&settings),
    );

    println!("\n🚀 Server running on http://{}:{}", settings.server.host, settings.server.port);
    println!("   Upload: POST /api/uploads");
    println!("\n   Press Ctrl+C to stop\n");

    run_server(orchestrator, &settings.server.host, settings.server.port).await
}
