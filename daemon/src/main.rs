use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use tokio::sync::Notify;

use casepress::collaborators::http::HttpGenerationClient;
use casepress::{
    load_config, telemetry, BatchScheduler, CasepressError, Config, ConfigError, Database,
    ItemPipeline, ItemProgressBroadcaster,
};

fn main() {
    if let Err(e) = run() {
        eprintln!("casepressd: {}", e);
        std::process::exit(1);
    }
}

/// Notified once on Ctrl-C.
fn shutdown_signal() -> casepress::Result<Arc<Notify>> {
    let interrupted = Arc::new(Notify::new());
    let signal = Arc::clone(&interrupted);
    ctrlc::set_handler(move || signal.notify_one())
        .map_err(|e| CasepressError::Signal(e.to_string()))?;
    Ok(interrupted)
}

fn run() -> casepress::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(PathBuf::from(path))?,
        None => Config::default(),
    };
    telemetry::init_logging(&config.logging)?;
    info!("Starting casepressd v{}", env!("CARGO_PKG_VERSION"));

    let db_path = config.database_path().ok_or_else(|| ConfigError::Validation {
        message: "could not determine a database location; set database_path".to_string(),
    })?;
    let db = Database::open(&db_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CasepressError::Runtime)?;

    runtime.block_on(async move {
        let generator = Arc::new(HttpGenerationClient::from_config(&config.generation)?);
        let pipeline = Arc::new(ItemPipeline::from_config(&config, db, generator));
        let scheduler = Arc::new(BatchScheduler::from_config(
            &config,
            pipeline,
            ItemProgressBroadcaster::new(100),
        ));

        let interrupted = shutdown_signal()?;
        let handle = scheduler.start();
        interrupted.notified().await;
        info!("Shutdown requested, finishing in-flight items");
        handle.stop().await;
        Ok::<(), CasepressError>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_signal_handler_is_an_error() {
        assert!(shutdown_signal().is_ok());
        match shutdown_signal() {
            Err(CasepressError::Signal(message)) => assert!(!message.is_empty()),
            other => panic!("expected signal error, got {:?}", other.map(|_| ())),
        }
    }
}
