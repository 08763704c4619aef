use invoice_ingest::config::Config;
use invoice_ingest::mailbox::ImapSession;
use invoice_ingest::pipeline::Orchestrator;
use invoice_ingest::storage::HttpUploadSink;

/// Exit codes: 0 = clean run, 1 = at least one message failed,
/// 2 = session-fatal error before any message was processed.
#[tokio::main]
async fn main() {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    eprintln!("invoice-ingest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IMAP: {}:{}", config.imap_host, config.imap_port);
    eprintln!("   Processed folder: {}", config.processed_folder);
    eprintln!("   Keywords: {}", config.keywords.join(", "));

    // The session is blocking with socket timeouts and must be driven
    // strictly sequentially, so the whole run lives off the async runtime.
    let code = tokio::task::spawn_blocking(move || run(config))
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Ingestion task panicked");
            2
        });

    std::process::exit(code);
}

fn run(config: Config) -> i32 {
    let sink = match HttpUploadSink::new(&config) {
        Ok(sink) => sink,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upload sink");
            return 2;
        }
    };

    let mut mailbox = match ImapSession::connect(&config) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, host = %config.imap_host, "Connection failed");
            return 2;
        }
    };

    match Orchestrator::new(&config, &sink).run(&mut mailbox) {
        Ok(summary) => {
            match serde_json::to_string(&summary) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!(error = %e, "Failed to serialize summary"),
            }
            if summary.failed > 0 { 1 } else { 0 }
        }
        Err(e) => {
            tracing::error!(error = %e, "Run aborted by protocol error");
            2
        }
    }
}
