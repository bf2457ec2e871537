use anyhow::Context;
use routecheck::config::HarnessConfig;
use routecheck::run::{CancelToken, with_real_backends};
use routecheck::{corpus, report};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = HarnessConfig::from_env().context("configuration")?;

    // Log to stderr and to a non-blocking file in the output directory.
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output directory {}", config.output_dir))?;
    let file_appender = tracing_appender::rolling::never(&config.output_dir, "routecheck.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    eprintln!("📬 routecheck v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   SMTP: {}:{}", config.smtp.host, config.smtp.port);
    eprintln!("   IMAP: {}:{}", config.imap.host, config.imap.port);
    eprintln!("   Target inbox: {}", config.target_inbox);
    eprintln!(
        "   Folders mapped: {}  Settle: {}s  Cleanup: {}",
        config.mapping.len(),
        config.settle.as_secs(),
        config.cleanup
    );

    let cases = corpus::load_corpus(&config.corpus_path)
        .with_context(|| format!("loading corpus from {}", config.corpus_path))?;
    eprintln!("   Corpus: {} cases from {}\n", cases.len(), config.corpus_path);

    // Ctrl-C cancels: the wait barrier short-circuits into inspection and
    // in-flight work drains into a partial report.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; finishing with partial results");
                cancel.cancel();
            }
        });
    }

    let output_dir = config.output_dir.clone();
    let harness = with_real_backends(config)?;
    let run_report = harness.execute(&cases, cancel).await?;

    report::print_summary(&run_report);

    let json_path = report::export_json(&run_report, &output_dir)?;
    let csv_path = report::export_csv(&run_report, &output_dir)?;
    eprintln!("\nResults saved to:");
    eprintln!("  • JSON: {}", json_path.display());
    eprintln!("  • CSV:  {}", csv_path.display());

    Ok(())
}
