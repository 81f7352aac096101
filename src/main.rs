//! Fieldcheck server binary.

use std::sync::Arc;

use fieldcheck::api::{self, AppState};
use fieldcheck::blob::LocalBlobStore;
use fieldcheck::config::Config;
use fieldcheck::dispatch::HttpResultDispatcher;
use fieldcheck::notify::{DisabledMailer, HttpMailer, Mailer, Notifier};
use fieldcheck::report::PdfReportGenerator;
use fieldcheck::scheduler::OverdueScanner;
use fieldcheck::store::{SharedStore, SqliteStore};
use fieldcheck::Workflow;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if config.dev_mode {
        tracing::warn!("DEV_MODE is on: unauthenticated requests act as admin");
    }

    let store: SharedStore = Arc::new(SqliteStore::open(&config.database_path)?);
    tracing::info!("Using database {}", config.database_path.display());

    let blobs = Arc::new(LocalBlobStore::new(
        config.blob_dir.clone(),
        &config.public_base_url,
    ));

    let mailer: Arc<dyn Mailer> = if config.mail.enabled() {
        Arc::new(HttpMailer::new(
            config.mail.relay_urls.clone(),
            config.mail.from.clone(),
            config.mail.api_key.clone(),
        ))
    } else {
        tracing::warn!("MAIL_RELAY_URLS not set, emails are disabled");
        Arc::new(DisabledMailer)
    };
    let notifier = Arc::new(Notifier::new(mailer, store.clone()));

    let publisher = Arc::new(HttpResultDispatcher::new(
        blobs.clone(),
        config.dispatch_timeout,
    )?);

    let workflow = Workflow::new(
        store.clone(),
        blobs,
        Arc::new(PdfReportGenerator),
        publisher,
        notifier.clone(),
        config.policy(),
    );

    let scanner = Arc::new(OverdueScanner::new(store, notifier));
    let scan = scanner.spawn(config.overdue_scan_at);

    let state = Arc::new(AppState {
        config,
        workflow: Arc::new(workflow),
    });
    let result = api::serve(state).await;
    scan.abort();
    result
}
