//! Guest identity — binary entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config, init logger at the configured level
//!   3. Resolve identity from the store file (load or generate)
//!   4. First run only: ask for age / gender / country, then save
//!   5. Launch the console app; persist every edit it sends back

use std::fs;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;

use guest_identity::{
    bootstrap::Bootstrapper,
    config,
    console::ConsoleApp,
    entropy::OsEntropy,
    error::AppError,
    launcher, logger,
    profile::{self, GateOutcome, ProfileForm, TerminalForm},
    store::{FileKvStore, IdentityStore},
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let config = config::load()?;
    fs::create_dir_all(&config.identity.work_dir)?;
    logger::init(config.logging.level, config.logging.file.as_deref())?;

    info!(
        work_dir = %config.identity.work_dir.display(),
        key = %config.identity.key,
        log_level = %config.logging.level,
        "config loaded"
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received");
                shutdown.cancel();
            }
        });
    }

    let kv = Arc::new(FileKvStore::new(config.identity.store_path()));
    let store = IdentityStore::new(kv, config.identity.key.clone());

    let bootstrap = Bootstrapper::new(store.clone(), OsEntropy)
        .with_guest_prefix(config.identity.guest_prefix.clone())
        .resolve()?;

    let mut form = TerminalForm::new(BufReader::new(tokio::io::stdin()));
    let form_ref: Option<&mut dyn ProfileForm> =
        if config.app.profile_form { Some(&mut form as &mut dyn ProfileForm) } else { None };

    let record = match profile::capture(bootstrap, form_ref, &store, &shutdown).await? {
        GateOutcome::Launch(record) => record,
        GateOutcome::Abandoned => {
            info!("profile form not submitted, exiting");
            return Ok(());
        }
    };

    let app = ConsoleApp::new(form.into_lines());
    let running = launcher::launch(
        Box::new(app),
        &record,
        store,
        config.app.update_buffer,
        shutdown,
    )?;

    let saved = running.wait().await?;
    info!(saved, "application exited");
    Ok(())
}
