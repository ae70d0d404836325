// Entrypoint for the upload helper.
// - Keeps `main` small: set up logging, read the settings and hand them to
//   the guided flow in `ui`.
// - Log verbosity follows `RUST_LOG` and defaults to warnings only, so the
//   prompts are not drowned in log lines.

use gdrive_upload_helper::{config::Settings, ui};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env()?;
    tracing::debug!(
        upload_root = %settings.upload_root.display(),
        folder_id = ?settings.folder_id,
        project_id = ?settings.project_id,
        "resolved settings"
    );

    // Blocks until the upload finishes or the user gives up.
    ui::run(settings)?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
