//! Production entry point: serves the website only. The companion is expected
//! to be managed separately, and no reload split takes place.

use mimalloc::MiMalloc;
use modweb::LaunchError;
use modweb::db::Storage;
use modweb::logging::load_config_with_tracing;
use modweb::server::{ServerMode, create_app};
use modweb::supervisor::ShutdownSignal;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

async fn serve() -> Result<(), LaunchError> {
    let cfg = load_config_with_tracing()?;
    let shutdown = ShutdownSignal::install()?;
    let storage = Storage::connect(&cfg.basic.database_url).await?;
    let server = create_app(&cfg, storage, ServerMode::Production).await?;
    info!(
        host = server.host(),
        port = server.port(),
        "starting website in production mode"
    );
    server.run(shutdown.recv()).await
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let code = match serve().await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "server failed");
            e.exit_code()
        }
    };
    std::process::exit(code);
}
