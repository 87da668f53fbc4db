use mimalloc::MiMalloc;
use modweb::dispatch::Dispatcher;
use modweb::launcher::AppLauncher;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // configuration and logging are set up by the launcher once a command
    // that needs them has been parsed
    let launcher = AppLauncher::from_current_process();
    let code = Dispatcher::new(launcher, std::env::args_os().collect())
        .run()
        .await;
    std::process::exit(code);
}
