//! Detached wrapper process started by `lantern run`; reads its launch
//! payload from stdin

use lantern_core::{Error, EXIT_SPAWN_FAILED};
use tracing::error;

#[tokio::main]
async fn main() {
    lantern_wrapper::init_logging();

    let code = match lantern_wrapper::run_from_stdin().await {
        Ok(code) => code,
        Err(Error::SpawnFailed(message)) => {
            error!("Spawn failed: {}", message);
            EXIT_SPAWN_FAILED
        }
        Err(e) => {
            error!("Wrapper failed: {}", e);
            1
        }
    };
    std::process::exit(code);
}
