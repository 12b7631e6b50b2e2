//! `server` subcommand: starts the echo/debug server.

use std::sync::Arc;

use crate::cli::ServerArgs;
use crate::echo::server::{router, EchoDefaults};

pub fn execute(args: ServerArgs) -> i32 {
    let listen = args.listen.clone();
    let params = match args.into_defaults() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_code();
        }
    };
    let defaults = match EchoDefaults::from_params(params) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: bad default response params: {e}");
            return 1;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return 1;
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::bind(&listen).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%e, addr = %listen, "failed to bind");
                return 1;
            }
        };
        tracing::info!(addr = %listen, "echo server listening");
        let app = router(Arc::new(defaults));
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(%e, "server exited with error");
            return 1;
        }
        0
    })
}
