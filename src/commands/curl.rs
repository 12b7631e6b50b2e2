//! `curl` subcommand: a single fetch, status + body to stdout.

use std::io::Write as _;
use std::sync::Arc;

use crate::cli::CurlArgs;
use crate::client::{FastClient, SOCKET_ERROR};
use crate::uuidgen::SharedUuidSource;

pub fn execute(args: CurlArgs) -> i32 {
    let http_opts = match args.http.into_options(args.url) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_code();
        }
    };

    let uuid_source = SharedUuidSource::new();
    let mut client = match FastClient::new(Arc::new(http_opts), uuid_source, rand::random()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: invalid url: {e}");
            return 1;
        }
    };

    let outcome = client.fetch();
    if outcome.status_code == SOCKET_ERROR {
        eprintln!("connection failed");
        return 1;
    }

    println!("HTTP {}", outcome.status_code);
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(client.body(&outcome));
    let _ = stdout.write_all(b"\n");
    0
}
