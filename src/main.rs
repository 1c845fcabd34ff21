/*!
Here we go!

Usage: `registrar [ CONFIG_FILE ]`; the configuration file defaults to
`config.toml` in the working directory.
*/
use std::sync::Arc;

use simplelog::{ColorChoice, TerminalMode, TermLogger};

use registrar::{config, inter};

static DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("registrar")
        .build();
    if let Err(e) = TermLogger::init(
        registrar::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
    }
    log::info!("Logging started.");

    let config_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    log::info!("Reading configuration from {:?}.", &config_path);

    let glob = match config::load_configuration(&config_path).await {
        Ok(glob) => Arc::new(glob),
        Err(e) => {
            log::error!("Error loading configuration: {}", &e);
            std::process::exit(1);
        },
    };
    let addr = glob.addr;

    let app = inter::router(glob);

    log::info!("Listening on {}", &addr);

    if let Err(e) = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
    {
        log::error!("Server error: {}", &e);
        std::process::exit(2);
    }
}
