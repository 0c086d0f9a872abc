//! `decentra serve`: Start the HTTP server.

use super::GlobalOptions;

pub async fn run(
    port_override: Option<u16>,
    host_override: Option<String>,
    globals: &GlobalOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = globals.load_config()?;

    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(host) = host_override {
        config.server.host = host;
    }

    println!("Decentra server");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Backend:   {}", config.default_backend);
    println!("   Rate limit: {}/min", config.server.rate_limit_per_minute);

    decentra_server::start(config).await?;

    Ok(())
}
