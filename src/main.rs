#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::{sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use diagnostics_relay::config::Config;
use tokio::signal::unix::{signal, SignalKind};

/// How long a graceful shutdown waits for in-flight connections before giving up.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load()?);
    simple_logger::init_with_level(config.log.level.as_level())?;

    let (service, addr) = diagnostics_relay::build(config.clone());
    log::info!("listening on {addr}");

    let handle = Handle::new();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    // SIGINT exits the process immediately, bypassing in-flight requests; SIGTERM drains
    // them via the server handle's graceful shutdown below. Matches the original's split
    // between "Terminating eagerly" (os.Exit) and "Terminating gracefully" (srv.Shutdown).
    tokio::spawn(async move {
        sigint.recv().await;
        log::info!("terminating eagerly");
        std::process::exit(-2);
    });

    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        sigterm.recv().await;
        log::info!("terminating gracefully");
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
    });

    if config.tls.is_enabled() {
        let cert = config.tls.cert.as_ref().expect("tls.is_enabled() implies cert is set");
        let key = config.tls.key.as_ref().expect("tls.is_enabled() implies key is set");
        let tls_config = RustlsConfig::from_pem_file(cert, key).await?;

        axum_server::bind_rustls(addr, tls_config).handle(handle).serve(service).await?;
    } else {
        log::warn!("tls.key/tls.cert not set, serving plaintext; terminate TLS at a reverse proxy in production");
        axum_server::bind(addr).handle(handle).serve(service).await?;
    }

    Ok(())
}
