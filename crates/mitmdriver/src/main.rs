use anyhow::Result;
use mitmdriver::{Proxy, TlsMaterial};

fn main() -> Result<()> {
    smol::block_on(run())
}

async fn run() -> Result<()> {
    let shutdown = mitmdriver::init::shutdown::init()?;
    let args = mitmdriver::init::cmd::init()?;

    let bind_addr = *args.bind.expect("should have a valid bind address");
    let mut builder = Proxy::builder().bind(bind_addr);

    if args.intercept.unwrap_or(false) {
        let cert_path = args.tls_cert.unwrap_or_else(|| "./certs/mitmdriver.pem".into());
        let key_path = args.tls_key.unwrap_or_else(|| "./certs/mitmdriver-key.pem".into());
        let tls = TlsMaterial::from_pem_files(cert_path.as_ref(), key_path.as_ref())?;
        builder = builder.tls(tls);
    }

    let proxy = builder.build();
    proxy.start().await?;

    shutdown.wait_shutting_down().await;
    proxy.stop().await?;
    log::info!("Shutdown complete.");
    Ok(())
}
