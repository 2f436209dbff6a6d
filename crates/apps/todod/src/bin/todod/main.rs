use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use todo_daemon::config::DaemonConfig;
use todo_rpc::RpcServer;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "todod", about = "Serve an in-memory todo table over TCP")]
struct Args {
    /// Address to listen on; overrides the config file.
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Start with an empty table.
    #[arg(long)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DaemonConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    let addr = config.listen_addr()?;

    let store = Arc::new(config.build_store(!args.no_seed)?);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    log::info!("todod listening on {} with {} todo(s)", listener.local_addr()?, store.len());

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::warn!("ctrl-c handler failed: {err}");
            std::future::pending::<()>().await;
        }
    };
    RpcServer::new(store).serve_with_shutdown(listener, shutdown).await?;
    Ok(())
}
