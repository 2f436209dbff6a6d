use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use todo_cli::{Output, Shell};
use todo_rpc::{ClientConfig, RpcClient};
use todo_store::{CreateTodo, FaultyStore, MemoryStore, Priority, RemoteStore};
use todo_sync::{Cache, EditSession, MutationController, RealtimeMerge};
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(name = "todo-cli", about = "Optimistic todo list shell", version)]
struct Args {
    /// todod address.
    #[arg(long, default_value = "127.0.0.1:4280")]
    connect: String,

    /// Run against an in-process store instead of todod.
    #[arg(long)]
    embedded: bool,

    /// Delay every embedded store call, to watch optimistic updates land.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if args.embedded {
        let memory = MemoryStore::new();
        memory.seed([CreateTodo::new("Learn Rust", Priority::High)])?;
        let store = Arc::new(FaultyStore::new(memory));
        if args.latency_ms > 0 {
            store.set_latency(Some(Duration::from_millis(args.latency_ms)));
        }
        run(store.clone(), Some(store), args.json).await
    } else {
        let config = ClientConfig {
            request_timeout: Duration::from_secs(args.timeout_secs),
            ..ClientConfig::default()
        };
        let client = RpcClient::connect(args.connect.as_str(), config)
            .await
            .with_context(|| format!("connecting to {}", args.connect))?;
        run(Arc::new(client), None, args.json).await
    }
}

async fn run<S>(
    store: Arc<S>,
    faults: Option<Arc<FaultyStore<MemoryStore>>>,
    json: bool,
) -> anyhow::Result<()>
where
    S: RemoteStore + 'static,
{
    let cache = Arc::new(Cache::new());
    let edit = Arc::new(EditSession::new());
    let controller =
        MutationController::new(store.clone(), cache.clone()).with_edit_session(edit.clone());
    let merge = RealtimeMerge::new(cache)
        .spawn(store.as_ref())
        .await
        .context("subscribing to store events")?;

    let mut shell = Shell::new(controller, edit, Output::new(io::stdout(), json));
    if let Some(faults) = faults {
        shell = shell.with_faults(faults);
    }
    shell.execute_line("refresh").await?;
    shell.run(BufReader::new(tokio::io::stdin())).await?;

    merge.abort();
    Ok(())
}
