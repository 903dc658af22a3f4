use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tracing::{debug, info, warn};

use ward_client::api::{ApiClient, run_lookup_worker};
use ward_client::config::{FileConfig, Role};
use ward_client::console::{self, Command};
use ward_client::dispatch::{Dispatcher, LookupRequest, LookupResult};
use ward_client::render::RenderEvent;
use ward_client::store::StateStore;
use ward_client::{session, transport};

#[derive(Parser)]
#[command(name = "ward")]
#[command(about = "Realtime clinic-messaging client")]
struct Cli {
    /// Path to the config file (defaults to ./ward.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override [server].base_url
    #[arg(long)]
    base_url: Option<String>,

    /// Override [user].id
    #[arg(long)]
    user_id: Option<String>,

    /// Override [user].role
    #[arg(long, value_enum)]
    role: Option<Role>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ward=info,ward_client=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let mut config = FileConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.server.base_url = base_url;
    }
    if let Some(user_id) = cli.user_id {
        config.user.id = user_id;
    }
    if let Some(role) = cli.role {
        config.user.role = role;
    }
    anyhow::ensure!(
        !config.user.id.is_empty(),
        "no operator id: set [user].id in ward.toml, WARD_USER__ID, or --user-id"
    );

    let role = config.user.role;
    let api = ApiClient::new(&config.server.base_url, role);

    // Initial bulk load. A roster failure degrades to an empty session
    // rather than aborting: the realtime stream still runs.
    let store = match session::bootstrap(&api, role).await {
        Ok(store) => store,
        Err(e) => {
            warn!("session bootstrap failed, starting empty: {}", e);
            StateStore::new()
        }
    };
    for conversation in store.conversations() {
        println!(
            "  {} {} [{}]",
            if conversation.online { "*" } else { " " },
            conversation.name,
            conversation.id
        );
    }

    let ws_url = config.ws_url();
    let stream = transport::connect(&ws_url).await?;
    info!(url = %ws_url, "connected");
    let (ws_writer, mut ws_reader) = stream.split();

    let (outbound_tx, outbound_rx) = mpsc::channel::<String>(64);
    let (render_tx, mut render_rx) = mpsc::channel::<RenderEvent>(64);
    let (lookup_tx, lookup_rx) = mpsc::channel::<LookupRequest>(16);
    let (result_tx, mut result_rx) = mpsc::channel::<LookupResult>(16);

    tokio::spawn(transport::run_writer(ws_writer, outbound_rx));
    tokio::spawn(run_lookup_worker(api, lookup_rx, result_tx));

    let mut dispatcher = Dispatcher::new(store, role, outbound_tx, render_tx, lookup_tx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("connected as {:?} {}. /help for commands.", role, config.user.id);

    // The event loop owns the dispatcher: frames, lookup results, and
    // operator input are handled one at a time, to completion.
    loop {
        tokio::select! {
            frame = ws_reader.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => match ward_proto::decode(&text) {
                    Ok(frame) => {
                        debug!(frame = frame.payload_type().as_tag(), "frame received");
                        dispatcher.handle(frame).await;
                    }
                    Err(e) => warn!("dropping undecodable frame: {}", e),
                },
                Some(Ok(tungstenite::Message::Close(_))) | None => {
                    info!("server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("transport error: {}", e);
                    break;
                }
            },
            Some(result) = result_rx.recv() => match result {
                LookupResult::Profile { id, result } => {
                    dispatcher.profile_resolved(&id, result).await;
                }
                LookupResult::Promote { id, result } => {
                    dispatcher.promotion_confirmed(&id, result).await;
                }
            },
            Some(event) = render_rx.recv() => console::render(&event),
            line = lines.next_line() => match line {
                Ok(Some(line)) => match console::parse_line(&line) {
                    Some(Command::Select(id)) => dispatcher.select(&id).await,
                    Some(Command::Open(id)) => dispatcher.open_peer(&id).await,
                    Some(Command::Send(text)) => {
                        match dispatcher.selected().map(str::to_string) {
                            Some(target) => dispatcher.send(&text, &target).await,
                            None => println!("no conversation focused -- /select <id> first"),
                        }
                    }
                    Some(Command::Quit) => break,
                    Some(Command::Help) => console::print_help(),
                    None => {}
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin error: {}", e);
                    break;
                }
            },
        }
    }

    Ok(())
}
