mod commands;
mod proxy;
mod repl;

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ragchat_backend::{BackendConfig, ChatBackend, HttpBackend};
use ragchat_core::{ChatClient, ChatEvent, CoordinatorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragchat", version, about = "Chat with a RAG backend.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Backend base URL. Falls back to `API_URL`, then http://localhost:8000.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Seconds allowed for connecting to the backend.
    #[arg(long, global = true, default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Give up on an answer after this many seconds without data. 0 waits
    /// forever.
    #[arg(
        long,
        global = true,
        env = "RAGCHAT_STREAM_IDLE_TIMEOUT_SECS",
        default_value_t = 120
    )]
    stream_idle_timeout_secs: u64,

    /// Log JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat (default).
    Chat,
    /// Ask a single question in a throwaway session and print the answer.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Serve the chat API, proxied to the backend.
    Serve {
        #[arg(long, env = "RAGCHAT_LISTEN", default_value = "127.0.0.1:3000")]
        listen: SocketAddr,
    },
}

impl Cli {
    fn backend_config(&self) -> BackendConfig {
        let mut config = BackendConfig::from_env();
        if let Some(url) = &self.api_url {
            config.base_url = url.clone();
        }
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        config
    }

    fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            stream_idle_timeout: match self.stream_idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let mut cli = Cli::parse();
    init_logging(cli.json_logs);

    let backend = HttpBackend::new(cli.backend_config())?;
    tracing::debug!(api_url = %backend.base_url(), "backend configured");

    match cli.command.take().unwrap_or(Command::Chat) {
        Command::Chat => {
            let client = ChatClient::new(Arc::new(backend), cli.coordinator_config());
            repl::run(&client).await
        }
        Command::Ask { question } => {
            let client = ChatClient::new(Arc::new(backend.clone()), cli.coordinator_config());
            ask(&client, &backend, &question.join(" ")).await
        }
        Command::Serve { listen } => proxy::serve(backend, listen).await,
    }
}

/// One question in a throwaway session. The backend session is deleted
/// afterwards, whether or not the question was answered.
async fn ask(
    client: &ChatClient,
    backend: &dyn ChatBackend,
    question: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session_id = client.init().await?;
    let result = print_answer(client, question).await;
    if let Err(err) = backend.delete_session(&session_id).await {
        tracing::warn!(session_id, %err, "backend session delete failed");
    }
    result
}

async fn print_answer(client: &ChatClient, question: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut turn = client.send(question)?;

    let mut stdout = io::stdout();
    while let Some(event) = turn.next_event().await {
        if let ChatEvent::TextDelta { delta, .. } = event {
            write!(stdout, "{delta}")?;
            stdout.flush()?;
        }
    }
    writeln!(stdout)?;

    turn.wait().await?;
    Ok(())
}
