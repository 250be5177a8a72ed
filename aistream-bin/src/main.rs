use std::io::{self, Write};
use std::path::PathBuf;

use aistream_core::{
    config::Config,
    error::ErrorKind,
    model::{AggregatedResponse, ChatMessage, ChatRequest, Role, ToolInvocation},
    provider_factory::ProviderRegistry,
    router::RoutingResolver,
    stream::{Dialect, StreamObserver, StreamSession, start},
    transport,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "aistream CLI: stream and aggregate LLM responses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a chat completion (prints deltas live)
    Stream {
        #[arg(long)]
        model: String,
        #[arg(short, long, help = "Message from the user")]
        message: String,
        #[arg(short, long, help = "System prompt")]
        system: Option<String>,
        #[arg(short, long, help = "Config file (JSON or TOML)")]
        config: Option<PathBuf>,
        #[arg(short, long, help = "Bypass routing and use this provider")]
        provider: Option<String>,
    },
    /// Aggregate a captured response body from a file
    Replay {
        #[arg(long, help = "openai_sse, anthropic_sse, gemini_sse, ollama_ndjson or cli_ndjson")]
        dialect: Dialect,
        #[arg(long)]
        file: PathBuf,
    },
}

/// Prints deltas to stdout as they arrive; everything else goes to stderr.
struct PrintObserver {
    saw_delta: bool,
}

impl StreamObserver for PrintObserver {
    fn on_delta(&mut self, text: &str) {
        self.saw_delta = true;
        print!("{text}");
        io::stdout().flush().ok();
    }

    fn on_tool_use(&mut self, call: &ToolInvocation) {
        eprintln!("[tool_use {} {}({})]", call.id, call.name, call.arguments);
    }

    fn on_end(&mut self, response: &AggregatedResponse) {
        if self.saw_delta {
            println!();
        }
        let usage = response
            .usage
            .map(|u| format!(" prompt={} completion={}", u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        eprintln!("[end: {}{usage}]", response.finish_reason.as_str());
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        if self.saw_delta {
            println!();
        }
        eprintln!("[error {}: {message}]", kind.as_str());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stream {
            model,
            message,
            system,
            config,
            provider,
        } => {
            // Without a file only the null provider is registered.
            let cfg = match config {
                Some(path) => Config::from_path(path)?,
                None => Config::default(),
            };
            let reg = ProviderRegistry::from_config(&cfg)?;
            let provider = match provider {
                Some(name) => reg
                    .get(&name)
                    .ok_or_else(|| anyhow::anyhow!("provider '{name}' not registered ({:?})", reg.names()))?,
                None => RoutingResolver::new(&cfg)?.select_stream(&reg, &model)?,
            };

            let mut req = ChatRequest::user(model, message);
            if let Some(system) = system {
                req.messages.insert(0, ChatMessage { role: Role::System, content: system });
            }

            // Armed before the request goes out so Ctrl-C also aborts the connect.
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let outcome = match provider.stream_chat(&req, cancel).await {
                Ok(session) => {
                    start(session.with_stream_cfg(reg.stream_cfg()), PrintObserver { saw_delta: false })
                        .result()
                        .await
                }
                Err(e) => Err(e),
            };
            match outcome {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => eprintln!("[cancelled]"),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Replay { dialect, file } => {
            let f = tokio::fs::File::open(&file).await?;
            let session = StreamSession::new(dialect, transport::from_reader(f)).with_provider("replay");
            let resp = session.run(&mut PrintObserver { saw_delta: false }).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
    }

    Ok(())
}
