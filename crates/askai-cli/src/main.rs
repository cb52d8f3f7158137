//! Terminal chat against the Ask AI endpoint.
//!
//! Plain lines are sent as queries. `/retry` resends the last query,
//! `/reset` clears the chat, `/quit` exits.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use askai_stream::config::{API_KEY_VAR, ENDPOINT_VAR};
use askai_stream::observability::{LogSettings, init_observability};
use askai_stream::prelude::*;
use clap::Parser;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "askai", about = "Chat with the Ask AI endpoint from the terminal")]
struct Args {
    /// Chat endpoint URL (falls back to ASKAI_ENDPOINT).
    #[arg(long)]
    endpoint: Option<String>,
    /// Value for the `api-key` header (falls back to ASKAI_API_KEY).
    #[arg(long)]
    api_key: Option<String>,
    /// Reuse an existing session id instead of generating one.
    #[arg(long)]
    session: Option<String>,
    /// Pause after each partial update, in milliseconds.
    #[arg(long)]
    throttle_ms: Option<u64>,
    /// Request timeout, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Send one query, print the answer and exit.
    #[arg(long, short)]
    query: Option<String>,
    /// Log filter directives, e.g. `askai_stream=debug` (falls back to ASKAI_LOG_LEVEL).
    #[arg(long)]
    log_level: Option<String>,
    /// Write JSON log lines to this file instead of stderr.
    #[arg(long)]
    json_log: Option<PathBuf>,
}

enum Command {
    Send(String),
    Retry,
    Reset,
    Quit,
    Skip,
}

fn parse_command(line: &str) -> Command {
    match line.trim() {
        "" => Command::Skip,
        "/retry" => Command::Retry,
        "/reset" => Command::Reset,
        "/quit" | "/exit" => Command::Quit,
        text => Command::Send(text.to_string()),
    }
}

fn build_config(args: &Args) -> Result<ChatClientConfig, ChatError> {
    let mut config = ChatClientConfig::from_lookup(|key| {
        let from_args = match key {
            ENDPOINT_VAR => args.endpoint.clone(),
            API_KEY_VAR => args.api_key.clone(),
            _ => None,
        };
        from_args.or_else(|| std::env::var(key).ok())
    })?;
    if let Some(ms) = args.throttle_ms {
        config = config.update_throttle(Duration::from_millis(ms));
    }
    if let Some(secs) = args.timeout_secs {
        config = config.timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

fn log_settings(args: &Args) -> LogSettings {
    let mut settings = LogSettings::from_env();
    if let Some(level) = args.log_level.as_deref() {
        settings = settings.filter(level);
    }
    if let Some(path) = args.json_log.as_deref() {
        settings = settings.json_path(path);
    }
    settings
}

fn build_surface(args: &Args) -> Result<ChatSurface, ChatError> {
    let config = build_config(args)?;
    let throttle = config.update_throttle;
    let transport = askai_stream::HttpChatTransport::new(config)?;
    let session = match args.session.as_deref() {
        Some(raw) => raw.parse::<Session>()?,
        None => Session::generate(),
    };
    Ok(
        ChatSurface::with_session(std::sync::Arc::new(transport), session)
            .with_assembler(askai_stream::StreamingResponseAssembler::new(throttle)),
    )
}

/// Terminal rendering of surface events: assistant text as it streams in,
/// then the source list.
#[derive(Default)]
struct Renderer {
    /// Text of the assistant reply printed on the current line.
    printed: String,
}

impl Renderer {
    fn render(&mut self, event: SurfaceEvent, out: &mut impl Write) -> std::io::Result<()> {
        match event {
            SurfaceEvent::MessageAdded { message } if message.role == Role::Assistant => {
                if !self.printed.is_empty() {
                    writeln!(out)?;
                }
                self.printed.clear();
                if message.text.is_empty() {
                    write!(out, "bot> ")?;
                } else {
                    writeln!(out, "bot> {}", message.text)?;
                }
            }
            SurfaceEvent::PartialText { text, .. } => {
                match text.strip_prefix(self.printed.as_str()) {
                    Some(rest) => write!(out, "{rest}")?,
                    None => write!(out, "\n{text}")?,
                }
                self.printed = text;
            }
            SurfaceEvent::Completed { text, sources, .. } => {
                match text.strip_prefix(self.printed.as_str()) {
                    Some(rest) => writeln!(out, "{rest}")?,
                    None => writeln!(out, "\n{text}")?,
                }
                self.printed.clear();
                if !sources.is_empty() {
                    writeln!(out, "Sources:")?;
                    for (_, links) in sources.iter() {
                        for link in links {
                            writeln!(out, "  - {link}")?;
                        }
                    }
                }
            }
            SurfaceEvent::Degraded { .. } => {
                self.printed.clear();
                writeln!(out)?;
            }
            SurfaceEvent::Cancelled { .. } => {
                self.printed.clear();
                writeln!(out, " [cancelled]")?;
            }
            SurfaceEvent::Reset => writeln!(out, "(chat cleared)")?,
            SurfaceEvent::MessageAdded { .. } | SurfaceEvent::Failed { .. } => {}
        }
        out.flush()
    }
}

async fn render_events(mut rx: mpsc::UnboundedReceiver<SurfaceEvent>) {
    let mut renderer = Renderer::default();
    let mut out = std::io::stdout();
    while let Some(event) = rx.recv().await {
        if renderer.render(event, &mut out).is_err() {
            break;
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_observability(&log_settings(&args));

    let mut chat = build_surface(&args)?;
    let renderer = tokio::spawn(render_events(chat.subscribe()));
    tracing::info!(session_id = %chat.session(), "chat opened");

    if let Some(query) = args.query.as_deref() {
        chat.send(query).await?.into_result()?;
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let result = match parse_command(&line) {
                Command::Send(text) => chat.send(text).await.map(drop),
                Command::Retry => chat.refresh().await.map(drop),
                Command::Reset => {
                    chat.reset();
                    Ok(())
                }
                Command::Quit => break,
                Command::Skip => Ok(()),
            };
            if let Err(err) = result {
                eprintln!("{err}");
            }
        }
    }

    drop(chat);
    let _ = renderer.await;
    Ok(())
}
