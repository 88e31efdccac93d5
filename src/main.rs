use tutorstream::bootstrap::{LocalCacheSource, RestSessionSource, SessionBootstrap};
use tutorstream::conversation::ConversationEvent;
use tutorstream::*;

use clap::Parser;
use colored::*;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::LinesStream;

fn build_bootstrap(state: &AppState) -> SessionBootstrap {
    let mut bootstrap = SessionBootstrap::new();
    if let Some(dir) = &state.args.cache_dir {
        bootstrap = bootstrap.with_source(LocalCacheSource::new(dir));
    }
    if let Some(base) = &state.args.session_api {
        bootstrap = bootstrap.with_source(RestSessionSource::new(state.client.clone(), base));
    }
    bootstrap
}

fn label(message: &ChatMessage) -> ColoredString {
    match (message.role, message.kind) {
        (Role::Student, _) => "you".bold().blue(),
        (Role::Teacher, Some(MessageKind::Error)) => "tutor".bold().red(),
        (Role::Teacher, Some(MessageKind::Hint)) => "hint".bold().yellow(),
        (Role::Teacher, Some(MessageKind::Success)) => "tutor".bold().green(),
        (Role::Teacher, _) => "tutor".bold().cyan(),
    }
}

/// Prints teacher messages as they grow. Content only ever grows, so each
/// update is printed as the suffix not yet shown.
async fn render_events(mut rx: broadcast::Receiver<ConversationEvent>) {
    let mut printed: HashMap<MessageId, usize> = HashMap::new();
    let mut stdout = std::io::stdout();

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Renderer lagged, skipped {} events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            ConversationEvent::MessageAdded(message) if message.role == Role::Teacher => {
                let _ = write!(stdout, "\n{} {}", label(&message), message.content);
                printed.insert(message.id, message.content.len());
            }
            ConversationEvent::MessageAdded(_) => {}
            ConversationEvent::MessageUpdated { id, content } => {
                let shown = printed.entry(id).or_insert(0);
                if let Some(delta) = content.get(*shown..) {
                    let _ = write!(stdout, "{}", delta);
                }
                *shown = content.len();
            }
            ConversationEvent::MessageReplaced { message, .. } => {
                let _ = write!(stdout, "\n{} {}", label(&message), message.content.red());
                printed.insert(message.id, message.content.len());
            }
            ConversationEvent::Typing(true) => {
                let _ = write!(stdout, "\n{}", "tutor is typing…".dimmed());
            }
            ConversationEvent::Typing(false) => {
                let _ = writeln!(stdout);
            }
            ConversationEvent::Toast(text) => {
                eprintln!("{} {}", "!".bold().red(), text);
            }
        }
        let _ = stdout.flush();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _guard = match tutorstream::logging::init_tracing(&args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging in {:?}: {}", args.log_dir, e);
            std::process::exit(1);
        }
    };
    tutorstream::logging::setup_panic_hook();

    let state = match AppState::from_args(args) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{}", e.inner);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Starting tutorstream against {} (session {})",
        state.endpoint,
        state.session_id
    );

    let controller = Arc::new(StreamController::from_state(&state));
    let renderer = tokio::spawn(render_events(state.conversation.subscribe()));

    println!(
        "{} session {} · /stop to interrupt · /quit to leave",
        "tutorstream".bold(),
        state.session_id.short()
    );

    if state.args.kickoff {
        let bootstrap = build_bootstrap(&state);
        match bootstrap.problem_statement(&state.session_id).await {
            Ok(problem) => {
                let controller = controller.clone();
                tokio::spawn(async move {
                    controller.kickoff(&problem).await;
                });
            }
            Err(e) => {
                tracing::error!("Kickoff aborted: {}", e);
                eprintln!("{} {}", "Could not open this session:".bold().red(), e.inner);
                std::process::exit(1);
            }
        }
    }

    let mut lines = LinesStream::new(tokio::io::BufReader::new(tokio::io::stdin()).lines());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if controller.is_streaming() {
                    controller.stop();
                } else {
                    break;
                }
            }
            line = lines.next() => match line {
                Some(Ok(line)) => match line.trim() {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/stop" => controller.stop(),
                    text => {
                        let controller = controller.clone();
                        let text = text.to_string();
                        tokio::spawn(async move {
                            controller.send(&text).await;
                        });
                    }
                },
                Some(Err(e)) => {
                    tracing::error!("Failed to read input: {}", e);
                    break;
                }
                None => break,
            }
        }
    }

    controller.stop();
    renderer.abort();
}
