//! Line-oriented chat loop on stdin/stdout. Logs go to stderr.

use std::io::{self, Write};

use ragchat_core::{ChatClient, ChatEvent, Finish};
use ragchat_session::{MessageStatus, Role, Session};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{self, Command, Input};

const SHORT_ID_CHARS: usize = 8;

pub async fn run(client: &ChatClient) -> Result<(), Box<dyn std::error::Error>> {
    let session_id = client.init().await?;
    println!(
        "Connected, session {}. Type /help for commands.",
        short_id(&session_id)
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(client)?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match commands::parse(&line) {
            Input::Empty => {}
            Input::Question(question) => ask(client, &question).await?,
            Input::Command(Command::Quit) => break,
            Input::Command(command) => {
                if let Err(err) = run_command(client, command).await {
                    eprintln!("error: {err}");
                }
            }
            Input::Unknown(text) => eprintln!("unknown command: {text} (try /help)"),
        }
    }

    println!();
    Ok(())
}

fn prompt(client: &ChatClient) -> io::Result<()> {
    let label = client
        .active_id()
        .map(|id| short_id(&id))
        .unwrap_or_else(|| "-".to_string());
    let mut stdout = io::stdout();
    write!(stdout, "[{label}] > ")?;
    stdout.flush()
}

/// Stream one answer to stdout. Ctrl-C cancels it.
async fn ask(client: &ChatClient, question: &str) -> io::Result<()> {
    let mut turn = match client.send(question) {
        Ok(turn) => turn,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(());
        }
    };

    let mut stdout = io::stdout();
    let mut streamed = false;
    loop {
        let event = tokio::select! {
            event = turn.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                turn.cancel();
                continue;
            }
        };
        let Some(event) = event else {
            break;
        };

        match event {
            ChatEvent::TurnStarted { .. } | ChatEvent::StreamError { .. } => {}
            ChatEvent::TextDelta { delta, .. } => {
                streamed = true;
                write!(stdout, "{delta}")?;
                stdout.flush()?;
            }
            ChatEvent::TurnComplete { outcome, .. } => match outcome.finish {
                Finish::Done => {}
                Finish::Truncated => write!(stdout, " [truncated]")?,
                Finish::Cancelled if streamed => write!(stdout, " [cancelled]")?,
                Finish::Cancelled => write!(stdout, "{}", last_answer(client, turn.session_id()))?,
            },
            ChatEvent::TurnFailed { error, .. } => {
                if !streamed {
                    write!(stdout, "{}", last_answer(client, turn.session_id()))?;
                }
                eprintln!();
                eprintln!("({error})");
            }
        }
    }
    writeln!(stdout)?;

    // Failures were already reported through `TurnFailed`.
    let _ = turn.wait().await;
    Ok(())
}

fn last_answer(client: &ChatClient, session_id: &str) -> String {
    client
        .store()
        .lock()
        .get(session_id)
        .and_then(Session::last_message)
        .map(|message| message.content.clone())
        .unwrap_or_default()
}

async fn run_command(client: &ChatClient, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::NewSession => {
            let id = client.new_session().await?;
            println!("Started session {}.", short_id(&id));
        }
        Command::ListSessions => print_sessions(client),
        Command::Switch(target) => {
            let id = resolve(client, &target)?;
            client.select(&id)?;
            if let Some(session) = client.store().lock().get(&id) {
                print_transcript(session);
            }
        }
        Command::Delete(target) => {
            let id = match target {
                Some(target) => resolve(client, &target)?,
                None => client.active_id().ok_or("no active session")?,
            };
            client.delete(&id).await?;
            let active = client.active_id().unwrap_or_default();
            println!(
                "Deleted session {}. Now in {}.",
                short_id(&id),
                short_id(&active)
            );
        }
        Command::Help => {
            for (usage, description) in Command::HELP {
                println!("  {usage:<16} {description}");
            }
            println!("  {:<16} {}", "Ctrl-C", "Cancel the answer in progress");
        }
        Command::Quit => {}
    }
    Ok(())
}

fn resolve(client: &ChatClient, target: &str) -> Result<String, String> {
    commands::resolve_session(&client.store().lock(), target)
        .ok_or_else(|| format!("no session matches '{target}'"))
}

fn print_sessions(client: &ChatClient) {
    let store = client.store().lock();
    let active = store.active_id();
    for (index, session) in store.list().enumerate() {
        let marker = if Some(session.id.as_str()) == active {
            '*'
        } else {
            ' '
        };
        let busy = if client.coordinator().is_busy(&session.id) {
            " [answering]"
        } else {
            ""
        };
        println!(
            "{marker} {:>2}. {} ({}, {} messages){busy}",
            index + 1,
            session.title,
            short_id(&session.id),
            session.messages.len()
        );
    }
}

fn print_transcript(session: &Session) {
    println!("-- {} --", session.title);
    for message in &session.messages {
        let speaker = match message.role {
            Role::Human => "you",
            Role::Ai => "ai",
        };
        let suffix = match message.status {
            MessageStatus::Complete => "",
            MessageStatus::Streaming => " …",
            MessageStatus::Failed => " [failed]",
        };
        println!("{speaker}: {}{suffix}", message.content);
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_CHARS).collect()
}
