use log::{ error, warn };
use std::future::Future;
use std::io::Write;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, BufReader, Lines };

use crate::error::Result;
use crate::history::ConversationStore;
use crate::models::chat::{ ChatMessage, Role };
use crate::session::ChatSession;
use crate::thinking::{ split_thinking, strip_thinking, Segment };

const HELP: &str = "\
Commands:
  /new              start a new conversation
  /list             list conversations
  /switch <n|id>    switch to a conversation
  /delete [n|id]    delete a conversation (default: current)
  /clear            delete every conversation
  /model [name]     show or select the model
  /models           refresh and list models
  /verbose          toggle generation statistics
  /search           toggle web search
  /thinking         show or hide reasoning blocks
  /help             show this help
  /quit             exit
Anything else is sent to the model. Ctrl-C cancels a reply in progress,
or exits at the prompt.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Prompt(String),
    New,
    List,
    Switch(String),
    Delete(Option<String>),
    Clear,
    Model(Option<String>),
    Models,
    Verbose,
    Search,
    Thinking,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ReplCommand::Prompt(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };
    match (name, arg) {
        ("new", _) => ReplCommand::New,
        ("list", _) => ReplCommand::List,
        ("switch", Some(target)) => ReplCommand::Switch(target),
        ("delete", target) => ReplCommand::Delete(target),
        ("clear", _) => ReplCommand::Clear,
        ("model", model) => ReplCommand::Model(model),
        ("models", _) => ReplCommand::Models,
        ("verbose", _) => ReplCommand::Verbose,
        ("search", _) => ReplCommand::Search,
        ("thinking", _) => ReplCommand::Thinking,
        ("help", _) => ReplCommand::Help,
        ("quit" | "exit", _) => ReplCommand::Quit,
        _ => ReplCommand::Unknown(line.to_string()),
    }
}

/// A 1-based position from `/list` or a conversation id.
pub fn resolve_conversation(store: &ConversationStore, target: &str) -> Option<String> {
    if let Ok(index) = target.parse::<usize>() {
        if index >= 1 {
            if let Some(c) = store.conversations().get(index - 1) {
                return Some(c.id.clone());
            }
        }
    }
    store.get(target).map(|c| c.id.clone())
}

/// Formats a stored message for the terminal, setting reasoning blocks apart
/// from the answer, or leaving them out when `show_thinking` is off.
pub fn render_message(message: &ChatMessage, show_thinking: bool) -> String {
    let mut out = String::new();
    match message.role {
        Role::User => out.push_str(&format!("> {}\n", message.content)),
        Role::Assistant if !show_thinking => {
            out.push_str(&strip_thinking(&message.content));
            out.push('\n');
        }
        Role::Assistant => {
            for segment in split_thinking(&message.content) {
                match segment {
                    Segment::Regular(text) => {
                        out.push_str(text.trim());
                        out.push('\n');
                    }
                    Segment::Thinking(text) => {
                        out.push_str("  [thinking]\n");
                        for line in text.lines() {
                            out.push_str(&format!("  | {}\n", line));
                        }
                    }
                }
            }
        }
    }
    if let Some(sources) = &message.sources {
        out.push_str("Sources:\n");
        for (i, source) in sources.iter().enumerate() {
            out.push_str(&format!("  [{}] {} - {}\n", i + 1, source.title, source.url));
        }
    }
    if let Some(stats) = &message.verbose_stats {
        out.push_str(stats);
        out.push('\n');
    }
    out
}

fn print_conversations(store: &ConversationStore) {
    if store.is_empty() {
        println!("No conversations yet.");
        return;
    }
    for (i, c) in store.conversations().iter().enumerate() {
        let marker = if store.current_id() == Some(c.id.as_str()) { "*" } else { " " };
        println!("{}{:>3}. {} ({} messages, {})", marker, i + 1, c.title, c.messages.len(), c.updated_at.format("%Y-%m-%d %H:%M"));
    }
}

fn print_models(session: &ChatSession) {
    if session.models().is_empty() {
        println!("No models available. Pull one with `ollama-desk pull <model>`.");
        return;
    }
    for model in session.models() {
        let marker = if session.selected_model() == Some(model.as_str()) { "*" } else { " " };
        println!("{} {}", marker, model);
    }
}

/// Streams one reply to stdout. Ctrl-C drops the generation; whatever had
/// arrived stays in the conversation. With reasoning hidden nothing is
/// streamed and the stripped reply is printed once it completes.
async fn send_prompt(session: &mut ChatSession, prompt: &str, show_thinking: bool) -> Result<()> {
    let outcome = {
        let submit = session.submit(prompt, Vec::new(), |fragment| {
            if show_thinking {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            }
        });
        tokio::select! {
            res = submit => Some(res),
            _ = tokio::signal::ctrl_c() => None,
        }
    };
    println!();
    match outcome {
        Some(Ok(reply)) => {
            if !show_thinking {
                println!("{}", strip_thinking(&reply.content));
            } else if reply.content.starts_with("Error: ") {
                println!("{}", reply.content);
            }
            if let Some(sources) = &reply.sources {
                for (i, source) in sources.iter().enumerate() {
                    println!("  [{}] {} - {}", i + 1, source.title, source.url);
                }
            }
            if let Some(stats) = &reply.verbose_stats {
                println!("{}", stats);
            }
        }
        Some(Err(e)) => println!("{}", e),
        None => {
            println!("[cancelled]");
            session.store().persist().await?;
        }
    }
    Ok(())
}

/// Next line of input, or `None` at end of input or once `interrupt` fires.
async fn next_input<R, I>(lines: &mut Lines<R>, interrupt: I) -> Result<Option<String>>
    where R: AsyncBufRead + Unpin, I: Future<Output = ()>
{
    tokio::select! {
        line = lines.next_line() => Ok(line?),
        _ = interrupt => Ok(None),
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

pub async fn run_repl(session: &mut ChatSession) -> Result<()> {
    println!("ollama-desk chat. Type /help for commands.");
    if !session.is_running() {
        println!("Ollama is not running at {}. Start it with `ollama-desk start`.", session.client().base_url());
    } else if let Some(model) = session.selected_model() {
        println!("Model: {}", model);
    }
    if let Some(current) = session.store().current() {
        println!("Continuing \"{}\"", current.title);
    }

    let mut show_thinking = true;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = next_input(&mut lines, ctrl_c()).await? else {
            println!();
            break;
        };
        match parse_command(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Prompt(prompt) => {
                if let Err(e) = send_prompt(session, &prompt, show_thinking).await {
                    error!("Failed to save conversation: {}", e);
                }
            }
            ReplCommand::New => {
                session.store_mut().create().await?;
                println!("Started a new conversation.");
            }
            ReplCommand::List => print_conversations(session.store()),
            ReplCommand::Switch(target) => {
                match resolve_conversation(session.store(), &target) {
                    Some(id) => {
                        session.store_mut().select(&id).await?;
                        if let Some(conversation) = session.store().current() {
                            println!("Switched to \"{}\"", conversation.title);
                            for message in &conversation.messages {
                                print!("{}", render_message(message, show_thinking));
                            }
                        }
                    }
                    None => println!("No conversation matches '{}'.", target),
                }
            }
            ReplCommand::Delete(target) => {
                let id = match target {
                    Some(t) => resolve_conversation(session.store(), &t),
                    None => session.store().current_id().map(str::to_string),
                };
                match id {
                    Some(id) => {
                        session.store_mut().delete(&id).await?;
                        println!("Conversation deleted.");
                    }
                    None => println!("Nothing to delete."),
                }
            }
            ReplCommand::Clear => {
                session.store_mut().clear_all().await?;
                println!("All conversations cleared.");
            }
            ReplCommand::Model(None) => {
                println!("{}", session.selected_model().unwrap_or("(none)"));
            }
            ReplCommand::Model(Some(name)) => {
                match session.select_model(&name) {
                    Ok(()) => println!("Using {}", name),
                    Err(e) => println!("{}", e),
                }
            }
            ReplCommand::Models => {
                session.refresh().await;
                print_models(session);
            }
            ReplCommand::Verbose => {
                let on = !session.options().verbose;
                session.set_verbose(on);
                println!("Verbose statistics {}", if on { "on" } else { "off" });
            }
            ReplCommand::Search => {
                let on = !session.options().web_search;
                session.set_web_search(on);
                println!("Web search {}", if on { "on" } else { "off" });
            }
            ReplCommand::Thinking => {
                show_thinking = !show_thinking;
                println!("Reasoning blocks {}", if show_thinking { "shown" } else { "hidden" });
            }
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(line) => {
                warn!("Unknown command: {}", line);
                println!("Unknown command. Type /help for the list.");
            }
        }
    }
    Ok(())
}
