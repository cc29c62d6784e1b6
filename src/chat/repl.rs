// Interactive terminal front end for a single chat session

use anyhow::Result;
use console::style;
use dialoguer::Input;
use indicatif::ProgressBar;
use std::time::Duration;

use super::{ConversationController, Mode, Session, TurnOutcome};

/// A line typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    /// `None` toggles between the two modes
    SwitchMode(Option<Mode>),
    ShowChunks,
    ShowHistory,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ReplCommand {
    #[inline]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Ask(line.to_string());
        };

        let mut parts = command.split_whitespace();
        match (parts.next().unwrap_or_default(), parts.next()) {
            ("mode", None) => Self::SwitchMode(None),
            ("mode", Some("recommend")) | ("recommend", None) => {
                Self::SwitchMode(Some(Mode::Recommend))
            }
            ("mode", Some("followup" | "follow-up")) | ("followup", None) => {
                Self::SwitchMode(Some(Mode::FollowUp))
            }
            ("chunks", None) => Self::ShowChunks,
            ("history", None) => Self::ShowHistory,
            ("help", None) => Self::Help,
            ("quit" | "exit", None) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

fn print_help() {
    eprintln!("{}", style("Commands").bold().yellow());
    eprintln!("  /mode [recommend|followup]  switch mode (no argument toggles)");
    eprintln!("  /chunks                     show cached chunks as JSON");
    eprintln!("  /history                    show the conversation so far");
    eprintln!("  /quit                       leave the chat");
    eprintln!("Anything else is sent as a question in the current mode.");
}

fn print_outcome(outcome: &TurnOutcome) {
    println!();
    println!("{}", outcome.answer());
    println!();

    if let TurnOutcome::Recommended {
        papers,
        cached_chunks,
        ..
    } = outcome
    {
        eprintln!(
            "{}",
            style(format!(
                "Cached {} chunks from {} papers for follow-up questions",
                cached_chunks,
                papers.len()
            ))
            .dim()
        );
    }
}

fn print_history(session: &Session) {
    if session.messages().is_empty() {
        eprintln!("{}", style("No messages yet.").dim());
        return;
    }
    for message in session.messages() {
        let label = match message.role {
            crate::llm::Role::User => style("you").bold().cyan(),
            _ => style("assistant").bold().green(),
        };
        println!("{}: {}", label, message.content);
    }
}

/// Read questions from the terminal until the user quits
#[inline]
pub async fn run_chat(controller: &ConversationController) -> Result<()> {
    let mut session = Session::new();

    eprintln!("{}", style("📚 Research Paper Chatbot").bold().cyan());
    print_help();

    loop {
        eprintln!();
        let line: String = Input::new()
            .with_prompt(format!("[{}]", session.mode()))
            .allow_empty(true)
            .interact_text()?;

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => print_help(),
            ReplCommand::Unknown(command) => {
                eprintln!("{} {}", style("Unknown command:").yellow(), command);
            }
            ReplCommand::SwitchMode(mode) => {
                let next = mode.unwrap_or_else(|| session.mode().toggled());
                session.set_mode(next);
                eprintln!("{} {}", style("Mode:").bold(), next);
            }
            ReplCommand::ShowChunks => match session.cached_chunks_json()? {
                Some(json) => println!("{}", json),
                None => eprintln!("{}", style("No cached chunks available.").dim()),
            },
            ReplCommand::ShowHistory => print_history(&session),
            ReplCommand::Ask(question) => {
                let spinner = ProgressBar::new_spinner().with_message("Thinking...");
                spinner.enable_steady_tick(Duration::from_millis(100));
                let outcome = controller.handle_turn(&mut session, &question).await;
                spinner.finish_and_clear();
                print_outcome(&outcome);
            }
        }
    }

    Ok(())
}
