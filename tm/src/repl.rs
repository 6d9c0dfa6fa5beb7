//! Interactive chat REPL
//!
//! Free text goes through the interpreter; slash commands map straight onto
//! orchestrator commands.

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::chat::{ChatOrchestrator, ChatResponse};
use crate::domain::Plan;
use crate::interpret::Command;

/// Interactive chat session bound to one session id
pub struct ReplSession {
    chat: ChatOrchestrator,
    session_id: String,
    plan: Option<Plan>,
}

/// What the loop does after a slash command
enum SlashResult {
    Continue,
    Quit,
}

impl ReplSession {
    /// `plan` seeds the session when the loop starts
    pub fn new(chat: ChatOrchestrator, session_id: impl Into<String>, plan: Option<Plan>) -> Self {
        Self {
            chat,
            session_id: session_id.into(),
            plan,
        }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        if let Some(plan) = self.plan.take() {
            match self.chat.open_session(&self.session_id, plan).await {
                Ok(()) => println!("{}", "Plan loaded.".dimmed()),
                Err(e) => println!("{}", crate::chat::render::error(&e).red()),
            }
            println!();
        }

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        match self.handle_slash_command(input).await {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        }
                    } else {
                        let response = self.chat.chat(&self.session_id, input, None).await;
                        print_response(&response);
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("안녕히 가세요!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "tripmate".bright_cyan().bold());
        println!("Session: {}", self.session_id);
        if self.plan.is_none() {
            println!("{}", "No plan loaded; start with `tm chat --plan <file>`.".dimmed());
        }
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    async fn handle_slash_command(&mut self, input: &str) -> SlashResult {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");
        debug!(%cmd, "handle_slash_command: called");

        let command = match cmd {
            "/help" | "/h" => {
                print_help();
                return SlashResult::Continue;
            }
            "/quit" | "/q" | "/exit" => return SlashResult::Quit,
            "/pick" => {
                self.pick(&parts[1..]).await;
                return SlashResult::Continue;
            }
            "/plan" | "/p" => Command::ShowPlan,
            "/history" => Command::ShowHistory,
            "/alternatives" | "/alt" => Command::CheckAlternatives,
            "/undo" => Command::Rollback,
            "/reset" => Command::Reset,
            _ => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
                return SlashResult::Continue;
            }
        };

        let response = self.chat.execute(&self.session_id, command).await;
        print_response(&response);
        SlashResult::Continue
    }

    /// `/pick <group> <alternative>`, both 1-based as displayed
    async fn pick(&mut self, args: &[&str]) {
        let parsed: Vec<usize> = args.iter().filter_map(|a| a.parse().ok()).collect();
        let (group, alt) = match parsed.as_slice() {
            [alt] => (1, *alt),
            [group, alt] => (*group, *alt),
            _ => {
                println!("{} Usage: /pick [group] <alternative>", "?".yellow());
                return;
            }
        };
        if group == 0 || alt == 0 {
            println!("{} Numbers start at 1", "?".yellow());
            return;
        }

        match self.chat.apply_choice(&self.session_id, group - 1, alt - 1).await {
            Ok(plan) => {
                println!("{}", crate::chat::render::plan(&plan));
                println!();
            }
            Err(e) => {
                println!("{}", crate::chat::render::error(&e).red());
                println!();
            }
        }
    }
}

fn print_response(response: &ChatResponse) {
    if response.success {
        println!("{}", response.response);
    } else {
        println!("{}", response.response.red());
    }
    println!();
}

fn print_help() {
    println!();
    println!("{}", "Available Commands:".bright_cyan());
    println!("  {:22} Show this help", "/help".yellow());
    println!("  {:22} Exit the REPL", "/quit".yellow());
    println!("  {:22} Show the current plan", "/plan".yellow());
    println!("  {:22} Show applied changes", "/history".yellow());
    println!("  {:22} Find rain alternatives", "/alternatives".yellow());
    println!("  {:22} Apply an alternative", "/pick [group] <n>".yellow());
    println!("  {:22} Undo the last change", "/undo".yellow());
    println!("  {:22} Restore the original plan", "/reset".yellow());
    println!();
    println!("Anything else is sent as a chat message.");
    println!();
}
