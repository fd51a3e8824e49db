//! Line-oriented interface to the orchestrator.
//!
//! Plain lines are sent as the user's message; lines starting with `#` are
//! commands. Output is tagged (`[REPLY]`, `[CAST]`, `[ERROR]`, ...) so scripts
//! and agents can parse it.

use crate::CliOptions;
use decomp_core::{Orchestrator, SubmitMode, TurnOutcome};
use std::io::{self, BufRead, Write};

const HELP: &[(&str, &str)] = &[
    ("#quit", "Exit"),
    ("#say <text>", "Add <text> as the reply yourself (no generation)"),
    ("#tree", "Show the branch tree"),
    ("#switch <id>", "Switch to the branch whose id starts with <id>"),
    ("#rename <name>", "Rename the current branch"),
    ("#chars", "List characters on the current branch"),
    ("#pick <name>", "Toggle a character in the selection"),
    ("#fork [a, b]", "Fork with the named characters, or the selection"),
    ("#export <path>", "Write the forest to a JSON file"),
    ("#import <path>", "Replace the forest from a JSON file"),
    ("#reset", "Discard every branch and start over"),
    ("#help", "Show this help"),
];

fn print_commands() {
    for (command, description) in HELP {
        println!("  {command:<16} - {description}");
    }
}

/// Run the interactive loop until `#quit` or end of input.
pub async fn run_headless(
    orchestrator: Orchestrator,
    options: &CliOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let restored = orchestrator.restore().await;

    println!("=== decomp ===");
    println!("Provider: {}", options.provider.kind);
    match &options.save_path {
        Some(path) if restored => println!("Forest: {} (restored)", path.display()),
        Some(path) => println!("Forest: {}", path.display()),
        None => println!("Forest: in memory"),
    }
    print_current(&orchestrator).await;
    println!();
    println!("Commands:");
    print_commands();
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let (name, rest) = command
                .split_once(char::is_whitespace)
                .map(|(name, rest)| (name, rest.trim()))
                .unwrap_or((command, ""));
            if !run_command(&orchestrator, name, rest).await {
                println!("Goodbye!");
                break;
            }
            stdout.flush().ok();
            continue;
        }

        submit(&orchestrator, line, SubmitMode::Ai).await;
        stdout.flush().ok();
    }

    Ok(())
}

/// Execute one `#` command. Returns `false` when the session should end.
async fn run_command(orchestrator: &Orchestrator, name: &str, rest: &str) -> bool {
    match name {
        "quit" | "exit" => return false,
        "help" => {
            println!("[HELP]");
            print_commands();
            println!("  (anything else is sent as your message)");
        }
        "say" => {
            if rest.is_empty() {
                println!("[ERROR] Usage: #say <text>");
            } else {
                submit(orchestrator, rest, SubmitMode::Human).await;
            }
        }
        "tree" => {
            println!("[TREE]");
            for row in orchestrator.tree().await {
                let marker = if row.is_current { '*' } else { ' ' };
                let indent = "  ".repeat(row.depth);
                println!("{marker} {indent}{} [{}]", row.name, row.id.short());
            }
        }
        "switch" => match orchestrator.find_branch(rest).await {
            Some(id) => match orchestrator.select(&id).await {
                Ok(()) => print_current(orchestrator).await,
                Err(e) => println!("[ERROR] {e}"),
            },
            None => println!("[ERROR] No single branch id starts with '{rest}'"),
        },
        "rename" => match orchestrator.rename_current(rest).await {
            Ok(true) => print_current(orchestrator).await,
            Ok(false) => println!("[ERROR] Usage: #rename <name>"),
            Err(e) => println!("[ERROR] {e}"),
        },
        "chars" => {
            let branch = orchestrator.snapshot().await;
            let selected = orchestrator.selected_characters().await;
            println!("[CHARACTERS]");
            if branch.characters.is_empty() {
                println!("  (none yet)");
            }
            for character in &branch.characters {
                let picked = if selected.contains(&character.name) { '+' } else { ' ' };
                let status = if character.active { "active" } else { "inactive" };
                println!("{picked} {} ({status}) {}", character.name, character.description);
            }
        }
        "pick" => match orchestrator.toggle_character(rest).await {
            Some(true) => println!("[PICKED] {rest}"),
            Some(false) => println!("[UNPICKED] {rest}"),
            None => println!("[ERROR] No active character named '{rest}'"),
        },
        "fork" => {
            let result = if rest.is_empty() {
                orchestrator.fork_selected().await
            } else {
                let names: Vec<String> = rest.split(',').map(|n| n.trim().to_string()).collect();
                orchestrator.fork(&names).await
            };
            match result {
                Ok(_) => {
                    println!("[FORKED]");
                    print_current(orchestrator).await;
                }
                Err(e) => println!("[ERROR] {e}"),
            }
        }
        "export" => {
            if rest.is_empty() {
                println!("[ERROR] Usage: #export <path>");
                return true;
            }
            let written = match orchestrator.export_json().await {
                Ok(json) => tokio::fs::write(rest, json).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match written {
                Ok(()) => println!("[EXPORTED] {rest}"),
                Err(e) => println!("[ERROR] Export failed: {e}"),
            }
        }
        "import" => {
            if rest.is_empty() {
                println!("[ERROR] Usage: #import <path>");
                return true;
            }
            let imported = match tokio::fs::read_to_string(rest).await {
                Ok(json) => orchestrator.import_json(&json).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match imported {
                Ok(()) => {
                    println!("[IMPORTED] {rest}");
                    print_current(orchestrator).await;
                }
                Err(e) => println!("[ERROR] Import failed: {e}"),
            }
        }
        "reset" => {
            orchestrator.reset().await;
            println!("[RESET]");
            print_current(orchestrator).await;
        }
        _ => println!("[ERROR] Unknown command. Type #help for help."),
    }
    true
}

async fn submit(orchestrator: &Orchestrator, text: &str, mode: SubmitMode) {
    let mut stdout = io::stdout();
    print!("[PROCESSING]");
    stdout.flush().ok();

    let result = orchestrator.submit(text, mode).await;

    // Clear the processing indicator
    print!("\r            \r");
    stdout.flush().ok();

    match result {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => println!("[ERROR] {e}"),
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("[REPLY]");
    for para in outcome.reply.content.split("\n\n") {
        println!("{para}");
    }
    println!();

    let names: Vec<&str> = outcome.characters.iter().map(|c| c.name.as_str()).collect();
    println!("[CAST] {}", names.join(", "));
    for change in &outcome.changes {
        println!("[CHANGE] {change}");
    }
}

async fn print_current(orchestrator: &Orchestrator) {
    let branch = orchestrator.snapshot().await;
    println!(
        "[BRANCH] {} [{}], {} messages",
        branch.name,
        branch.id.short(),
        branch.messages.len()
    );
}
