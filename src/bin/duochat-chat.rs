//! Interactive terminal client for a running duochat server.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local server
//! duochat-chat
//!
//! # Talk to a server elsewhere, without colors
//! duochat-chat --server http://chat.example:3000 --no-color
//! ```
//!
//! # Commands
//!
//! - `/img <prompt>` - Generate an image
//! - `/help` - Show available commands
//! - `/clear` - Clear conversation history
//! - `/stats` - Show session statistics
//! - `/export <path>` - Write the conversation as an HTML page
//! - `/quit` - Exit the application

use std::fs;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use duochat::HttpBackend;
use duochat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use duochat::markdown::render_document;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("duochat-chat [OPTIONS]");
    let config = ChatConfig::from(args);

    let backend = HttpBackend::new(&config.server)?;
    let mut session = ChatSession::new(backend, &config);
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;

    println!("duochat (server: {})", config.server);
    println!("Type /img <prompt> for images, /help for commands, /quit to exit\n");

    loop {
        match rl.readline("Você: ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.trim());

                if let Some(cmd) = parse_command(&line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Até logo!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Stats => {
                            print_stats(&session);
                        }
                        ChatCommand::Export(path) => {
                            match fs::write(&path, render_document(session.conversation())) {
                                Ok(()) => {
                                    renderer.print_info(&format!("Conversation exported to {path}"))
                                }
                                Err(err) => {
                                    renderer.print_error(&format!("Failed to export: {err}"))
                                }
                            }
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                if let Err(e) = session.send(&line, &mut renderer).await {
                    renderer.print_error(&e.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nAté logo!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Messages: {}", stats.message_count);
    println!(
        "      Text replies: {} ({} failed)",
        stats.text_turns, stats.stream_failures
    );
    println!(
        "      Images: {} ({} failed)",
        stats.images_generated, stats.image_failures
    );
}
