// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train` — trains the model on a dialogue corpus
//   2. `chat`  — loads a checkpoint and replies to messages

pub mod commands;

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};

use crate::domain::traits::Responder;
use commands::{ChatArgs, Commands, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "chat-seq2seq",
    version = "0.1.0",
    about = "Train an attention seq2seq chatbot on dialogue pairs, then chat with it."
)]
pub struct Cli {
    /// The subcommand to run (train or chat)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Chat(args)  => run_chat(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = args.into_config()?;
    tracing::info!("Starting training on corpus: {}", config.corpus);

    let summary = TrainUseCase::new(config).execute()?;
    println!(
        "Training complete at step {} (learning rate {:.6}).",
        summary.global_step, summary.learning_rate
    );
    Ok(())
}

fn run_chat(args: ChatArgs) -> Result<()> {
    use crate::application::chat_use_case::ChatUseCase;

    let use_case = ChatUseCase::new(&args.checkpoint_dir)?;

    if let Some(message) = args.message {
        println!("{}", use_case.respond(&message)?);
        return Ok(());
    }

    // Interactive loop until EOF
    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        match use_case.respond(&line) {
            Ok(reply) if !reply.is_empty() => println!("{reply}"),
            Ok(_)                          => {}
            Err(e)                         => tracing::warn!("Could not reply: {e:#}"),
        }
        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}
