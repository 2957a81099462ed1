//! Interactive chat loop
//!
//! Owns the transcript and drives one streaming turn at a time.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use trickle_core::{ChatClient, StreamCancellation, StreamOutcome, Transcript, TranscriptSink};

/// What a line typed at the prompt asks for
#[derive(Debug, PartialEq, Eq)]
enum Input {
    /// Nothing but whitespace
    Empty,
    Exit,
    Clear,
    /// A question to send, as typed
    Message(String),
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "" => Input::Empty,
        "/exit" | "/quit" => Input::Exit,
        "/clear" => Input::Clear,
        _ => Input::Message(line.to_string()),
    }
}

/// Sink that echoes each applied fragment to stdout
struct EchoSink<'a> {
    transcript: &'a mut Transcript,
}

impl TranscriptSink for EchoSink<'_> {
    fn open_assistant_message(&mut self) {
        self.transcript.open_assistant_message();
        print!("Bot: ");
        let _ = std::io::stdout().flush();
    }

    fn append_fragment(&mut self, fragment: &str) {
        if self.transcript.append_to_assistant(fragment) {
            print!("{}", fragment);
            let _ = std::io::stdout().flush();
        }
    }
}

pub async fn run(client: &ChatClient) -> Result<()> {
    let mut transcript = Transcript::new();
    let mut cancellation = StreamCancellation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "trickle ({}) - /clear to reset, /exit or Ctrl-C to quit, Ctrl-C during a reply stops it",
        client.config().model
    );

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        // Once a turn has listened for Ctrl-C the default SIGINT exit is gone,
        // so the prompt has to listen for it too
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let question = match parse_input(&line) {
            Input::Empty => {
                println!("Please enter a question.");
                continue;
            }
            Input::Exit => break,
            Input::Clear => {
                transcript.clear();
                println!("Conversation cleared.");
                continue;
            }
            Input::Message(question) => question,
        };

        transcript.push_user(question);
        let messages = transcript.messages().to_vec();

        cancellation.reset();
        let token = cancellation.token();
        let mut sink = EchoSink {
            transcript: &mut transcript,
        };

        let reply = client.stream_reply(&messages, &mut sink, &token);
        tokio::pin!(reply);
        let result = tokio::select! {
            result = &mut reply => result,
            _ = tokio::signal::ctrl_c() => {
                cancellation.cancel();
                reply.await
            }
        };
        println!();

        match result {
            Ok(summary) => {
                if summary.outcome == StreamOutcome::Cancelled {
                    println!("(reply stopped)");
                }
                info!(
                    "Turn finished: {:?}, {} fragments in {:?}",
                    summary.outcome, summary.stats.fragments, summary.elapsed
                );
            }
            Err(e) => {
                // Partial content already applied stays in the transcript
                eprintln!("Failed to get a reply: {}", e);
            }
        }
    }

    Ok(())
}
