//! Console implementations of [`HumanInterface`].

use async_trait::async_trait;
use std::io::{self, Write};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use covenant_runtime::{HumanInterface, InteractionError, ScriptedHuman};

/// Interactive console: messages to stdout, answers from stdin.
pub struct ConsoleHuman {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleHuman {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for ConsoleHuman {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HumanInterface for ConsoleHuman {
    async fn say(&self, message: &str) {
        println!("{}", message);
    }

    async fn ask(&self, prompt: &str) -> Result<String, InteractionError> {
        print!("{}: ", prompt);
        io::stdout()
            .flush()
            .map_err(|e| InteractionError::Io(e.to_string()))?;

        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(InteractionError::InputClosed),
            Err(e) => Err(InteractionError::Io(e.to_string())),
        }
    }
}

/// Unattended console: answers come from a file, one per line, and the
/// conversation is echoed to stdout.
pub struct AnswerFileHuman {
    answers: ScriptedHuman,
}

impl AnswerFileHuman {
    pub fn load(path: &Path) -> io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self {
            answers: ScriptedHuman::new(parse_answers(&raw)),
        })
    }
}

/// Every line is an answer, blank lines included.
fn parse_answers(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

#[async_trait]
impl HumanInterface for AnswerFileHuman {
    async fn say(&self, message: &str) {
        println!("{}", message);
    }

    async fn ask(&self, prompt: &str) -> Result<String, InteractionError> {
        let answer = self.answers.ask(prompt).await?;
        println!("{}: {}", prompt, answer);
        Ok(answer)
    }
}

/// Block until the user presses Enter.
pub fn wait_for_enter() {
    print!("Press Enter to exit...");
    let _ = io::stdout().flush();
    let mut buffer = String::new();
    let _ = io::stdin().read_line(&mut buffer);
}
