//! Human interaction: the interface every prompt goes through, plus the
//! re-prompt helpers built on it.
//!
//! Invalid answers never abort the workflow. The human sees the validation
//! message and is asked again, up to the configured [`RetryPolicy`].
//! Typing `quit` or `exit` at any prompt cancels the run.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Display;
use thiserror::Error;

use covenant_core::ValidationError;

/// Answers that cancel the workflow at any prompt.
pub const QUIT_WORDS: [&str; 2] = ["quit", "exit"];

const YES_WORDS: [&str; 5] = ["yes", "y", "da", "ok", "sure"];
const NO_WORDS: [&str; 3] = ["no", "n", "nu"];

/// Errors that end an interaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InteractionError {
    #[error("Cancelled by the user")]
    Cancelled,

    #[error("Input closed before the workflow finished")]
    InputClosed,

    #[error("No valid answer to '{prompt}' after {attempts} attempts: {last_error}")]
    AttemptsExhausted {
        prompt: String,
        attempts: u32,
        last_error: ValidationError,
    },

    #[error("Console error: {0}")]
    Io(String),
}

/// Where messages go and answers come from.
#[async_trait]
pub trait HumanInterface: Send + Sync {
    /// Show a message.
    async fn say(&self, message: &str);

    /// Ask a question and wait for one line of input.
    async fn ask(&self, prompt: &str) -> Result<String, InteractionError>;
}

/// How many times a prompt is repeated after invalid answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` repeats until the answer is valid
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Ask once, trimming the answer and honoring the quit words.
pub async fn ask(human: &dyn HumanInterface, prompt: &str) -> Result<String, InteractionError> {
    let answer = human.ask(prompt).await?;
    let trimmed = answer.trim();
    if QUIT_WORDS.iter().any(|w| trimmed.eq_ignore_ascii_case(w)) {
        return Err(InteractionError::Cancelled);
    }
    Ok(trimmed.to_string())
}

/// Ask until `parse` accepts the answer, showing each validation error.
pub async fn ask_until_valid<T, F>(
    human: &dyn HumanInterface,
    prompt: &str,
    policy: RetryPolicy,
    mut parse: F,
) -> Result<T, InteractionError>
where
    F: FnMut(&str) -> Result<T, ValidationError>,
{
    let mut attempts = 0;
    loop {
        let answer = ask(human, prompt).await?;
        attempts += 1;
        match parse(&answer) {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::debug!(prompt, attempts, error = %e, "Invalid answer");
                if policy.exhausted(attempts) {
                    human.say(&format!("Invalid input: {}", e)).await;
                    return Err(InteractionError::AttemptsExhausted {
                        prompt: prompt.to_string(),
                        attempts,
                        last_error: e,
                    });
                }
                human.say(&format!("Invalid input: {} Please try again.", e)).await;
            }
        }
    }
}

/// Parse a yes/no answer.
pub fn parse_yes_no(answer: &str) -> Result<bool, ValidationError> {
    let lowered = answer.trim().to_lowercase();
    if YES_WORDS.contains(&lowered.as_str()) {
        Ok(true)
    } else if NO_WORDS.contains(&lowered.as_str()) {
        Ok(false)
    } else {
        Err(ValidationError::InvalidChoice {
            value: answer.trim().to_string(),
            max: 2,
        })
    }
}

/// Ask a yes/no question.
pub async fn confirm(
    human: &dyn HumanInterface,
    question: &str,
    policy: RetryPolicy,
) -> Result<bool, InteractionError> {
    let prompt = format!("{} (yes/no)", question);
    ask_until_valid(human, &prompt, policy, parse_yes_no).await
}

/// Parse a 1-based menu choice.
pub fn parse_menu_choice(answer: &str, options: usize) -> Result<usize, ValidationError> {
    match answer.trim().parse::<usize>() {
        Ok(n) if (1..=options).contains(&n) => Ok(n - 1),
        _ => Err(ValidationError::InvalidChoice {
            value: answer.trim().to_string(),
            max: options,
        }),
    }
}

/// Render a numbered menu, starting at 1.
pub fn render_menu<T: Display>(title: &str, options: &[T]) -> String {
    let mut menu = format!("{}:", title);
    for (i, option) in options.iter().enumerate() {
        menu.push_str(&format!("\n  {}. {}", i + 1, option));
    }
    menu
}

/// One line of a scripted conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    Said(String),
    Asked { prompt: String, answer: String },
}

/// Non-interactive human that replays prepared answers and records the
/// conversation. Runs out of answers with [`InteractionError::InputClosed`].
#[derive(Debug, Default)]
pub struct ScriptedHuman {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<TranscriptEntry>>,
}

impl ScriptedHuman {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().clone()
    }

    /// Messages shown so far.
    pub fn messages(&self) -> Vec<String> {
        self.transcript
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                TranscriptEntry::Said(message) => Some(message.clone()),
                TranscriptEntry::Asked { .. } => None,
            })
            .collect()
    }

    /// Prompts asked so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.transcript
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                TranscriptEntry::Asked { prompt, .. } => Some(prompt.clone()),
                TranscriptEntry::Said(_) => None,
            })
            .collect()
    }

    pub fn remaining_answers(&self) -> usize {
        self.answers.lock().len()
    }
}

#[async_trait]
impl HumanInterface for ScriptedHuman {
    async fn say(&self, message: &str) {
        self.transcript
            .lock()
            .push(TranscriptEntry::Said(message.to_string()));
    }

    async fn ask(&self, prompt: &str) -> Result<String, InteractionError> {
        let answer = self
            .answers
            .lock()
            .pop_front()
            .ok_or(InteractionError::InputClosed)?;
        self.transcript.lock().push(TranscriptEntry::Asked {
            prompt: prompt.to_string(),
            answer: answer.clone(),
        });
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::validation::parse_amount;

    #[tokio::test]
    async fn test_ask_trims_and_detects_quit() {
        let human = ScriptedHuman::new(["  hello ", "QUIT"]);
        assert_eq!(ask(&human, "Say something").await.unwrap(), "hello");
        assert_eq!(
            ask(&human, "Again").await,
            Err(InteractionError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_ask_until_valid_reprompts_with_same_rule() {
        let human = ScriptedHuman::new(["abc", "", "12,5"]);
        let amount = ask_until_valid(&human, "Price", RetryPolicy::unbounded(), parse_amount)
            .await
            .unwrap();
        assert_eq!(amount, "12.5");
        assert_eq!(human.prompts(), vec!["Price", "Price", "Price"]);
        assert_eq!(human.messages().len(), 2);
        assert!(human.messages()[0].contains("'abc'"));
    }

    #[tokio::test]
    async fn test_bounded_policy_gives_up() {
        let human = ScriptedHuman::new(["x", "y", "z"]);
        let result = ask_until_valid(&human, "Price", RetryPolicy::bounded(2), parse_amount).await;
        match result {
            Err(InteractionError::AttemptsExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("Expected AttemptsExhausted, got {:?}", other),
        }
        assert_eq!(human.remaining_answers(), 1);
    }

    #[tokio::test]
    async fn test_running_out_of_answers_closes_input() {
        let human = ScriptedHuman::new(Vec::<String>::new());
        assert_eq!(
            confirm(&human, "Proceed?", RetryPolicy::unbounded()).await,
            Err(InteractionError::InputClosed)
        );
    }

    #[tokio::test]
    async fn test_confirm_accepts_common_words() {
        let human = ScriptedHuman::new(["maybe", "Da", "n"]);
        assert!(confirm(&human, "Proceed?", RetryPolicy::unbounded()).await.unwrap());
        assert!(!confirm(&human, "Proceed?", RetryPolicy::unbounded()).await.unwrap());
        assert_eq!(human.prompts()[0], "Proceed? (yes/no)");
    }

    #[test]
    fn test_menu_is_one_based() {
        let menu = render_menu("Contract types", &["buy-sell", "short-term-rental", "it-consulting"]);
        assert!(menu.starts_with("Contract types:\n  1. buy-sell"));
        assert!(menu.ends_with("  3. it-consulting"));
    }

    #[test]
    fn test_parse_menu_choice() {
        assert_eq!(parse_menu_choice("1", 3), Ok(0));
        assert_eq!(parse_menu_choice(" 3 ", 3), Ok(2));
        assert!(parse_menu_choice("three", 3).is_err());
        assert!(parse_menu_choice("", 3).is_err());
    }
}
