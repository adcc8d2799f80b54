//! Operator I/O and the retry-until-valid prompt loop.
//!
//! Every workflow that needs an operator-supplied value goes through
//! [`ValidationLoop::resolve`]: a value given on the command line is checked
//! once and rejected outright, a missing value is prompted for until the
//! validator accepts it or the attempt ceiling is reached.
use crate::error::{ConsoleError, ConsoleResult};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Ceiling on consecutive rejected answers before a prompt gives up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Line-oriented operator terminal.
pub trait Terminal {
    /// Show `prompt` and read one line; `None` means input is closed.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;

    /// Print a block of text to the operator.
    fn say(&mut self, text: &str);
}

/// Terminal backed by the process stdin/stdout.
#[derive(Debug, Default)]
pub struct StdTerminal;

impl Terminal for StdTerminal {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        stdout
            .write_all(prompt.as_bytes())
            .context("write prompt")?;
        stdout.flush().context("flush prompt")?;
        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read operator input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn say(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Terminal fed from a fixed list of answers, recording everything shown.
///
/// Used by tests in place of [`StdTerminal`].
#[derive(Debug, Default)]
pub struct ScriptedTerminal {
    answers: VecDeque<String>,
    prompts: Vec<String>,
    transcript: Vec<String>,
}

impl ScriptedTerminal {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
            transcript: Vec::new(),
        }
    }

    /// Prompts shown so far, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Everything passed to [`Terminal::say`], in order.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn output(&self) -> String {
        self.transcript.join("\n")
    }

    pub fn remaining_answers(&self) -> usize {
        self.answers.len()
    }
}

impl Terminal for ScriptedTerminal {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.answers.pop_front())
    }

    fn say(&mut self, text: &str) {
        self.transcript.push(text.to_string());
    }
}

/// Ask a yes/no question; only an explicit `y` counts as yes.
pub fn confirm(term: &mut dyn Terminal, question: &str) -> ConsoleResult<bool> {
    let answer = term.read_line(question)?;
    Ok(matches!(answer.as_deref().map(str::trim), Some("y")))
}

/// Retry-until-valid prompt primitive.
#[derive(Debug, Clone, Copy)]
pub struct ValidationLoop {
    max_attempts: usize,
}

impl Default for ValidationLoop {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ValidationLoop {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Resolve a value from `initial` or, when absent, from the operator.
    ///
    /// The validator maps raw text to a typed value or a reason string. It
    /// sees the answer exactly as typed and does its own trimming.
    /// Nothing besides the terminal is touched, so an abort leaves the
    /// caller's state exactly as it was.
    pub fn resolve<T, F>(
        &self,
        term: &mut dyn Terminal,
        initial: Option<&str>,
        question: &str,
        validate: F,
    ) -> ConsoleResult<T>
    where
        F: Fn(&str) -> std::result::Result<T, String>,
    {
        if let Some(value) = initial {
            return validate(value).map_err(ConsoleError::Invalid);
        }

        let mut last_reason = String::from("no value entered.");
        for attempt in 1..=self.max_attempts {
            let Some(raw) = term.read_line(question)? else {
                return Err(ConsoleError::aborted("input closed before a valid value was entered."));
            };
            match validate(&raw) {
                Ok(value) => return Ok(value),
                Err(reason) => {
                    tracing::debug!(attempt, %reason, "prompt answer rejected");
                    if attempt < self.max_attempts {
                        term.say(&format!("*** {reason} Try again."));
                    }
                    last_reason = reason;
                }
            }
        }
        Err(ConsoleError::aborted(format!(
            "{last_reason} Gave up after {} attempts.",
            self.max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn positive(raw: &str) -> std::result::Result<u32, String> {
        match raw.trim().parse::<u32>() {
            Ok(0) => Err("must be greater than 0.".to_string()),
            Ok(value) => Ok(value),
            Err(_) => Err("must be a whole number.".to_string()),
        }
    }

    #[test]
    fn present_value_is_validated_once_without_prompting() {
        let mut term = ScriptedTerminal::new(["7"]);
        let err = ValidationLoop::default()
            .resolve(&mut term, Some("zero"), "count? ", positive)
            .expect_err("invalid initial value");
        assert!(matches!(err, ConsoleError::Invalid(_)));
        assert!(term.prompts().is_empty());
        assert_eq!(term.remaining_answers(), 1);

        let value = ValidationLoop::default()
            .resolve(&mut term, Some("3"), "count? ", positive)
            .expect("valid initial value");
        assert_eq!(value, 3);
        assert!(term.prompts().is_empty());
    }

    #[test]
    fn missing_value_is_prompted_until_valid() {
        let mut term = ScriptedTerminal::new(["abc", "0", " 12 "]);
        let value = ValidationLoop::default()
            .resolve(&mut term, None, "count? ", positive)
            .expect("third answer is valid");
        assert_eq!(value, 12);
        assert_eq!(term.prompts().len(), 3);
        assert_eq!(
            term.transcript(),
            [
                "*** must be a whole number. Try again.",
                "*** must be greater than 0. Try again."
            ]
        );
    }

    #[test]
    fn always_rejecting_validator_aborts_at_the_ceiling() {
        let mut term = ScriptedTerminal::new(vec!["nope"; 10]);
        let calls = Cell::new(0);
        let err = ValidationLoop::new(5)
            .resolve(&mut term, None, "region? ", |_raw| -> std::result::Result<(), String> {
                calls.set(calls.get() + 1);
                Err("region not allowed.".to_string())
            })
            .expect_err("ceiling reached");
        assert!(matches!(err, ConsoleError::Aborted { .. }));
        assert!(err.to_string().ends_with("No changes made."));
        assert_eq!(calls.get(), 5);
        assert_eq!(term.remaining_answers(), 5);
    }

    #[test]
    fn validator_sees_the_answer_as_typed() {
        let mut term = ScriptedTerminal::new(["  two words  "]);
        let value = ValidationLoop::default()
            .resolve(&mut term, None, "phrase? ", |raw| -> std::result::Result<String, String> {
                Ok(raw.to_string())
            })
            .expect("answer");
        assert_eq!(value, "  two words  ");
    }

    #[test]
    fn closed_input_aborts() {
        let mut term = ScriptedTerminal::new(Vec::<String>::new());
        let err = ValidationLoop::default()
            .resolve(&mut term, None, "count? ", positive)
            .expect_err("no input");
        assert!(matches!(err, ConsoleError::Aborted { .. }));
    }

    #[test]
    fn confirm_accepts_only_y() {
        let mut term = ScriptedTerminal::new(["yes", " y "]);
        assert!(!confirm(&mut term, "sure? ").expect("answer"));
        assert!(confirm(&mut term, "sure? ").expect("answer"));
        assert!(!confirm(&mut term, "sure? ").expect("closed input"));
    }
}
