//! Text prompts answered by the user.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// What the user is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub message: String,
    pub default: Option<String>,
}

impl PromptRequest {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Confirmed(String),
    Cancelled,
}

pub trait Prompt {
    fn request(&mut self, request: PromptRequest) -> PromptOutcome;
}

/// Replays prepared answers in order, then cancels.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<PromptOutcome>,
    asked: Vec<PromptRequest>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = PromptOutcome>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    pub fn asked(&self) -> &[PromptRequest] {
        &self.asked
    }
}

impl Prompt for ScriptedPrompt {
    fn request(&mut self, request: PromptRequest) -> PromptOutcome {
        self.asked.push(request);
        self.answers.pop_front().unwrap_or(PromptOutcome::Cancelled)
    }
}

/// Reads one line per request. End of input cancels; an empty line takes
/// the default when there is one.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Prompt for LinePrompt<R, W> {
    fn request(&mut self, request: PromptRequest) -> PromptOutcome {
        let shown = match &request.default {
            Some(default) => format!("{} [{}]: ", request.message, default),
            None => format!("{}: ", request.message),
        };
        if self
            .output
            .write_all(shown.as_bytes())
            .and_then(|_| self.output.flush())
            .is_err()
        {
            return PromptOutcome::Cancelled;
        }
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => PromptOutcome::Cancelled,
            Ok(_) => {
                let answer = line.trim_end_matches(['\r', '\n']).to_string();
                match (&request.default, answer.trim().is_empty()) {
                    (Some(default), true) => PromptOutcome::Confirmed(default.clone()),
                    _ => PromptOutcome::Confirmed(answer),
                }
            }
        }
    }
}
