//! Completion call and SQL post-processing.
//!
//! The gateway sends an assembled prompt to a [`CompletionProvider`] and
//! reduces whatever comes back to exactly one `SELECT`/`WITH` statement, or a
//! fallback reason. It never retries.

use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{AssistantError, Result};
use crate::models::{FallbackReason, GenerationResult, Prompt, RefusalCause};
use crate::prompt::REFUSAL_SENTENCE;
use crate::provider::CompletionProvider;

const FENCE: &str = "```";
const MAX_SUGGESTIONS: usize = 3;

/// Why a response could not be reduced to one statement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// An odd number of ``` markers
    #[error("unbalanced code fence")]
    UnbalancedFence,
    /// Zero or several fenced blocks
    #[error("expected one fenced block, found {0}")]
    FencedBlocks(usize),
    /// A quote or block comment never closed
    #[error("unterminated literal or comment")]
    Unterminated,
    /// Nothing but whitespace and comments
    #[error("no SQL statement")]
    Empty,
    /// More than one statement
    #[error("expected one statement, found {0}")]
    MultipleStatements(usize),
    /// The statement is not a query
    #[error("statement does not start with SELECT or WITH: {0}")]
    NotAQuery(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Code,
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
}

/// A `;`-delimited piece of the response
struct Segment {
    text: String,
    /// Byte offset of the first character outside a comment, if any
    code_start: Option<usize>,
}

impl Segment {
    const fn new() -> Self {
        Self {
            text: String::new(),
            code_start: None,
        }
    }

    fn push(&mut self, c: char, is_code: bool) {
        if is_code && self.code_start.is_none() && !c.is_whitespace() {
            self.code_start = Some(self.text.len());
        }
        self.text.push(c);
    }

    fn statement(&self) -> Option<String> {
        self.code_start
            .map(|start| self.text[start..].trim_end().to_string())
    }
}

/// Reduces a raw model response to a single SQL query
#[derive(Debug, Clone)]
pub struct SqlExtractor {
    query_start: Regex,
    language_tag: Regex,
}

impl SqlExtractor {
    /// Compile the extractor
    pub fn new() -> Result<Self> {
        let query_start = Regex::new(r"(?i)^(select|with)\b")
            .map_err(|e| AssistantError::Other(format!("Failed to compile query regex: {e}")))?;
        let language_tag = Regex::new(r"(?i)^sql\b:?\s*")
            .map_err(|e| AssistantError::Other(format!("Failed to compile tag regex: {e}")))?;
        Ok(Self {
            query_start,
            language_tag,
        })
    }

    /// Extract exactly one query, keeping its trailing `;` if present
    pub fn extract(&self, response: &str) -> std::result::Result<String, ExtractError> {
        let body = self.unwrap_body(response)?;
        // A bare `sql` tag left over from a one-line fence or a plain answer
        let body = self.language_tag.find(body).map_or(body, |tag| &body[tag.end()..]);
        let statement = Self::single_statement(body)?;
        if !self.query_start.is_match(&statement) {
            let head: String = statement.chars().take(40).collect();
            return Err(ExtractError::NotAQuery(head));
        }
        Ok(statement)
    }

    fn unwrap_body<'r>(&self, response: &'r str) -> std::result::Result<&'r str, ExtractError> {
        let trimmed = response.trim();

        if trimmed.contains(FENCE) {
            let parts: Vec<&str> = trimmed.split(FENCE).collect();
            let markers = parts.len() - 1;
            if markers % 2 == 1 {
                return Err(ExtractError::UnbalancedFence);
            }
            if markers != 2 {
                return Err(ExtractError::FencedBlocks(markers / 2));
            }
            let block = parts[1];
            // Drop an info string such as `sql` on the opening line
            let body = match block.split_once('\n') {
                Some((first, rest))
                    if first.trim().chars().all(char::is_alphanumeric)
                        && !self.query_start.is_match(first.trim()) =>
                {
                    rest
                }
                _ => block,
            };
            return Ok(body.trim());
        }

        if trimmed.len() >= 2 && trimmed.starts_with('`') && trimmed.ends_with('`') {
            return Ok(trimmed[1..trimmed.len() - 1].trim());
        }
        Ok(trimmed)
    }

    /// Split on `;` outside quotes, backtick identifiers and comments
    fn single_statement(body: &str) -> std::result::Result<String, ExtractError> {
        let mut segments = Vec::new();
        let mut current = Segment::new();
        let mut state = Lexeme::Code;
        let mut chars = body.chars().peekable();

        while let Some(c) = chars.next() {
            match state {
                Lexeme::Code => match c {
                    ';' => {
                        current.push(c, true);
                        segments.push(std::mem::replace(&mut current, Segment::new()));
                    }
                    '\'' | '"' | '`' => {
                        state = match c {
                            '\'' => Lexeme::SingleQuote,
                            '"' => Lexeme::DoubleQuote,
                            _ => Lexeme::Backtick,
                        };
                        current.push(c, true);
                    }
                    '-' if chars.peek() == Some(&'-') => {
                        state = Lexeme::LineComment;
                        current.push(c, false);
                    }
                    '#' => {
                        state = Lexeme::LineComment;
                        current.push(c, false);
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        state = Lexeme::BlockComment;
                        current.push(c, false);
                        if let Some(star) = chars.next() {
                            current.push(star, false);
                        }
                    }
                    _ => current.push(c, true),
                },
                Lexeme::SingleQuote | Lexeme::DoubleQuote | Lexeme::Backtick => {
                    current.push(c, true);
                    let closing = match state {
                        Lexeme::SingleQuote => '\'',
                        Lexeme::DoubleQuote => '"',
                        _ => '`',
                    };
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped, true);
                        }
                    } else if c == closing {
                        state = Lexeme::Code;
                    }
                }
                Lexeme::LineComment => {
                    current.push(c, false);
                    if c == '\n' {
                        state = Lexeme::Code;
                    }
                }
                Lexeme::BlockComment => {
                    current.push(c, false);
                    if c == '*' && chars.peek() == Some(&'/') {
                        if let Some(slash) = chars.next() {
                            current.push(slash, false);
                        }
                        state = Lexeme::Code;
                    }
                }
            }
        }

        if !matches!(state, Lexeme::Code | Lexeme::LineComment) {
            return Err(ExtractError::Unterminated);
        }
        segments.push(current);

        let mut statements: Vec<String> = segments.iter().filter_map(Segment::statement).collect();
        // A lone `;` has a code start but no statement
        statements.retain(|s| s != ";");
        match statements.len() {
            0 => Err(ExtractError::Empty),
            1 => Ok(statements.remove(0)),
            n => Err(ExtractError::MultipleStatements(n)),
        }
    }
}

/// Sends prompts to the completion service and validates the answer
#[derive(Clone)]
pub struct GenerationGateway {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
    extractor: SqlExtractor,
}

impl GenerationGateway {
    /// Gateway over `provider`; each call is bounded by `timeout`
    pub fn new(provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            provider,
            timeout,
            extractor: SqlExtractor::new()?,
        })
    }

    /// Name of the wrapped provider
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Generate one SQL statement for `prompt`
    pub async fn generate(&self, prompt: &Prompt) -> GenerationResult {
        if prompt.is_fallback() {
            debug!("Fallback prompt, skipping completion");
            return GenerationResult::Fallback(FallbackReason::NoContext);
        }

        let started = Instant::now();
        let response = match self.call(prompt.text()).await {
            Ok(response) => response,
            Err(cause) => {
                warn!(provider = self.provider.name(), %cause, "Completion failed");
                return GenerationResult::Fallback(FallbackReason::ModelRefused(cause));
            }
        };
        info!(
            provider = self.provider.name(),
            elapsed = ?started.elapsed(),
            response_chars = response.chars().count(),
            "Completion received"
        );

        self.interpret(&response)
    }

    /// Classify a raw response
    #[must_use]
    pub fn interpret(&self, response: &str) -> GenerationResult {
        if response
            .to_lowercase()
            .contains(&REFUSAL_SENTENCE.to_lowercase())
        {
            return GenerationResult::Fallback(FallbackReason::ModelRefused(RefusalCause::Declined));
        }

        match self.extractor.extract(response) {
            Ok(sql) => GenerationResult::Sql(sql),
            Err(e) => {
                debug!(error = %e, "Response rejected");
                GenerationResult::Fallback(FallbackReason::UnparsableResponse(e.to_string()))
            }
        }
    }

    /// Ask for refined questions; empty on any failure
    pub async fn suggest_refinements(&self, prompt: &Prompt) -> Vec<String> {
        match self.call(prompt.text()).await {
            Ok(response) => parse_suggestions(&response),
            Err(cause) => {
                debug!(%cause, "Refinement request failed");
                Vec::new()
            }
        }
    }

    async fn call(&self, text: &str) -> std::result::Result<String, RefusalCause> {
        match tokio::time::timeout(self.timeout, self.provider.complete(text)).await {
            Err(_) => Err(RefusalCause::Timeout {
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(e)) => Err(RefusalCause::Service(e.to_string())),
            Ok(Ok(response)) => Ok(response),
        }
    }
}

/// Bullet items (`- `, `* ` or `1. `) of a refinement answer
fn parse_suggestions(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    let (number, rest) = line.split_once(". ")?;
                    number.chars().all(|c| c.is_ascii_digit()).then_some(rest)
                })
        })
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .take(MAX_SUGGESTIONS)
        .collect()
}
