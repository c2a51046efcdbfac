use crate::error::{AssistantError, Result};

/// Validation utilities for incoming questions
#[derive(Debug, Copy, Clone)]
pub struct QuestionValidator;

impl QuestionValidator {
    /// Validate a question and return its sanitized form
    pub fn validate_question(question: &str, max_chars: usize) -> Result<String> {
        if question.contains('\0') {
            return Err(AssistantError::InvalidQuestion(
                "Question contains invalid characters".to_string(),
            ));
        }

        let sanitized = Self::sanitize_text(question);
        if sanitized.is_empty() {
            return Err(AssistantError::EmptyQuestion);
        }

        let len = sanitized.chars().count();
        if len > max_chars {
            return Err(AssistantError::InvalidQuestion(format!(
                "Question too long ({len} characters, max {max_chars})"
            )));
        }

        Ok(sanitized)
    }

    /// Collapse whitespace runs and drop control characters
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.split_whitespace()
            .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(
            QuestionValidator::sanitize_text("  average\tincome \n in  Texas "),
            "average income in Texas"
        );
        assert_eq!(QuestionValidator::sanitize_text("a\u{7}b"), "ab");
    }
}
