//! Prompt assembly under a character budget.
//!
//! A prompt is a fixed frame (instructions, the question) with ranked schema
//! context spliced into the middle. Items are added in rank order until the
//! next one would push the prompt past the budget; that item and everything
//! after it is dropped whole. Lengths are counted in `char`s.

use tracing::debug;

use crate::error::{AssistantError, Result};
use crate::models::{ContextTarget, Prompt, RankedContextItem};

/// Sentence the model must reply with when the schema cannot answer
pub const REFUSAL_SENTENCE: &str =
    "I cannot generate a SQL query for this request based on the provided schema.";

const SYSTEM_INSTRUCTIONS: &str = "\
You write BigQuery SQL for questions about the tables described below.
Rules:
- Use only the tables and columns listed in the schema section.
- Use table and column names exactly as written.
- Write standard BigQuery SQL.
- Return only the query inside a ```sql code block, with no explanation.
";

const FALLBACK_INSTRUCTIONS: &str = "\
No table in the available schema matches the question below.
Do not write SQL.
";

const REFINEMENT_INSTRUCTIONS: &str = "\
A SQL query could not be generated for the question below using the tables described.
Explain briefly why, then suggest exactly three refined questions that these tables can answer.
Write each suggestion on its own line starting with \"- \". Do not write SQL.
";

/// Builds prompts from ranked schema context
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    /// `project.dataset` prefix for table names, when configured
    qualifier: Option<String>,
}

impl PromptAssembler {
    /// Assembler using bare table names
    #[must_use]
    pub const fn new() -> Self {
        Self { qualifier: None }
    }

    /// Assembler requiring `project.dataset.table` names
    #[must_use]
    pub fn with_qualifier(project: &str, dataset: &str) -> Self {
        Self {
            qualifier: Some(format!("{project}.{dataset}")),
        }
    }

    /// Assemble the generation prompt for `question`
    pub fn assemble(
        &self,
        question: &str,
        ranked: &[RankedContextItem<'_>],
        char_budget: usize,
    ) -> Result<Prompt> {
        let header = self.header();
        let footer = format!("\nQuestion: {question}\nSQL:\n");

        if ranked.is_empty() {
            return Self::fallback(question, char_budget);
        }

        let items: Vec<(String, String)> = ranked
            .iter()
            .map(|item| (item.target.label(), self.render_item(item.target)))
            .collect();

        match Self::fill(&header, &items, &footer, char_budget)? {
            Some(prompt) => Ok(prompt),
            None => {
                debug!(char_budget, "No context item fits the budget");
                Self::fallback(question, char_budget)
            }
        }
    }

    /// Prompt asking the model why it declined and for better questions
    pub fn refinement(
        &self,
        question: &str,
        ranked: &[RankedContextItem<'_>],
        char_budget: usize,
    ) -> Result<Prompt> {
        let header = format!("{REFINEMENT_INSTRUCTIONS}\nSchema:\n");
        let footer = format!("\nQuestion: {question}\n");
        let items: Vec<(String, String)> = ranked
            .iter()
            .map(|item| {
                let table = item.target.table();
                (
                    item.target.label(),
                    format!("- {}: {}\n", self.qualified(&table.name), table.description),
                )
            })
            .collect();

        let prompt = Self::fill(&header, &items, &footer, char_budget)?
            .unwrap_or_else(|| Prompt::new(format!("{header}{footer}"), Vec::new(), false));
        Ok(prompt)
    }

    /// Characters used by the frame around the context for a question of
    /// `question_chars` characters
    #[must_use]
    pub fn frame_overhead(&self, question_chars: usize) -> usize {
        self.header().chars().count() + "\nQuestion: \nSQL:\n".chars().count() + question_chars
    }

    fn header(&self) -> String {
        let mut header = String::from(SYSTEM_INSTRUCTIONS);
        if let Some(qualifier) = &self.qualifier {
            header.push_str(&format!(
                "- Refer to every table by its fully qualified name, {qualifier}.<table>.\n"
            ));
        }
        header.push_str(&format!(
            "- If the schema cannot answer the question, reply exactly: {REFUSAL_SENTENCE}\n\nSchema:\n"
        ));
        header
    }

    fn qualified(&self, table: &str) -> String {
        self.qualifier
            .as_ref()
            .map_or_else(|| table.to_string(), |q| format!("{q}.{table}"))
    }

    fn render_item(&self, target: ContextTarget<'_>) -> String {
        match target {
            ContextTarget::Table(table) => format!(
                "Table: {}\nDescription: {}\nDDL:\n{}\n\n",
                self.qualified(&table.name),
                table.description,
                table.ddl
            ),
            ContextTarget::Column { table, column } => format!(
                "Column: {}.{} ({}, {}): {}\n",
                self.qualified(&table.name),
                column.name,
                column.column_type,
                column.mode,
                column.description
            ),
        }
    }

    /// Greedy fill; `None` when not a single item fits
    fn fill(
        header: &str,
        items: &[(String, String)],
        footer: &str,
        char_budget: usize,
    ) -> Result<Option<Prompt>> {
        let frame = header.chars().count() + footer.chars().count();
        if frame > char_budget {
            return Err(AssistantError::PromptBudgetExceeded {
                required: frame,
                budget: char_budget,
            });
        }

        let mut used = frame;
        let mut body = String::new();
        let mut labels = Vec::new();
        for (label, rendered) in items {
            let len = rendered.chars().count();
            if used + len > char_budget {
                debug!(
                    dropped = items.len() - labels.len(),
                    kept = labels.len(),
                    "Context truncated at budget"
                );
                break;
            }
            used += len;
            body.push_str(rendered);
            labels.push(label.clone());
        }

        if labels.is_empty() {
            return Ok(None);
        }
        Ok(Some(Prompt::new(format!("{header}{body}{footer}"), labels, false)))
    }

    fn fallback(question: &str, char_budget: usize) -> Result<Prompt> {
        let text = format!(
            "{FALLBACK_INSTRUCTIONS}Reply exactly: {REFUSAL_SENTENCE}\n\nQuestion: {question}\n"
        );
        let required = text.chars().count();
        if required > char_budget {
            return Err(AssistantError::PromptBudgetExceeded {
                required,
                budget: char_budget,
            });
        }
        Ok(Prompt::new(text, Vec::new(), true))
    }
}
