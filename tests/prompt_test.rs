//! Integration and property tests for prompt assembly

use nl2sql_assistant::models::ContextTarget;
use nl2sql_assistant::prompt::REFUSAL_SENTENCE;
use nl2sql_assistant::{
    AssistantError, PromptAssembler, RankedContextItem, SchemaCatalog, SchemaDocument,
};
use proptest::prelude::*;

fn catalog(count: usize) -> SchemaCatalog {
    let docs = (0..count).map(|i| {
        let name = format!("table_{i}");
        SchemaDocument::new(
            format!("{name}.txt"),
            format!(
                "Table Name: {name}\nTable Description: Table number {i}, with a description \
                 long enough to matter.\nColumns:\n\
                 1. Column: Id\n   Type: STRING\n   Mode: REQUIRED\n   Description: Row key.\n\
                 2. Column: Amount\n   Type: FLOAT64\n   Mode: NULLABLE\n   Description: Amount.\n\
                 DDL:\nCREATE TABLE {name} (\n  Id STRING NOT NULL,\n  Amount FLOAT64\n);\n"
            ),
        )
    });
    SchemaCatalog::load(docs).expect("catalog")
}

fn ranked(catalog: &SchemaCatalog) -> Vec<RankedContextItem<'_>> {
    catalog
        .all_tables()
        .iter()
        .enumerate()
        .map(|(i, table)| RankedContextItem {
            target: ContextTarget::Table(table),
            score: 1.0,
            rank: i + 1,
        })
        .collect()
}

#[test]
fn test_assembly_is_byte_identical() {
    let catalog = catalog(3);
    let assembler = PromptAssembler::new();
    let a = assembler.assemble("total amount", &ranked(&catalog), 5_000).expect("a");
    let b = assembler.assemble("total amount", &ranked(&catalog), 5_000).expect("b");
    assert_eq!(a.text(), b.text());
    assert_eq!(a, b);
}

#[test]
fn test_ddl_is_verbatim() {
    let catalog = catalog(1);
    let prompt = PromptAssembler::new()
        .assemble("q", &ranked(&catalog), 5_000)
        .expect("prompt");
    assert!(prompt.text().contains(&catalog.all_tables()[0].ddl));
    assert!(prompt.text().contains("Description: Table number 0"));
}

#[test]
fn test_empty_context_is_fallback_even_with_tiny_budget() {
    let prompt = PromptAssembler::new()
        .assemble("q", &[], 200)
        .expect("prompt");
    assert!(prompt.is_fallback());
    assert!(prompt.text().contains(REFUSAL_SENTENCE));
    assert!(prompt.char_len() <= 200);
}

#[test]
fn test_budget_below_fallback_is_an_error() {
    let result = PromptAssembler::new().assemble("q", &[], 10);
    assert!(matches!(result, Err(AssistantError::PromptBudgetExceeded { .. })));
}

#[test]
fn test_budget_counts_characters_not_bytes() {
    let catalog = catalog(1);
    let assembler = PromptAssembler::new();
    let question = "durchschnittliche Größe";
    let prompt = assembler
        .assemble(question, &ranked(&catalog), 5_000)
        .expect("prompt");

    let exact = prompt.char_len();
    assert!(prompt.text().len() > exact);
    let again = assembler
        .assemble(question, &ranked(&catalog), exact)
        .expect("prompt");
    assert!(!again.is_fallback());
    assert_eq!(again.char_len(), exact);
}

proptest! {
    #[test]
    fn prop_assembled_prompt_fits_budget(
        tables in 0usize..6,
        extra in 0usize..2_000,
        question in "[a-z ]{1,40}",
    ) {
        let catalog = catalog(tables);
        let ranked = ranked(&catalog);
        let assembler = PromptAssembler::new();
        let budget = assembler.frame_overhead(question.chars().count()) + extra;

        let prompt = assembler.assemble(&question, &ranked, budget).expect("prompt");
        prop_assert!(prompt.char_len() <= budget);

        // Included items are a whole prefix of the ranking
        let labels = prompt.context_labels();
        for (label, item) in labels.iter().zip(&ranked) {
            prop_assert_eq!(label, &item.target.label());
            prop_assert!(prompt.text().contains(&item.target.table().ddl));
        }
        prop_assert!(labels.len() <= ranked.len());
        prop_assert_eq!(prompt.is_fallback(), labels.is_empty());
    }
}
