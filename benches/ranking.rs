//! Ranking and prompt assembly benchmarks
//!
//! Run with: cargo bench --bench ranking

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nl2sql_assistant::{ContextRanker, PromptAssembler, SchemaCatalog, SchemaDocument};
use std::path::PathBuf;

const TOPICS: [&str; 5] = ["income", "poverty", "commute", "employment", "population"];

fn synthetic_catalog(tables: usize) -> SchemaCatalog {
    let docs = (0..tables).map(|i| {
        let topic = TOPICS[i % TOPICS.len()];
        let name = format!("{topic}_{i}");
        SchemaDocument::new(
            format!("{name}.txt"),
            format!(
                "Table Name: {name}\nTable Description: Tract level {topic} estimates.\nColumns:\n\
                 1. Column: TractId\n   Type: STRING\n   Mode: REQUIRED\n   Description: Tract identifier.\n\
                 2. Column: State\n   Type: STRING\n   Mode: REQUIRED\n   Description: State name.\n\
                 3. Column: Value\n   Type: FLOAT64\n   Mode: NULLABLE\n   Description: Measured {topic}.\n\
                 CREATE TABLE {name} (TractId STRING NOT NULL, State STRING NOT NULL, Value FLOAT64);\n"
            ),
        )
    });
    SchemaCatalog::load(docs).expect("Failed to build catalog")
}

fn bench_rank(c: &mut Criterion) {
    let ranker = ContextRanker::lexical(0.1).expect("Failed to create ranker");
    let mut group = c.benchmark_group("rank_tables");

    for tables in [10, 100, 1_000] {
        let catalog = synthetic_catalog(tables);
        group.bench_with_input(BenchmarkId::from_parameter(tables), &catalog, |b, catalog| {
            b.iter(|| {
                ranker
                    .rank(black_box("average income by state"), catalog, 3)
                    .expect("rank")
            });
        });
    }
    group.finish();
}

fn bench_demographics(c: &mut Criterion) {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schemas");
    let catalog = SchemaCatalog::load_dir(&dir, "txt").expect("Failed to load schemas");
    let ranker = ContextRanker::lexical(0.1).expect("Failed to create ranker");
    let assembler = PromptAssembler::new();
    let question = "What is the average income in California?";

    c.bench_function("rank_columns_demographics", |b| {
        b.iter(|| {
            ranker
                .rank_columns(black_box(question), &catalog, 10)
                .expect("rank")
        });
    });

    c.bench_function("rank_and_assemble_demographics", |b| {
        b.iter(|| {
            let ranked = ranker.rank(black_box(question), &catalog, 3).expect("rank");
            assembler.assemble(question, &ranked, 12_000).expect("assemble")
        });
    });
}

criterion_group!(benches, bench_rank, bench_demographics);
criterion_main!(benches);
