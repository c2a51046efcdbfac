//! Schema document parsing
//!
//! A schema document describes one table: a `Table Name:` line, a
//! `Table Description:` (which may wrap onto following lines), a `Columns:`
//! section of numbered entries with `Type:`, `Mode:` and `Description:` fields,
//! and a trailing `CREATE TABLE ...;` statement kept verbatim. A single file may
//! hold several documents back to back.

use std::collections::HashSet;

use crate::error::{AssistantError, Result};
use crate::models::{ColumnDescriptor, ColumnMode, ColumnType, TableDescriptor};

const TABLE_NAME: &str = "Table Name:";
const TABLE_DESCRIPTION: &str = "Table Description:";
const COLUMNS: &str = "Columns:";
const DDL_LABEL: &str = "DDL:";

/// A slice of a file holding exactly one table document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument<'a> {
    /// 1-based line in the file where the document starts
    pub first_line: usize,
    /// Document text
    pub text: &'a str,
}

/// Split file content into table documents on `Table Name:` lines.
pub fn split_documents<'a>(source: &str, content: &'a str) -> Result<Vec<RawDocument<'a>>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut starts = Vec::new();
    let mut offset = 0;
    for (idx, line) in content.split_inclusive('\n').enumerate() {
        if line.trim_start().starts_with(TABLE_NAME) {
            starts.push((idx + 1, offset));
        } else if starts.is_empty() && !line.trim().is_empty() {
            return Err(AssistantError::malformed(
                source,
                format!("line {}: expected '{TABLE_NAME}' before any other text", idx + 1),
            ));
        }
        offset += line.len();
    }

    if starts.is_empty() {
        return Err(AssistantError::malformed(
            source,
            format!("no '{TABLE_NAME}' line found"),
        ));
    }

    let mut documents = Vec::with_capacity(starts.len());
    for (i, &(first_line, start)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map_or(content.len(), |&(_, next)| next);
        documents.push(RawDocument {
            first_line,
            text: &content[start..end],
        });
    }
    Ok(documents)
}

/// Parse every document in a file
pub fn parse_documents(source: &str, content: &str) -> Result<Vec<TableDescriptor>> {
    split_documents(source, content)?
        .into_iter()
        .map(|doc| parse_document_at(source, doc.text, doc.first_line))
        .collect()
}

/// Parse a single table document
pub fn parse_document(source: &str, text: &str) -> Result<TableDescriptor> {
    parse_document_at(source, text, 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Columns,
    DdlLabel,
    Ddl,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    None,
    TableDescription,
    ColumnDescription,
}

#[derive(Debug)]
struct PendingColumn {
    line: usize,
    name: String,
    column_type: Option<ColumnType>,
    mode: Option<ColumnMode>,
    description: Option<String>,
}

impl PendingColumn {
    fn finish(self, source: &str) -> Result<ColumnDescriptor> {
        let missing = |field: &str| {
            AssistantError::malformed(
                source,
                format!("line {}: column '{}' is missing {field}", self.line, self.name),
            )
        };
        let column_type = self.column_type.clone().ok_or_else(|| missing("Type"))?;
        let mode = self.mode.ok_or_else(|| missing("Mode"))?;
        let description = self
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| missing("Description"))?;

        Ok(ColumnDescriptor {
            name: self.name,
            column_type,
            mode,
            description,
        })
    }
}

struct DocumentParser<'s> {
    source: &'s str,
    section: Section,
    continuation: Continuation,
    name: Option<String>,
    description: Option<String>,
    columns: Vec<ColumnDescriptor>,
    pending: Option<PendingColumn>,
    ddl: Vec<String>,
}

impl<'s> DocumentParser<'s> {
    const fn new(source: &'s str) -> Self {
        Self {
            source,
            section: Section::Header,
            continuation: Continuation::None,
            name: None,
            description: None,
            columns: Vec::new(),
            pending: None,
            ddl: Vec::new(),
        }
    }

    fn error(&self, line: usize, reason: impl AsRef<str>) -> AssistantError {
        at_line(self.source, line, reason)
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(pending) = self.pending.take() {
            let line = pending.line;
            let column = pending.finish(self.source)?;
            if self.columns.iter().any(|c| c.name == column.name) {
                return Err(self.error(line, format!("duplicate column '{}'", column.name)));
            }
            self.columns.push(column);
        }
        Ok(())
    }

    fn feed(&mut self, line_no: usize, raw: &str) -> Result<()> {
        match self.section {
            Section::Ddl => {
                self.ddl.push(raw.trim_end().to_string());
                if raw.trim_end().ends_with(';') {
                    self.section = Section::Done;
                }
                return Ok(());
            }
            Section::Done => {
                if raw.trim().is_empty() {
                    return Ok(());
                }
                return Err(self.error(line_no, "unexpected text after the DDL statement"));
            }
            _ => {}
        }

        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }

        if starts_with_create_table(line) {
            self.flush_pending()?;
            self.section = Section::Ddl;
            return self.feed(line_no, raw.trim_start());
        }

        if self.section == Section::DdlLabel {
            return Err(self.error(line_no, "expected 'CREATE TABLE' after 'DDL:'"));
        }

        if let Some(value) = line.strip_prefix(TABLE_NAME) {
            if self.name.is_some() {
                return Err(self.error(line_no, "second 'Table Name:' in one document"));
            }
            let value = value.trim();
            if value.is_empty() {
                return Err(self.error(line_no, "empty table name"));
            }
            self.name = Some(value.to_string());
            self.continuation = Continuation::None;
            return Ok(());
        }

        if let Some(value) = line.strip_prefix(TABLE_DESCRIPTION) {
            if self.name.is_none() || self.section != Section::Header {
                return Err(self.error(line_no, "'Table Description:' out of place"));
            }
            if self.description.is_some() {
                return Err(self.error(line_no, "duplicate 'Table Description:'"));
            }
            self.description = Some(value.trim().to_string());
            self.continuation = Continuation::TableDescription;
            return Ok(());
        }

        if line == COLUMNS {
            if self.name.is_none() || self.description.is_none() {
                return Err(self.error(
                    line_no,
                    "'Columns:' must follow 'Table Name:' and 'Table Description:'",
                ));
            }
            self.section = Section::Columns;
            self.continuation = Continuation::None;
            return Ok(());
        }

        if line == DDL_LABEL {
            self.flush_pending()?;
            self.section = Section::DdlLabel;
            return Ok(());
        }

        if self.section == Section::Columns {
            return self.feed_column_line(line_no, line);
        }

        if self.continuation == Continuation::TableDescription {
            if let Some(description) = self.description.as_mut() {
                append_line(description, line);
            }
            return Ok(());
        }

        Err(self.error(line_no, format!("unexpected line '{line}'")))
    }

    fn feed_column_line(&mut self, line_no: usize, line: &str) -> Result<()> {
        if let Some((number, name)) = column_entry(line) {
            self.flush_pending()?;
            let expected = self.columns.len() + 1;
            if number != expected {
                return Err(self.error(
                    line_no,
                    format!("column entry numbered {number}, expected {expected}"),
                ));
            }
            if name.is_empty() {
                return Err(self.error(line_no, "empty column name"));
            }
            self.pending = Some(PendingColumn {
                line: line_no,
                name: name.to_string(),
                column_type: None,
                mode: None,
                description: None,
            });
            self.continuation = Continuation::None;
            return Ok(());
        }

        let source = self.source;
        let field = line.strip_prefix("- ").unwrap_or(line);
        let Some(pending) = self.pending.as_mut() else {
            return Err(at_line(
                source,
                line_no,
                format!("expected a numbered column entry, found '{line}'"),
            ));
        };

        let duplicate = |label: &str, column: &str| {
            at_line(
                source,
                line_no,
                format!("duplicate '{label}' for column '{column}'"),
            )
        };

        if let Some(value) = field.strip_prefix("Type:") {
            if pending.column_type.is_some() {
                return Err(duplicate("Type:", &pending.name));
            }
            pending.column_type = Some(ColumnType::parse(value));
            self.continuation = Continuation::None;
        } else if let Some(value) = field.strip_prefix("Mode:") {
            if pending.mode.is_some() {
                return Err(duplicate("Mode:", &pending.name));
            }
            let mode = ColumnMode::parse(value).ok_or_else(|| {
                at_line(source, line_no, format!("unknown column mode '{}'", value.trim()))
            })?;
            pending.mode = Some(mode);
            self.continuation = Continuation::None;
        } else if let Some(value) = field.strip_prefix("Description:") {
            if pending.description.is_some() {
                return Err(duplicate("Description:", &pending.name));
            }
            pending.description = Some(value.trim().to_string());
            self.continuation = Continuation::ColumnDescription;
        } else if self.continuation == Continuation::ColumnDescription {
            if let Some(description) = pending.description.as_mut() {
                append_line(description, line);
            }
        } else {
            return Err(at_line(source, line_no, format!("unexpected line '{line}'")));
        }
        Ok(())
    }

    fn finish(mut self, last_line: usize) -> Result<TableDescriptor> {
        self.flush_pending()?;

        let name = self
            .name
            .take()
            .ok_or_else(|| self.error(last_line, "missing 'Table Name:'"))?;
        let description = self
            .description
            .take()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| self.error(last_line, "missing 'Table Description:'"))?;
        if self.columns.is_empty() {
            return Err(self.error(last_line, "table declares no columns"));
        }
        match self.section {
            Section::Done => {}
            Section::Ddl => return Err(self.error(last_line, "DDL statement is not terminated by ';'")),
            _ => return Err(self.error(last_line, "missing 'CREATE TABLE' statement")),
        }

        let ddl = self.ddl.join("\n");
        check_ddl(self.source, &name, &self.columns, &ddl)?;

        Ok(TableDescriptor {
            name,
            description,
            columns: self.columns,
            ddl,
        })
    }
}

fn parse_document_at(source: &str, text: &str, first_line: usize) -> Result<TableDescriptor> {
    let mut parser = DocumentParser::new(source);
    let mut last_line = first_line;
    for (idx, raw) in text.lines().enumerate() {
        last_line = first_line + idx;
        parser.feed(last_line, raw)?;
    }
    parser.finish(last_line)
}

fn at_line(source: &str, line: usize, reason: impl AsRef<str>) -> AssistantError {
    AssistantError::malformed(source, format!("line {line}: {}", reason.as_ref()))
}

fn append_line(target: &mut String, line: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(line);
}

fn starts_with_create_table(line: &str) -> bool {
    let mut words = line.split_whitespace();
    matches!(
        (words.next(), words.next()),
        (Some(create), Some(table))
            if create.eq_ignore_ascii_case("CREATE") && table.eq_ignore_ascii_case("TABLE")
    )
}

/// `3. Column: TotalPop` -> `(3, "TotalPop")`
fn column_entry(line: &str) -> Option<(usize, &str)> {
    let (number, rest) = line.split_once('.')?;
    let number = number.trim().parse::<usize>().ok()?;
    let name = rest.trim().strip_prefix("Column:")?;
    Some((number, name.trim()))
}

/// Table name named by a `CREATE TABLE` statement, without qualifiers or quoting
fn ddl_table_name(ddl: &str) -> Option<String> {
    let mut words = ddl.split_whitespace().skip(2).peekable();
    if words
        .peek()
        .is_some_and(|w| w.eq_ignore_ascii_case("IF"))
    {
        // IF NOT EXISTS
        words.nth(2);
    }
    let ident = words.next()?;
    let ident = ident.split('(').next()?.replace('`', "");
    ident
        .rsplit('.')
        .next()
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn check_ddl(source: &str, table: &str, columns: &[ColumnDescriptor], ddl: &str) -> Result<()> {
    match ddl_table_name(ddl) {
        Some(named) if named == table => {}
        Some(named) => {
            return Err(AssistantError::malformed(
                source,
                format!("DDL creates '{named}' but the document describes '{table}'"),
            ))
        }
        None => {
            return Err(AssistantError::malformed(
                source,
                "DDL statement does not name a table",
            ))
        }
    }

    let identifiers: HashSet<&str> = ddl
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(missing) = columns.iter().find(|c| !identifiers.contains(c.name.as_str())) {
        return Err(AssistantError::malformed(
            source,
            format!("column '{}' does not appear in the DDL", missing.name),
        ));
    }
    Ok(())
}
