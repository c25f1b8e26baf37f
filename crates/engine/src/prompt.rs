use catalog::{TableDetail, TableSummary};
use common::types::{ChatMessage, Row};
use common::utils::truncate_chars;
use minijinja::Environment;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;

static ENV: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env
});

pub(crate) fn render<S: Serialize>(template: &str, ctx: S) -> Result<String, minijinja::Error> {
    ENV.render_str(template, ctx)
}

pub(crate) const IDENTIFY: &str = r#"You select the database tables needed to answer a user's question.

Schema summary, one JSON object per table:
{{ summary }}
{% if omitted > 0 %}
Note: {{ omitted }} more tables were omitted from this summary to fit the prompt.
{% endif %}

How to read the table names:
- A table named <name>_y<year> (for example invoices_y2023) holds the rows of <name> for that year.
- A table ending in _details or _detail holds the line items of its parent table (order_details belongs to orders).
- has_data=false means the table is empty; prefer tables that have data.
{% for hint in hints %}
- {{ hint }}
{% endfor %}
{% if terms %}

Business terms and the tables that usually answer them:
{% for term in terms %}
- {{ term }}
{% endfor %}
{% endif %}

Reply with JSON only, in exactly this shape:
{"tables": ["table_name"], "reasoning": "one short sentence"}
Use only table names that appear in the summary. Include partitions and detail tables when the question needs them. Return an empty list when no table fits.
"#;

pub(crate) const GENERATE: &str = r#"You write one PostgreSQL query that answers the user's question.

All tables in the database:
{{ schema_block }}

Tables you may use, with their columns. These are the only columns that exist; do not invent others:
{{ column_block }}

Rules:
- Write exactly one read-only SELECT statement. Never modify data or schema.
- Use only the tables and columns listed above, with the names exactly as written.
- Tables named <name>_y<year> are yearly partitions of <name>. When the requested date range spans several years, combine the matching partitions with UNION ALL.
- End the statement with LIMIT {{ row_limit }} unless it returns a single aggregate row.
- Reply with the SQL only. No explanation.
"#;

pub(crate) const REPAIR: &str = r#"This PostgreSQL query failed.

Query:
{{ sql }}

Database error:
{{ error }}

These are the only columns that exist:
{% for table in tables %}
- {{ table.name }}: {{ table.columns | join(", ") }}
{% endfor %}

Rewrite the query so it uses only the columns above and still answers this question:
{{ question }}

Reply with the corrected SQL only. It must be a single read-only SELECT statement.
"#;

pub(crate) const REFINE_SYSTEM: &str =
    "You explain database query results to business users in plain language.";

pub(crate) const REFINE: &str = r#"Question: {{ question }}

SQL that was run:
{{ sql }}

Result: {{ row_count }} rows{% if shown < row_count %} (first {{ shown }} shown){% endif %}

{{ rows }}

Answer the question using only these results. Be concise, lead with the answer and mention the key figures.
"#;

/// Last `turns` messages of `history`, each cut to `max_chars`.
pub(crate) fn recent_history(history: &[ChatMessage], turns: usize, max_chars: usize) -> Vec<ChatMessage> {
    let skip = history.len().saturating_sub(turns);
    history[skip..]
        .iter()
        .map(|m| ChatMessage::new(m.role, truncate_chars(&m.content, max_chars)))
        .collect()
}

/// JSON array of as many leading summary entries as fit in `budget`
/// characters, and how many entries were left out. Whole entries are dropped
/// so the fragment stays valid JSON.
pub(crate) fn summary_fragment(summary: &[TableSummary], budget: usize) -> (String, usize) {
    let mut out = String::from("[");
    let mut included = 0;
    for entry in summary {
        let Ok(json) = serde_json::to_string(entry) else {
            break;
        };
        let separator = usize::from(included > 0);
        if out.len() + separator + json.len() + 1 > budget {
            break;
        }
        if separator == 1 {
            out.push(',');
        }
        out.push_str(&json);
        included += 1;
    }
    out.push(']');
    (out, summary.len() - included)
}

/// One line per table with the relationships the model should know about.
pub(crate) fn schema_block(summary: &[TableSummary]) -> String {
    let mut out = String::new();
    for table in summary {
        let _ = write!(out, "- {}", table.name);
        let mut notes = Vec::new();
        if !table.year_partitions.is_empty() {
            notes.push(format!("year partitions: {}", table.year_partitions.join(", ")));
        }
        if let Some(base) = &table.partition_of {
            notes.push(format!("partition of {base}"));
        }
        if let Some(related) = &table.related_table {
            notes.push(format!("related: {related}"));
        }
        if !table.has_data {
            notes.push("empty".to_string());
        }
        if !notes.is_empty() {
            let _ = write!(out, " ({})", notes.join("; "));
        }
        out.push('\n');
    }
    out
}

/// Full column listing of the chosen tables.
pub(crate) fn column_block(tables: &[TableDetail]) -> String {
    let mut out = String::new();
    for table in tables {
        let _ = writeln!(out, "Table {} (about {} rows)", table.name, table.row_count);
        for column in &table.columns {
            let _ = write!(out, "  - {} {}", column.name, column.data_type);
            if column.primary_key {
                out.push_str(" PRIMARY KEY");
            } else if !column.nullable {
                out.push_str(" NOT NULL");
            }
            out.push('\n');
        }
        if !table.foreign_keys.is_empty() {
            let fks: Vec<String> = table
                .foreign_keys
                .iter()
                .map(|fk| format!("{} -> {}.{}", fk.column, fk.references_table, fk.references_column))
                .collect();
            let _ = writeln!(out, "  foreign keys: {}", fks.join(", "));
        }
        if !table.indexes.is_empty() {
            let _ = writeln!(out, "  indexes: {}", table.indexes.join(", "));
        }
        for row in &table.sample_rows {
            let _ = writeln!(out, "  sample: {}", Value::Object(row.clone()));
        }
        out.push('\n');
    }
    out
}

/// Rows as JSON lines for the refine prompt.
pub(crate) fn rows_block(rows: &[Row]) -> String {
    rows.iter()
        .map(|r| Value::Object(r.clone()).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{Catalog, SchemaSnapshot, TableSchema};
    use std::sync::Arc;

    fn summaries(count: usize) -> Vec<TableSummary> {
        let tables = (0..count)
            .map(|i| TableSchema {
                name: format!("table_{i:02}"),
                columns: vec![],
                primary_keys: vec![],
                foreign_keys: vec![],
                row_count: 1,
                sample_data: vec![],
                indexes: vec![],
            })
            .collect();
        Catalog::new(Arc::new(SchemaSnapshot::new("db", tables))).summary()
    }

    #[test]
    fn fragment_keeps_everything_under_budget() {
        let (json, omitted) = summary_fragment(&summaries(3), 10_000);
        assert_eq!(omitted, 0);
        let parsed: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn fragment_drops_whole_trailing_entries() {
        let all = summaries(20);
        let one = serde_json::to_string(&all[0]).unwrap().len();
        let (json, omitted) = summary_fragment(&all, one * 5 + 10);
        let parsed: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len() + omitted, 20);
        assert!(omitted > 0);
        assert!(json.len() <= one * 5 + 10);
        assert_eq!(parsed[0]["name"], "table_00");
    }

    #[test]
    fn identify_prompt_mentions_omitted_tables() {
        let rendered = render(
            IDENTIFY,
            minijinja::context! { summary => "[]", omitted => 4, hints => Vec::<String>::new(), terms => Vec::<String>::new() },
        )
        .unwrap();
        assert!(rendered.contains("4 more tables were omitted"));
        assert!(rendered.contains(r#"{"tables": ["table_name"]"#));
    }

    #[test]
    fn history_keeps_latest_turns_truncated() {
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("second"),
            ChatMessage::user("x".repeat(100)),
        ];
        let recent = recent_history(&history, 2, 20);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "second");
        assert_eq!(recent[1].content.chars().count(), 20);
    }
}
