use std::collections::HashSet;

use rusqlite::types::Value;
use serde::Deserialize;

use crate::db::placeholders;

pub const DEFAULT_LIMIT: i64 = 15;

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

/// List parameters exactly as a client sends them. Nothing here is trusted:
/// malformed numbers fall back to "no filter" rather than failing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub last_order: Option<String>,
    pub id: Option<String>,
    pub q: Option<String>,
    pub tags: Option<String>,
    pub archived: Option<String>,
    pub limit: Option<String>,
}

/// Normalised list filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteFilter {
    /// Exclusive upper bound on `sort_order` for the next page.
    pub last_order: Option<i64>,
    /// Direct lookup; overrides every other filter.
    pub id: Option<i64>,
    /// Trimmed free-text query, never empty when present.
    pub query: Option<String>,
    /// Lowercased, de-duplicated tag names.
    pub tags: Vec<String>,
    pub archived: bool,
    pub limit: i64,
}

impl Default for NoteFilter {
    fn default() -> Self {
        Self {
            last_order: None,
            id: None,
            query: None,
            tags: Vec::new(),
            archived: false,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl NoteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: &ListParams) -> Self {
        Self::default()
            .after(parse_number(params.last_order.as_deref()))
            .id(parse_number(params.id.as_deref()))
            .query(params.q.as_deref().unwrap_or(""))
            .tags(params.tags.as_deref().unwrap_or(""))
            .archived(matches!(
                params.archived.as_deref().map(str::trim),
                Some("1") | Some("true")
            ))
            .limit(parse_number(params.limit.as_deref()))
    }

    /// Cursor; zero or negative means "first page".
    pub fn after(mut self, last_order: i64) -> Self {
        self.last_order = (last_order > 0).then_some(last_order);
        self
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = (id > 0).then_some(id);
        self
    }

    pub fn query(mut self, q: &str) -> Self {
        let q = q.trim();
        self.query = (!q.is_empty()).then(|| q.to_string());
        self
    }

    /// Comma-separated tag list.
    pub fn tags(mut self, tags: &str) -> Self {
        self.tags = parse_tag_list(tags);
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = if limit > 0 { limit } else { DEFAULT_LIMIT };
        self
    }

    /// Compile into a single predicate, its positional arguments, and a limit.
    pub fn compile(&self) -> CompiledFilter {
        let mut predicate = Predicate::default();

        if let Some(id) = self.id {
            predicate.push("id = ?", vec![Value::Integer(id)]);
            return CompiledFilter::new(predicate, self.limit);
        }

        if let Some(cursor) = self.last_order {
            predicate.push("sort_order < ?", vec![Value::Integer(cursor)]);
        }

        if let Some(q) = &self.query {
            for token in q.split_whitespace() {
                let (clause, args) = token_clause(token);
                predicate.push(clause, args);
            }
        }

        if !self.tags.is_empty() {
            let sql = format!(
                "id IN (
                    SELECT nt.note_id FROM note_tags nt
                    JOIN tags t ON t.id = nt.tag_id
                    WHERE t.name IN ({})
                    GROUP BY nt.note_id
                    HAVING COUNT(DISTINCT t.name) = ?
                )",
                placeholders(self.tags.len())
            );
            let mut args: Vec<Value> = self.tags.iter().cloned().map(Value::Text).collect();
            args.push(Value::Integer(self.tags.len() as i64));
            predicate.push(sql, args);
        }

        // Searches look everywhere; plain browsing is split by archive state.
        if self.query.is_none() && self.tags.is_empty() {
            let flag = if self.archived { 1 } else { 0 };
            predicate.push("is_archived = ?", vec![Value::Integer(flag)]);
        }

        CompiledFilter::new(predicate, self.limit)
    }
}

/// Lowercase a search token and turn it into a LIKE pattern. A token with `*`
/// is used verbatim with `*` as the wildcard; otherwise it matches anywhere.
pub fn like_pattern(token: &str) -> String {
    let lower = token.to_lowercase();
    if lower.contains('*') {
        lower.replace('*', "%")
    } else {
        format!("%{lower}%")
    }
}

/// Characters after which a wildcard token may start matching.
const WORD_SEPARATORS: [char; 4] = [' ', '\n', '\t', '\r'];

/// One clause per search token. Plain tokens match anywhere. Wildcard tokens
/// are anchored at the start of a word: the start of the content or right
/// after one of [`WORD_SEPARATORS`], so `wor*` finds "hello world".
fn token_clause(token: &str) -> (String, Vec<Value>) {
    let pattern = like_pattern(token);
    if !token.contains('*') {
        return ("content_lower LIKE ?".to_string(), vec![Value::Text(pattern)]);
    }
    let mut args: Vec<Value> = WORD_SEPARATORS
        .iter()
        .map(|sep| Value::Text(format!("%{sep}{pattern}")))
        .collect();
    args.push(Value::Text(pattern));
    let ors = vec!["content_lower LIKE ?"; args.len()].join(" OR ");
    (format!("({ors})"), args)
}

/// Split, trim, lowercase and de-duplicate a comma-separated tag list,
/// dropping empty entries.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn parse_number(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Predicate builder
// ---------------------------------------------------------------------------

/// Ordered list of clause templates with their bound arguments, joined with
/// AND. An empty predicate produces no WHERE clause at all.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    clauses: Vec<(String, Vec<Value>)>,
}

impl Predicate {
    pub fn push(&mut self, clause: impl Into<String>, args: Vec<Value>) {
        self.clauses.push((clause.into(), args));
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    fn where_sql(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let joined: Vec<&str> = self.clauses.iter().map(|(c, _)| c.as_str()).collect();
        format!("WHERE {}", joined.join(" AND "))
    }

    fn into_args(self) -> Vec<Value> {
        self.clauses.into_iter().flat_map(|(_, args)| args).collect()
    }
}

/// Output of [`NoteFilter::compile`].
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub where_sql: String,
    pub args: Vec<Value>,
    pub clause_count: usize,
    pub limit: i64,
}

impl CompiledFilter {
    fn new(predicate: Predicate, limit: i64) -> Self {
        Self {
            where_sql: predicate.where_sql(),
            clause_count: predicate.len(),
            args: predicate.into_args(),
            limit,
        }
    }

    /// Full SELECT over `notes`, newest `sort_order` first. The limit is the
    /// last positional argument; see [`CompiledFilter::query_args`].
    pub fn select_sql(&self, columns: &str) -> String {
        format!(
            "SELECT {columns} FROM notes {} ORDER BY sort_order DESC LIMIT ?",
            self.where_sql
        )
    }

    pub fn query_args(&self) -> Vec<Value> {
        let mut args = self.args.clone();
        args.push(Value::Integer(self.limit));
        args
    }
}
