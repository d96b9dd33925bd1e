use std::sync::OnceLock;

use regex::Regex;

/// Name of the only table generated queries may read.
pub const HISTORY_TABLE: &str = "history";

pub const FORBIDDEN_KEYWORDS: &[&str] = &["DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE"];

fn history_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(from|join)\s+["`\[]?history\b"#).expect("static regex")
    })
}

/// Why a candidate query was refused. The `Display` text is fed back to the
/// model verbatim, so it names the exact problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlRejection {
    #[error("query must start with SELECT")]
    NotSelect,
    #[error("query must select from history table")]
    MissingHistoryTable,
    #[error("query contains forbidden keyword: {0}")]
    ForbiddenKeyword(&'static str),
    #[error("query must be a single statement")]
    MultipleStatements,
}

/// A query that passed [`validate`]. Only this type reaches the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn validate(candidate: &str) -> Result<ValidatedSql, SqlRejection> {
    let trimmed = candidate.trim_start();
    let starts_with_select = trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"));
    if !starts_with_select {
        return Err(SqlRejection::NotSelect);
    }

    if !history_ref().is_match(trimmed) {
        return Err(SqlRejection::MissingHistoryTable);
    }

    // Plain substring match: `'%dropbox%'` is refused too.
    let upper = trimmed.to_ascii_uppercase();
    if let Some(&kw) = FORBIDDEN_KEYWORDS.iter().find(|kw| upper.contains(**kw)) {
        return Err(SqlRejection::ForbiddenKeyword(kw));
    }

    if has_trailing_statement(trimmed) {
        return Err(SqlRejection::MultipleStatements);
    }

    Ok(ValidatedSql(candidate.trim().trim_end_matches(';').trim_end().to_string()))
}

/// True when a `;` outside quotes is followed by anything but whitespace or
/// further semicolons.
fn has_trailing_statement(sql: &str) -> bool {
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                ';' => {
                    if sql[i..].chars().any(|c| c != ';' && !c.is_whitespace()) {
                        return true;
                    }
                }
                _ => {}
            },
        }
    }
    false
}
