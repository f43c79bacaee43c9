//! Translation of subscription filters into bounded, injection-safe SQL.
//!
//! Each call is a pure function of the filter: validate every populated
//! criterion, map the survivors to predicate fragments, join them with `AND`,
//! and append a fixed ordering and result cap. Hex-sanitized id/author lists
//! and integer kind lists are embedded literally (their post-sanitization
//! alphabet makes that safe); free-form tag values and timestamps are always
//! bound as parameters.

use crate::filter::Filter;

/// Policy caps applied while translating a filter.
///
/// The values carry no documented derivation; they are operational guards
/// against unreasonably expensive queries, kept configurable rather than
/// hard-coded.
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Maximum candidate ids before the filter is dropped outright.
    pub max_ids: usize,
    /// Maximum candidate authors before the filter is dropped outright.
    pub max_authors: usize,
    /// Maximum distinct kinds.
    pub max_kinds: usize,
    /// Maximum tag values, counted across all tag names.
    pub max_tag_values: usize,
    /// Result row cap appended to every query.
    pub limit: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_ids: 500,
            max_authors: 500,
            max_kinds: 10,
            max_tag_values: 10,
            limit: 100,
        }
    }
}

/// A value bound to a `?` placeholder in the generated query.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Int(i64),
}

/// A predicate fragment plus the values bound to its placeholders, built per
/// criterion and consumed by the assembler within a single translation.
struct Condition {
    sql: String,
    params: Vec<Param>,
}

impl Condition {
    fn literal(sql: String) -> Self {
        Self {
            sql,
            params: vec![],
        }
    }
}

/// Outcome of translating a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// A structural check proved no rows can match (cardinality cap exceeded,
    /// or a criterion explicitly present but empty). The store must not be
    /// consulted; the caller observes an ordinary empty result.
    Unsatisfiable,
    /// Execute `sql` with `params` bound in placeholder order.
    Query { sql: String, params: Vec<Param> },
}

/// Translate `filter` into a [`Plan`] under the given caps.
///
/// Conditions are emitted in a fixed order (ids, authors, kinds, tags, since,
/// until) so the generated text is stable for a given filter and friendly to
/// the store's plan cache. An empty filter matches everything up to the row
/// cap. Placeholders use `?`; see [`rebind`] for the Postgres convention.
pub fn plan(filter: &Filter, limits: &Limits) -> Plan {
    let mut conditions: Vec<Condition> = vec![];

    if let Some(ids) = &filter.ids {
        if ids.len() > limits.max_ids {
            // too many ids, fail everything
            return Plan::Unsatisfiable;
        }
        let inids = sanitize_hex32(ids);
        if inids.is_empty() {
            // ids being [] means you won't get anything
            return Plan::Unsatisfiable;
        }
        conditions.push(Condition::literal(format!("id IN ({})", quote_join(&inids))));
    }

    if let Some(authors) = &filter.authors {
        if authors.len() > limits.max_authors {
            return Plan::Unsatisfiable;
        }
        let inkeys = sanitize_hex32(authors);
        if inkeys.is_empty() {
            return Plan::Unsatisfiable;
        }
        conditions.push(Condition::literal(format!(
            "pubkey IN ({})",
            quote_join(&inkeys)
        )));
    }

    if let Some(kinds) = &filter.kinds {
        if kinds.len() > limits.max_kinds {
            return Plan::Unsatisfiable;
        }
        if kinds.is_empty() {
            // kinds being [] means you won't get anything
            return Plan::Unsatisfiable;
        }
        // integer formatting only, so literal embedding is safe
        let inkinds: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
        conditions.push(Condition::literal(format!(
            "kind IN ({})",
            inkinds.join(",")
        )));
    }

    let mut tag_values: Vec<String> = vec![];
    for values in filter.tags.values() {
        if values.is_empty() {
            // any tag criterion set to [] matches nothing
            return Plan::Unsatisfiable;
        }
        tag_values.extend(values.iter().cloned());
        if tag_values.len() > limits.max_tag_values {
            return Plan::Unsatisfiable;
        }
    }
    if !tag_values.is_empty() {
        // One overlap predicate over the flat value index: the store indexes
        // tag values without their names, an intentional precision tradeoff.
        // Values are arbitrary strings and must always be bound, never
        // embedded.
        let placeholders = vec!["?"; tag_values.len()].join(",");
        conditions.push(Condition {
            sql: format!("tagvalues && ARRAY[{placeholders}]"),
            params: tag_values.into_iter().map(Param::Text).collect(),
        });
    }

    if let Some(since) = filter.since {
        conditions.push(Condition {
            sql: "created_at > ?".into(),
            params: vec![Param::Int(since)],
        });
    }
    if let Some(until) = filter.until {
        conditions.push(Condition {
            sql: "created_at < ?".into(),
            params: vec![Param::Int(until)],
        });
    }

    // Assemble: AND-join with an always-true fallback, deterministic
    // ordering, and the row cap.
    let mut predicate: Vec<String> = vec![];
    let mut params: Vec<Param> = vec![];
    for c in conditions {
        predicate.push(c.sql);
        params.extend(c.params);
    }
    if predicate.is_empty() {
        predicate.push("true".into());
    }
    let sql = format!(
        "SELECT id, pubkey, created_at, kind, tags, content, sig FROM event \
         WHERE {} ORDER BY created_at LIMIT {}",
        predicate.join(" AND "),
        limits.limit
    );
    Plan::Query { sql, params }
}

/// Decode each candidate as hex, keep only exact 32-byte values, and
/// re-encode them to canonical lowercase hex.
///
/// The round-trip restricts the output alphabet to hex digits, which is what
/// makes literal embedding of the survivors injection-safe.
fn sanitize_hex32(candidates: &[String]) -> Vec<String> {
    candidates
        .iter()
        .filter_map(|c| {
            let raw = hex::decode(c).ok()?;
            (raw.len() == 32).then(|| hex::encode(raw))
        })
        .collect()
}

/// Join pre-sanitized values as a quoted SQL list: `'aa','bb'`.
fn quote_join(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Rewrite `?` placeholders to the numbered `$1..$n` convention Postgres
/// expects, leaving quoted literals untouched.
pub fn rebind(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    let mut in_str = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_str = !in_str;
                out.push(ch);
            }
            '?' if !in_str => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}
