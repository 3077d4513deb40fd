//! Bundle listing: filter parsing, the name predicate, and summary rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use stevedore_schema::{BundleId, BundleRef};

use crate::{Daemon, DaemonError};

/// Filter keys the lister understands.
const ACCEPTED_FILTERS: [&str; 3] = ["label", "before", "since"];

/// Parsed `key=value` filter arguments, grouped by key.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    entries: BTreeMap<String, Vec<String>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one filter term. Unknown keys are rejected up front so a typo
    /// fails loudly instead of silently matching everything.
    pub fn add(&mut self, key: &str, value: &str) -> Result<(), DaemonError> {
        if !ACCEPTED_FILTERS.contains(&key) {
            return Err(DaemonError::InvalidFilter(key.to_owned()));
        }
        self.entries
            .entry(key.to_owned())
            .or_default()
            .push(value.to_owned());
        Ok(())
    }

    /// Parse `key=value` terms as passed on a command line.
    pub fn parse(terms: &[String]) -> Result<Self, DaemonError> {
        let mut filters = Self::new();
        for term in terms {
            let Some((key, value)) = term.split_once('=') else {
                return Err(DaemonError::InvalidFilter(term.clone()));
            };
            filters.add(key, value)?;
        }
        Ok(filters)
    }

    fn values(&self, key: &str) -> &[String] {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }
}

/// One row of `bundle ls` output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BundleSummary {
    pub id: BundleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub services: usize,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
}

/// How a non-empty name filter constrains references.
enum NamePredicate {
    Any,
    /// `name:tag` input: a reference matches only on exact equality.
    TagExact(String),
    /// Bare pattern: matched against reference repository names as a shell
    /// glob.
    Glob(String),
}

impl NamePredicate {
    fn new(name_filter: &str) -> Self {
        if name_filter.is_empty() {
            return Self::Any;
        }
        match BundleRef::parse(name_filter) {
            Ok(reference) if reference.is_tagged() => Self::TagExact(reference.to_string()),
            _ => Self::Glob(name_filter.to_owned()),
        }
    }

    fn matches(&self, reference: &BundleRef) -> bool {
        match self {
            Self::Any => true,
            Self::TagExact(wanted) => reference.to_string() == *wanted,
            Self::Glob(pattern) => glob_match(pattern, reference.name()),
        }
    }
}

impl Daemon {
    /// List stored bundles, most recent first.
    ///
    /// `before`/`since` filter values resolve to stored bundles and exclude
    /// the boundary bundle itself. When a name filter is present, bundles
    /// with no matching reference are omitted entirely.
    pub fn list(
        &self,
        filters: &Filters,
        name_filter: &str,
    ) -> Result<Vec<BundleSummary>, DaemonError> {
        let mut before = None;
        for value in filters.values("before") {
            let (_, bundle) = self.get_bundle(value)?;
            before = Some(created_of(&bundle.created));
        }
        let mut since = None;
        for value in filters.values("since") {
            let (_, bundle) = self.get_bundle(value)?;
            since = Some(created_of(&bundle.created));
        }

        let predicate = NamePredicate::new(name_filter);
        let label_terms = filters.values("label");

        let mut rows = Vec::new();
        for (id, bundle) in self.bundles().map() {
            let created = created_of(&bundle.created);
            if before.is_some_and(|boundary| created >= boundary) {
                continue;
            }
            if since.is_some_and(|boundary| created <= boundary) {
                continue;
            }
            if !label_terms.iter().all(|term| label_matches(&bundle.labels, term)) {
                continue;
            }

            let mut repo_tags = Vec::new();
            let mut repo_digests = Vec::new();
            for reference in self.references().references(&id) {
                if !predicate.matches(&reference) {
                    continue;
                }
                if reference.is_canonical() {
                    repo_digests.push(reference.to_string());
                } else {
                    repo_tags.push(reference.to_string());
                }
            }
            if !matches!(predicate, NamePredicate::Any)
                && repo_tags.is_empty()
                && repo_digests.is_empty()
            {
                continue;
            }

            rows.push(BundleSummary {
                id,
                created: bundle.created,
                labels: bundle.labels,
                services: bundle.services.len(),
                repo_tags,
                repo_digests,
            });
        }

        rows.sort_by(|a, b| {
            created_of(&b.created)
                .cmp(&created_of(&a.created))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(rows)
    }
}

fn created_of(created: &Option<DateTime<Utc>>) -> DateTime<Utc> {
    created.unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// One `label` filter term: `key` requires presence, `key=value` requires
/// equality.
fn label_matches(labels: &BTreeMap<String, String>, term: &str) -> bool {
    match term.split_once('=') {
        Some((key, value)) => labels.get(key).is_some_and(|found| found == value),
        None => labels.contains_key(term),
    }
}

/// Shell-style glob match over repository names. `*` and `?` never cross a
/// `/`, `[a-z]` classes support `^` negation. A malformed class matches
/// nothing.
fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    glob_here(&pattern, &name)
}

fn glob_here(pattern: &[char], name: &[char]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some('*') => {
            // Try the shortest expansion first, growing one non-separator
            // character at a time.
            let rest = &pattern[1..];
            let mut skip = 0;
            loop {
                if glob_here(rest, &name[skip..]) {
                    return true;
                }
                if skip >= name.len() || name[skip] == '/' {
                    return false;
                }
                skip += 1;
            }
        }
        Some('?') => match name.first() {
            Some(&c) if c != '/' => glob_here(&pattern[1..], &name[1..]),
            _ => false,
        },
        Some('[') => {
            let Some(&c) = name.first() else { return false };
            let Some((matched, rest)) = class_match(&pattern[1..], c) else {
                return false;
            };
            matched && glob_here(rest, &name[1..])
        }
        Some(&p) => match name.first() {
            Some(&c) if c == p => glob_here(&pattern[1..], &name[1..]),
            _ => false,
        },
    }
}

/// Match `c` against a character class body (everything after `[`). Returns
/// the verdict and the pattern remainder after the closing `]`, or `None`
/// when the class never closes.
fn class_match(body: &[char], c: char) -> Option<(bool, &[char])> {
    let mut i = 0;
    let negated = body.first() == Some(&'^');
    if negated {
        i = 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < body.len() {
        if body[i] == ']' && !first {
            return Some((matched != negated, &body[i + 1..]));
        }
        first = false;
        if i + 2 < body.len() && body[i + 1] == '-' && body[i + 2] != ']' {
            if body[i] <= c && c <= body[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if body[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}
