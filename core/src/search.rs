//! Multi-term scoring over the catalog.
//!
//! Every entry scores [`Score::None`], [`Score::Any`] or [`Score::All`]
//! against a term list. A subcommand is scored against its group's search
//! text followed by its own, so `["ru", "pin"]` scores `run ping` as ALL
//! while `run` alone scores ANY.

use crate::catalog::{Catalog, CatalogEntry, CommandGroup};
use crate::types::CommandDescriptor;

/// How well a term list matches one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Score {
    None,
    Any,
    All,
}

impl Score {
    pub fn is_match(self) -> bool {
        self >= Score::Any
    }
}

/// Drops blank terms and lower-cases the rest.
pub fn normalize_terms<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Scores normalized `terms` against `haystack` by case-insensitive
/// substring match. An empty term list scores ALL.
///
/// # Examples
///
/// ```
/// use toolbelt_core::search::{Score, score};
///
/// let terms = vec!["ru".to_string(), "pin".to_string()];
/// assert_eq!(score(&terms, "run"), Score::Any);
/// assert_eq!(score(&terms, "run ping"), Score::All);
/// assert_eq!(score(&terms, "sum"), Score::None);
/// assert_eq!(score(&[], "anything"), Score::All);
/// ```
pub fn score(terms: &[String], haystack: &str) -> Score {
    if terms.is_empty() {
        return Score::All;
    }
    let haystack = haystack.to_lowercase();
    let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    match hits {
        0 => Score::None,
        n if n == terms.len() => Score::All,
        _ => Score::Any,
    }
}

/// A visible command and its score.
#[derive(Debug, Clone, Copy)]
pub struct EntryMatch<'a> {
    pub entry: &'a CatalogEntry,
    pub score: Score,
}

/// A visible group with its visible children, sorted by name.
#[derive(Debug, Clone)]
pub struct GroupMatch<'a> {
    pub group: &'a CommandGroup,
    pub score: Score,
    pub children: Vec<EntryMatch<'a>>,
}

/// Command a search narrowed down to.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    TopLevel(&'a CatalogEntry),
    Grouped {
        group: &'a CommandGroup,
        entry: &'a CatalogEntry,
    },
}

impl<'a> Candidate<'a> {
    pub fn entry(&self) -> &'a CatalogEntry {
        match self {
            Self::TopLevel(entry) | Self::Grouped { entry, .. } => entry,
        }
    }

    pub fn group(&self) -> Option<&'a CommandGroup> {
        match self {
            Self::TopLevel(_) => None,
            Self::Grouped { group, .. } => Some(group),
        }
    }

    pub fn usage(&self, program: &str) -> String {
        self.entry()
            .descriptor
            .usage(program, self.group().map(CommandGroup::name))
    }
}

/// Filtered view of a catalog in render order.
#[derive(Debug, Clone, Default)]
pub struct SearchResult<'a> {
    pub groups: Vec<GroupMatch<'a>>,
    pub commands: Vec<EntryMatch<'a>>,
}

impl<'a> SearchResult<'a> {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.commands.is_empty()
    }

    /// Names of every visible entry, children as `group/name`.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for gm in &self.groups {
            names.push(gm.group.name().to_string());
            for child in &gm.children {
                names.push(format!("{}/{}", gm.group.name(), child.entry.name()));
            }
        }
        names.extend(self.commands.iter().map(|m| m.entry.name().to_string()));
        names
    }

    /// The auto-confirm candidate: exactly one top-level command and no
    /// groups, or exactly one group with exactly one visible child and no
    /// top-level commands.
    pub fn single_candidate(&self) -> Option<Candidate<'a>> {
        match (self.commands.as_slice(), self.groups.as_slice()) {
            ([only], []) => Some(Candidate::TopLevel(only.entry)),
            ([], [gm]) => match gm.children.as_slice() {
                [child] => Some(Candidate::Grouped {
                    group: gm.group,
                    entry: child.entry,
                }),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Visible entries always; hidden ones only when looked up by exact name.
fn is_listable(descriptor: &CommandDescriptor, terms: &[String]) -> bool {
    !descriptor.hidden || terms.iter().any(|term| descriptor.matches(term))
}

/// Read-only search over one catalog.
#[derive(Debug, Clone, Copy)]
pub struct SearchIndex<'a> {
    catalog: &'a Catalog,
}

impl<'a> SearchIndex<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Filters the catalog by `terms`.
    ///
    /// A child is listed when its group scores ALL, or when its own name
    /// and keywords match at least one term. A group is listed when it
    /// matches or has a listed child. Hidden entries are listed only when
    /// a term equals their name.
    pub fn search<S: AsRef<str>>(&self, terms: &[S]) -> SearchResult<'a> {
        let terms = normalize_terms(terms);

        let mut groups: Vec<GroupMatch<'a>> = self
            .catalog
            .groups()
            .filter(|group| is_listable(group.descriptor(), &terms))
            .filter_map(|group| self.match_group(group, &terms))
            .collect();
        groups.sort_by_key(|gm| gm.group.name().to_lowercase());

        let mut commands: Vec<EntryMatch<'a>> = self
            .catalog
            .commands()
            .iter()
            .filter(|entry| is_listable(&entry.descriptor, &terms))
            .map(|entry| EntryMatch {
                entry,
                score: score(&terms, &entry.descriptor.search_text()),
            })
            .filter(|m| m.score.is_match())
            .collect();
        commands.sort_by_key(|m| m.entry.name().to_lowercase());

        SearchResult { groups, commands }
    }

    fn match_group(&self, group: &'a CommandGroup, terms: &[String]) -> Option<GroupMatch<'a>> {
        let group_text = group.descriptor().search_text();
        let group_score = score(terms, &group_text);

        let mut children: Vec<EntryMatch<'a>> = group
            .sub_commands()
            .iter()
            .filter(|entry| is_listable(&entry.descriptor, terms))
            .filter_map(|entry| {
                let own = entry.descriptor.search_text();
                if group_score != Score::All && !score(terms, &own).is_match() {
                    return None;
                }
                Some(EntryMatch {
                    entry,
                    score: score(terms, &format!("{group_text} {own}")),
                })
            })
            .collect();
        children.sort_by_key(|m| m.entry.name().to_lowercase());

        (group_score.is_match() || !children.is_empty()).then_some(GroupMatch {
            group,
            score: group_score,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_laws() {
        let terms = normalize_terms(&["RU", " ", "pin"]);
        assert_eq!(terms, vec!["ru", "pin"]);
        assert_eq!(score(&terms, "Run"), Score::Any);
        assert_eq!(score(&terms, "run ping"), Score::All);
        assert_eq!(score(&terms, "sum"), Score::None);
    }

    #[test]
    fn test_blank_terms_score_everything() {
        let terms = normalize_terms(&["", "  "]);
        assert!(terms.is_empty());
        assert_eq!(score(&terms, "sum"), Score::All);
    }

    #[test]
    fn test_hidden_listed_only_by_exact_name() {
        let hidden = CommandDescriptor {
            hidden: true,
            ..CommandDescriptor::bare("debug")
        };
        assert!(is_listable(&hidden, &normalize_terms(&["DEBUG"])));
        assert!(is_listable(&hidden, &normalize_terms(&["zzz", "debug"])));
        assert!(!is_listable(&hidden, &normalize_terms(&["deb"])));
        assert!(!is_listable(&hidden, &[]));
        assert!(is_listable(&CommandDescriptor::bare("sum"), &[]));
    }

    #[test]
    fn test_score_ordering() {
        assert!(Score::All > Score::Any);
        assert!(Score::Any > Score::None);
        assert!(!Score::None.is_match());
    }
}
