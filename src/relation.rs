//! Foreign key relationships between tables
//!
//! Key column usage rows are turned into [`Relationship`] edges on the table
//! that gets the generated field. Which edges survive is decided by
//! [`RelationRules`], a matcher over `(table, column, ref_table, ref_column)`
//! keys with wildcard cells.

use crate::naming;
use crate::schema::KeyColumnUsage;
use crate::table::Table;
use heck::ToSnakeCase;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Cardinality of a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// The referencing column is unique
    OneToOne,
    /// Many referencing rows per referenced row
    OneToMany,
}

/// Which side of the foreign key owns the generated field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The table holding the foreign key points to the referenced row
    Forward,
    /// The referenced table points back to the referencing row(s)
    Reverse,
}

/// A relationship field on a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Column of the owning table
    pub column: String,
    /// The other table
    pub other_table: String,
    /// Column of the other table
    pub other_column: String,
    /// Cardinality of the underlying foreign key
    pub kind: RelationKind,
    /// Direction relative to the owning table
    pub direction: Direction,
    /// Name of the generated field
    pub field_name: String,
}

impl Relationship {
    /// Whether the field holds a collection of the other table
    pub fn is_collection(&self) -> bool {
        self.direction == Direction::Reverse && self.kind == RelationKind::OneToMany
    }

    /// Short label used in doc comments, e.g. `1:M` or `reversed 1:1`
    pub fn label(&self) -> String {
        let card = match (self.direction, self.kind) {
            (Direction::Forward, RelationKind::OneToOne) => "1:1",
            (Direction::Forward, RelationKind::OneToMany) => "M:1",
            (Direction::Reverse, RelationKind::OneToOne) => "reversed 1:1",
            (Direction::Reverse, RelationKind::OneToMany) => "reversed 1:M",
        };
        card.to_string()
    }
}

/// An edge as seen from the table that owns the field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge<'a> {
    /// Owning table
    pub table: &'a str,
    /// Column of the owning table
    pub column: &'a str,
    /// Other table
    pub ref_table: &'a str,
    /// Column of the other table
    pub ref_column: &'a str,
}

impl fmt::Display for Edge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} => {}.{}",
            self.table, self.column, self.ref_table, self.ref_column
        )
    }
}

/// A rule key, `None` cells are wildcards
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey {
    table: String,
    column: Option<String>,
    ref_table: Option<String>,
    ref_column: Option<String>,
}

impl RuleKey {
    fn parse(left: &str, right: &str) -> Self {
        let (table, column) = split_pair(left);
        let (ref_table, ref_column) = split_pair(right);
        RuleKey {
            table: table.unwrap_or("*").to_string(),
            column: column.map(str::to_string),
            ref_table: ref_table.map(str::to_string),
            ref_column: ref_column.map(str::to_string),
        }
    }

    /// Whether any edge can match this key
    ///
    /// The owning table is never a wildcard and a concrete cell may only
    /// follow concrete cells.
    fn is_matchable(&self) -> bool {
        if self.table == "*" {
            return false;
        }
        let cells = [&self.column, &self.ref_table, &self.ref_column];
        cells
            .windows(2)
            .all(|w| w[0].is_some() || w[1].is_none())
    }

    /// The four keys an edge is looked up with, most general first
    fn lookups(edge: &Edge<'_>) -> [RuleKey; 4] {
        let table = edge.table.to_string();
        let column = Some(edge.column.to_string());
        let ref_table = Some(edge.ref_table.to_string());
        [
            RuleKey {
                table: table.clone(),
                column: None,
                ref_table: None,
                ref_column: None,
            },
            RuleKey {
                table: table.clone(),
                column: column.clone(),
                ref_table: None,
                ref_column: None,
            },
            RuleKey {
                table: table.clone(),
                column: column.clone(),
                ref_table: ref_table.clone(),
                ref_column: None,
            },
            RuleKey {
                table,
                column,
                ref_table,
                ref_column: Some(edge.ref_column.to_string()),
            },
        ]
    }
}

/// Split `table.column`, mapping `*` cells to `None`
fn split_pair(s: &str) -> (Option<&str>, Option<&str>) {
    fn cell(v: &str) -> Option<&str> {
        if v == "*" || v.is_empty() {
            None
        } else {
            Some(v)
        }
    }
    let (table, column) = s.split_once('.').unwrap_or((s, "*"));
    (cell(table), cell(column))
}

/// Include and exclude rules for relationship edges
///
/// Rules come in pairs, `"table.column", "ref_table.ref_column"`, each cell
/// possibly `*`. An edge matches a rule at one of four specificity levels:
/// `t.*.*.*`, `t.c.*.*`, `t.c.rt.*` and `t.c.rt.rc`. The table cell of the
/// owning side is never a wildcard, which makes the rules direction
/// sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationRules {
    include: Option<HashSet<RuleKey>>,
    exclude: HashSet<RuleKey>,
}

impl RelationRules {
    /// Build rules from flat pair lists
    ///
    /// # Panics
    ///
    /// Panics when either list has an odd length.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        RelationRules {
            include: if include.is_empty() {
                None
            } else {
                Some(Self::parse_list("include", include))
            },
            exclude: Self::parse_list("exclude", exclude),
        }
    }

    fn parse_list<S: AsRef<str>>(what: &str, list: &[S]) -> HashSet<RuleKey> {
        if list.len() % 2 == 1 {
            panic!(
                "{} relationship list must be balanced (table.column, ref_table.ref_column), got {} entries",
                what,
                list.len()
            );
        }
        list.chunks(2)
            .filter_map(|pair| {
                let (left, right) = (pair[0].as_ref(), pair[1].as_ref());
                let key = RuleKey::parse(left, right);
                if key.is_matchable() {
                    Some(key)
                } else {
                    tracing::warn!(
                        rule = %format_args!("{}, {}", left, right),
                        "{} relationship rule can never match, ignoring",
                        what
                    );
                    None
                }
            })
            .collect()
    }

    /// Whether no rule is configured at all
    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_empty()
    }

    /// Decide whether an edge is kept
    pub fn is_allowed(&self, edge: &Edge<'_>) -> bool {
        if self.is_empty() {
            return true;
        }
        let lookups = RuleKey::lookups(edge);
        if lookups.iter().any(|k| self.exclude.contains(k)) {
            return false;
        }
        match &self.include {
            None => true,
            Some(include) => lookups.iter().any(|k| include.contains(k)),
        }
    }
}

/// Foreign keys split by owning side
#[derive(Debug, Clone, Default)]
pub struct KeyUsage {
    /// table -> rows where the table holds the foreign key
    pub forward: BTreeMap<String, Vec<KeyColumnUsage>>,
    /// referenced table -> rows pointing at it
    pub reverse: BTreeMap<String, Vec<KeyColumnUsage>>,
}

impl KeyUsage {
    /// Index rows by both sides
    pub fn new(rows: &[KeyColumnUsage]) -> Self {
        let mut usage = KeyUsage::default();
        for row in rows {
            usage
                .forward
                .entry(row.table_name.clone())
                .or_default()
                .push(row.clone());
            usage
                .reverse
                .entry(row.referenced_table_name.clone())
                .or_default()
                .push(row.clone());
        }
        usage
    }
}

/// Classify a foreign key by the uniqueness of its referencing column
pub fn classify(referencing: &Table, column: &str) -> RelationKind {
    if referencing.is_unique_column(column) {
        RelationKind::OneToOne
    } else {
        RelationKind::OneToMany
    }
}

/// Compute the relationship fields of one table
///
/// Rows whose other side is not among `tables` are skipped, as are edges
/// the rules reject.
pub fn resolve(
    table_name: &str,
    tables: &HashMap<String, Table>,
    usage: &KeyUsage,
    rules: &RelationRules,
) -> Vec<Relationship> {
    let Some(table) = tables.get(table_name) else {
        return Vec::new();
    };
    let mut used: HashSet<String> = table
        .columns
        .iter()
        .map(|c| naming::field_name(&c.field))
        .collect();
    let mut out = Vec::new();

    for row in usage.forward.get(table_name).into_iter().flatten() {
        let edge = Edge {
            table: table_name,
            column: &row.column_name,
            ref_table: &row.referenced_table_name,
            ref_column: &row.referenced_column_name,
        };
        if !tables.contains_key(edge.ref_table) {
            tracing::debug!(%edge, "referenced table not loaded, skipping relationship");
            continue;
        }
        if !rules.is_allowed(&edge) {
            tracing::debug!(%edge, "relationship excluded");
            continue;
        }
        let kind = classify(table, &row.column_name);
        let name = unique_field_name(&mut used, edge.ref_table.to_snake_case(), edge.column);
        out.push(Relationship {
            column: row.column_name.clone(),
            other_table: row.referenced_table_name.clone(),
            other_column: row.referenced_column_name.clone(),
            kind,
            direction: Direction::Forward,
            field_name: name,
        });
    }

    for row in usage.reverse.get(table_name).into_iter().flatten() {
        let edge = Edge {
            table: table_name,
            column: &row.referenced_column_name,
            ref_table: &row.table_name,
            ref_column: &row.column_name,
        };
        let Some(referencing) = tables.get(edge.ref_table) else {
            tracing::debug!(%edge, "referencing table not loaded, skipping relationship");
            continue;
        };
        if !rules.is_allowed(&edge) {
            tracing::debug!(%edge, "relationship excluded");
            continue;
        }
        let kind = classify(referencing, &row.column_name);
        let base = match kind {
            RelationKind::OneToOne => edge.ref_table.to_snake_case(),
            RelationKind::OneToMany => naming::collection_name(edge.ref_table).to_snake_case(),
        };
        let name = unique_field_name(&mut used, base, edge.ref_column);
        out.push(Relationship {
            column: row.referenced_column_name.clone(),
            other_table: row.table_name.clone(),
            other_column: row.column_name.clone(),
            kind,
            direction: Direction::Reverse,
            field_name: name,
        });
    }

    out
}

fn unique_field_name(used: &mut HashSet<String>, base: String, column: &str) -> String {
    let mut name = naming::field_name(&base);
    if used.contains(&name) {
        name = naming::field_name(&format!("{}_by_{}", base, column));
    }
    let mut n = 2;
    let stem = name.clone();
    while used.contains(&name) {
        name = format!("{}_{}", stem, n);
        n += 1;
    }
    used.insert(name.clone());
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn edge<'a>(t: &'a str, c: &'a str, rt: &'a str, rc: &'a str) -> Edge<'a> {
        Edge {
            table: t,
            column: c,
            ref_table: rt,
            ref_column: rc,
        }
    }

    #[test]
    fn test_no_rules_allow_everything() {
        let rules = RelationRules::default();
        assert!(rules.is_allowed(&edge("a", "b", "c", "d")));
    }

    #[test]
    fn test_table_wildcard_excludes_every_edge_of_table() {
        let rules = RelationRules::new(&[] as &[&str], &["athlete_team_member.*", "*.*"]);
        assert!(!rules.is_allowed(&edge(
            "athlete_team_member",
            "athlete_id",
            "athlete",
            "athlete_id"
        )));
        assert!(!rules.is_allowed(&edge(
            "athlete_team_member",
            "team_id",
            "athlete_team",
            "team_id"
        )));
        // The rule does not cover the owning side `athlete`
        assert!(rules.is_allowed(&edge(
            "athlete",
            "athlete_id",
            "athlete_team_member",
            "athlete_id"
        )));
    }

    #[test]
    fn test_specificity_levels() {
        let rules = RelationRules::new(
            &[] as &[&str],
            &[
                "a.x", "*.*", // t.c.*.*
                "b.y", "c.*", // t.c.rt.*
                "d.z", "e.w", // t.c.rt.rc
            ],
        );
        assert!(!rules.is_allowed(&edge("a", "x", "q", "q")));
        assert!(rules.is_allowed(&edge("a", "other", "q", "q")));
        assert!(!rules.is_allowed(&edge("b", "y", "c", "anything")));
        assert!(rules.is_allowed(&edge("b", "y", "other", "anything")));
        assert!(!rules.is_allowed(&edge("d", "z", "e", "w")));
        assert!(rules.is_allowed(&edge("d", "z", "e", "v")));
    }

    #[test]
    fn test_wildcard_owner_never_matches() {
        let rules = RelationRules::new(&[] as &[&str], &["*.*", "athlete.athlete_id"]);
        assert!(rules.is_allowed(&edge(
            "athlete_team_member",
            "athlete_id",
            "athlete",
            "athlete_id"
        )));
    }

    #[test]
    fn test_unmatchable_rules_are_dropped() {
        assert!(!RuleKey::parse("a.*", "c.d").is_matchable());
        assert!(!RuleKey::parse("a.*", "c.*").is_matchable());
        assert!(!RuleKey::parse("a.b", "*.d").is_matchable());
        assert!(!RuleKey::parse("*.b", "c.d").is_matchable());
        assert!(RuleKey::parse("a.*", "*.*").is_matchable());
        assert!(RuleKey::parse("a.b", "c.*").is_matchable());
        assert!(RuleKey::parse("a.b", "c.d").is_matchable());

        // An include list of only unmatchable rules keeps nothing
        let rules = RelationRules::new(&["a.*", "c.d"], &["a.*", "c.d"]);
        assert!(rules.exclude.is_empty());
        assert!(!rules.is_allowed(&edge("a", "b", "c", "d")));
    }

    #[test]
    fn test_include_requires_a_match() {
        let rules = RelationRules::new(&["customer_entity.*", "*.*"], &[]);
        assert!(rules.is_allowed(&edge("customer_entity", "entity_id", "x", "y")));
        assert!(!rules.is_allowed(&edge("store", "store_id", "x", "y")));
    }

    #[test]
    fn test_exclude_beats_include() {
        let rules = RelationRules::new(
            &["customer_entity.*", "*.*"],
            &["customer_entity.website_id", "store_website.website_id"],
        );
        assert!(!rules.is_allowed(&edge(
            "customer_entity",
            "website_id",
            "store_website",
            "website_id"
        )));
        assert!(rules.is_allowed(&edge(
            "customer_entity",
            "store_id",
            "store",
            "store_id"
        )));
    }

    #[test]
    #[should_panic(expected = "balanced")]
    fn test_unbalanced_rules_panic() {
        RelationRules::new(&["a.b"], &[]);
    }

    fn tables() -> HashMap<String, Table> {
        let mut m = HashMap::new();
        m.insert(
            "customer_entity".to_string(),
            Table::new(
                "customer_entity",
                vec![Column::new("entity_id", "int").primary().auto_increment()],
            ),
        );
        m.insert(
            "customer_address_entity".to_string(),
            Table::new(
                "customer_address_entity",
                vec![
                    Column::new("entity_id", "int").primary().auto_increment(),
                    Column::new("parent_id", "int").indexed(),
                ],
            ),
        );
        m.insert(
            "customer_profile".to_string(),
            Table::new(
                "customer_profile",
                vec![Column::new("customer_id", "int").unique()],
            ),
        );
        m
    }

    fn usage() -> KeyUsage {
        KeyUsage::new(&[
            KeyColumnUsage::new(
                "customer_address_entity",
                "parent_id",
                "customer_entity",
                "entity_id",
            ),
            KeyColumnUsage::new("customer_profile", "customer_id", "customer_entity", "entity_id"),
            KeyColumnUsage::new("customer_entity", "website_id", "store_website", "website_id"),
        ])
    }

    #[test]
    fn test_resolve_forward_and_reverse() {
        let tables = tables();
        let rels = resolve(
            "customer_entity",
            &tables,
            &usage(),
            &RelationRules::default(),
        );
        // store_website is not loaded
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].field_name, "customer_address_entities");
        assert!(rels[0].is_collection());
        assert_eq!(rels[0].label(), "reversed 1:M");
        assert_eq!(rels[1].field_name, "customer_profile");
        assert_eq!(rels[1].kind, RelationKind::OneToOne);
        assert!(!rels[1].is_collection());

        let rels = resolve(
            "customer_address_entity",
            &tables,
            &usage(),
            &RelationRules::default(),
        );
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].direction, Direction::Forward);
        assert_eq!(rels[0].field_name, "customer_entity");
        assert_eq!(rels[0].label(), "M:1");
    }

    #[test]
    fn test_resolve_field_name_clash() {
        let mut tables = tables();
        tables.insert(
            "pair".to_string(),
            Table::new(
                "pair",
                vec![
                    Column::new("left_id", "int"),
                    Column::new("right_id", "int"),
                ],
            ),
        );
        let usage = KeyUsage::new(&[
            KeyColumnUsage::new("pair", "left_id", "customer_entity", "entity_id"),
            KeyColumnUsage::new("pair", "right_id", "customer_entity", "entity_id"),
        ]);
        let rels = resolve("pair", &tables, &usage, &RelationRules::default());
        let names: Vec<_> = rels.iter().map(|r| r.field_name.as_str()).collect();
        assert_eq!(names, vec!["customer_entity", "customer_entity_by_right_id"]);
    }
}
