//! Randomized, schema-aware SQL synthesis.
//!
//! Output is a pure function of the table list and the RNG state, so a fixed
//! seed replays the same statement sequence.
//!
//! Identifiers are wrapped in backticks exactly as the server reported them.
//! Nothing is escaped or validated: a table called ``we`ird`` yields a broken
//! statement, and the server is expected to reject it cleanly.

use std::fmt;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::schema::TableSchema;

/// Schema-independent statements
pub const GENERIC_QUERIES: [&str; 4] = [
    "SELECT 1",
    "SELECT VERSION()",
    "SELECT NOW()",
    "SHOW TABLES",
];

pub const DEFAULT_GENERIC_RATIO: f64 = 0.2;
pub const DEFAULT_MAX_LIMIT: u32 = 10;
pub const DEFAULT_MAX_COLUMNS: usize = 3;

/// Alias of the aggregate in COUNT queries
pub const COUNT_ALIAS: &str = "count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    Generic,
    SelectAll,
    SelectCols,
    Count,
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryShape::Generic => "GENERIC",
            QueryShape::SelectAll => "SELECT_ALL",
            QueryShape::SelectCols => "SELECT_COLS",
            QueryShape::Count => "COUNT",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuery {
    pub shape: QueryShape,
    pub sql: String,
}

impl fmt::Display for GeneratedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Generation policy.
#[derive(Debug, Clone)]
pub struct QuerySynthesizer {
    generic_ratio: f64,
    max_limit: u32,
    max_columns: usize,
}

impl Default for QuerySynthesizer {
    fn default() -> Self {
        Self {
            generic_ratio: DEFAULT_GENERIC_RATIO,
            max_limit: DEFAULT_MAX_LIMIT,
            max_columns: DEFAULT_MAX_COLUMNS,
        }
    }
}

impl QuerySynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probability of drawing from the generic pool when tables exist
    pub fn generic_ratio(mut self, ratio: f64) -> Self {
        self.generic_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Upper bound of the `LIMIT` literal (lower bound is always 1)
    pub fn max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    /// Most columns a SELECT_COLS statement lists
    pub fn max_columns(mut self, max_columns: usize) -> Self {
        self.max_columns = max_columns.max(1);
        self
    }

    pub fn generate<R: Rng>(&self, tables: &[TableSchema], rng: &mut R) -> String {
        self.synthesize(tables, rng).sql
    }

    pub fn synthesize<R: Rng>(&self, tables: &[TableSchema], rng: &mut R) -> GeneratedQuery {
        if tables.is_empty() || rng.random::<f64>() < self.generic_ratio {
            return self.generic(rng);
        }

        let Some(table) = tables.choose(rng) else {
            return self.generic(rng);
        };

        match rng.random_range(0..3) {
            0 => self.select_all(table, rng),
            1 => self.select_cols(table, rng),
            _ => self.count(table),
        }
    }

    fn generic<R: Rng>(&self, rng: &mut R) -> GeneratedQuery {
        GeneratedQuery {
            shape: QueryShape::Generic,
            sql: GENERIC_QUERIES[rng.random_range(0..GENERIC_QUERIES.len())].to_string(),
        }
    }

    fn select_all<R: Rng>(&self, table: &TableSchema, rng: &mut R) -> GeneratedQuery {
        GeneratedQuery {
            shape: QueryShape::SelectAll,
            sql: format!(
                "SELECT * FROM {} LIMIT {}",
                quote(&table.name),
                self.limit(rng)
            ),
        }
    }

    fn select_cols<R: Rng>(&self, table: &TableSchema, rng: &mut R) -> GeneratedQuery {
        // Nothing to pick from once every column was dropped during discovery.
        if table.columns.is_empty() {
            return self.select_all(table, rng);
        }

        let upper = self.max_columns.min(table.columns.len());
        let amount = rng.random_range(1..=upper);
        let columns = table
            .columns
            .choose_multiple(rng, amount)
            .map(|column| quote(&column.name))
            .collect::<Vec<_>>()
            .join(", ");

        GeneratedQuery {
            shape: QueryShape::SelectCols,
            sql: format!(
                "SELECT {columns} FROM {} LIMIT {}",
                quote(&table.name),
                self.limit(rng)
            ),
        }
    }

    fn count(&self, table: &TableSchema) -> GeneratedQuery {
        GeneratedQuery {
            shape: QueryShape::Count,
            sql: format!(
                "SELECT COUNT(*) as {COUNT_ALIAS} FROM {}",
                quote(&table.name)
            ),
        }
    }

    fn limit<R: Rng>(&self, rng: &mut R) -> u32 {
        rng.random_range(1..=self.max_limit)
    }
}

fn quote(identifier: &str) -> String {
    format!("`{identifier}`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn catalog() -> Vec<TableSchema> {
        vec![
            TableSchema::new("users", ["id", "email", "created_at", "name"]),
            TableSchema::new("order", ["select", "from"]),
            TableSchema::new("single", ["only"]),
        ]
    }

    fn trailing_limit(sql: &str) -> u32 {
        sql.rsplit_once(" LIMIT ")
            .map(|(_, n)| n.parse().unwrap())
            .unwrap()
    }

    fn selected_columns(sql: &str) -> Vec<String> {
        let list = sql
            .strip_prefix("SELECT ")
            .and_then(|rest| rest.split_once(" FROM "))
            .map(|(list, _)| list)
            .unwrap();
        list.split(", ").map(str::to_string).collect()
    }

    #[test]
    fn test_limit_in_range() {
        let synth = QuerySynthesizer::new();
        let tables = catalog();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..20 {
                let query = synth.synthesize(&tables, &mut rng);
                if matches!(query.shape, QueryShape::SelectAll | QueryShape::SelectCols) {
                    let limit = trailing_limit(&query.sql);
                    assert!((1..=10).contains(&limit), "{}", query.sql);
                }
            }
        }
    }

    #[test]
    fn test_select_cols_count_and_uniqueness() {
        let synth = QuerySynthesizer::new().generic_ratio(0.0);
        let tables = catalog();
        let mut seen = 0;
        for seed in 0..300 {
            let mut rng = StdRng::seed_from_u64(seed);
            let query = synth.synthesize(&tables, &mut rng);
            if query.shape != QueryShape::SelectCols {
                continue;
            }
            seen += 1;

            let table = tables
                .iter()
                .find(|t| query.sql.contains(&format!("FROM `{}`", t.name)))
                .unwrap();
            let columns = selected_columns(&query.sql);
            let unique: HashSet<_> = columns.iter().collect();

            assert!(!columns.is_empty());
            assert!(columns.len() <= 3.min(table.columns.len()), "{}", query.sql);
            assert_eq!(unique.len(), columns.len(), "duplicate column: {}", query.sql);
            for column in &columns {
                let bare = column.trim_matches('`');
                assert!(table.columns.iter().any(|c| c.name == bare));
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn test_empty_catalog_only_generic() {
        let synth = QuerySynthesizer::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let query = synth.synthesize(&[], &mut rng);
            assert_eq!(query.shape, QueryShape::Generic);
            assert!(GENERIC_QUERIES.contains(&query.sql.as_str()));
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let synth = QuerySynthesizer::new();
        let tables = catalog();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50).map(|_| synth.generate(&tables, &mut rng)).collect::<Vec<_>>()
        };

        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn test_every_shape_appears() {
        let synth = QuerySynthesizer::new();
        let tables = catalog();
        let mut rng = StdRng::seed_from_u64(1);
        let shapes: HashSet<_> = (0..500)
            .map(|_| synth.synthesize(&tables, &mut rng).shape)
            .collect();
        assert_eq!(shapes.len(), 4);
    }

    #[test]
    fn test_count_has_alias_and_no_limit() {
        let synth = QuerySynthesizer::new().generic_ratio(0.0);
        let tables = vec![TableSchema::new("events", ["id"])];
        let mut rng = StdRng::seed_from_u64(0);
        let query = (0..100)
            .map(|_| synth.synthesize(&tables, &mut rng))
            .find(|q| q.shape == QueryShape::Count)
            .unwrap();
        assert_eq!(query.sql, "SELECT COUNT(*) as count FROM `events`");
    }

    #[test]
    fn test_identifiers_are_not_escaped() {
        let synth = QuerySynthesizer::new().generic_ratio(0.0);
        let tables = vec![TableSchema::new("we`ird", ["co`l"])];
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..30 {
            let query = synth.synthesize(&tables, &mut rng);
            assert!(query.sql.contains("`we`ird`"), "{}", query.sql);
            if query.shape == QueryShape::SelectCols {
                assert!(query.sql.starts_with("SELECT `co`l` FROM"));
            }
        }
    }

    #[test]
    fn test_columnless_table_falls_back_to_select_all() {
        let synth = QuerySynthesizer::new().generic_ratio(0.0);
        let tables = vec![TableSchema::new("empty", Vec::<String>::new())];
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let query = synth.synthesize(&tables, &mut rng);
            assert_ne!(query.shape, QueryShape::SelectCols);
        }
    }

    #[test]
    fn test_policy_knobs() {
        let synth = QuerySynthesizer::new()
            .generic_ratio(1.0)
            .max_limit(0)
            .max_columns(0);
        let mut rng = StdRng::seed_from_u64(5);
        let query = synth.synthesize(&catalog(), &mut rng);
        assert_eq!(query.shape, QueryShape::Generic);
        assert_eq!(synth.max_limit, 1);
        assert_eq!(synth.max_columns, 1);
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(QueryShape::SelectAll.to_string(), "SELECT_ALL");
        assert_eq!(QueryShape::SelectCols.to_string(), "SELECT_COLS");
        assert_eq!(QueryShape::Count.to_string(), "COUNT");
        assert_eq!(QueryShape::Generic.to_string(), "GENERIC");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn select_cols_respects_bounds(
                columns in proptest::collection::hash_set("[a-z]{1,8}", 1..8),
                seed in any::<u64>(),
            ) {
                let table = TableSchema::new("t", columns.iter().cloned());
                let synth = QuerySynthesizer::new().generic_ratio(0.0);
                let mut rng = StdRng::seed_from_u64(seed);

                for _ in 0..16 {
                    let query = synth.synthesize(std::slice::from_ref(&table), &mut rng);
                    if query.shape != QueryShape::SelectCols {
                        continue;
                    }
                    let picked = selected_columns(&query.sql);
                    let unique: HashSet<_> = picked.iter().collect();
                    prop_assert!(!picked.is_empty());
                    prop_assert!(picked.len() <= 3.min(columns.len()));
                    prop_assert_eq!(unique.len(), picked.len());
                    prop_assert!((1..=10).contains(&trailing_limit(&query.sql)));
                }
            }
        }
    }
}
