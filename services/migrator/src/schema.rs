//! Target table shapes: column lists, identity keys and DDL.

/// Legacy rolling-window columns and their canonical names
pub const LEGACY_COLUMNS: &[(&str, &str)] = &[
    ("l8w_roll", "l8w_value"),
    ("l7w_roll", "l7w_value"),
    ("l6w_roll", "l6w_value"),
    ("l5w_roll", "l5w_value"),
    ("l4w_roll", "l4w_value"),
    ("l3w_roll", "l3w_value"),
    ("l2w_roll", "l2w_value"),
    ("l1w_roll", "l1w_value"),
    ("l0w_roll", "l0w_value"),
];

/// Week-offset prefixes, current week (l0w) through eight weeks back (l8w)
pub const WEEK_TOKENS: &[&str] = &["l0w", "l1w", "l2w", "l3w", "l4w", "l5w", "l6w", "l7w", "l8w"];

/// How numeric columns of a shape are cleaned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericRole {
    Float,
    Integer,
}

/// Cleaner selected for one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Text,
    Float,
    Integer,
}

/// Static description of one record shape and the table it lands in
#[derive(Debug)]
pub struct Schema {
    pub table: &'static str,
    /// Canonical columns, in insert order
    pub columns: &'static [&'static str],
    /// Identity key; at most one record per key is uploaded
    pub key: &'static [&'static str],
    pub numeric: NumericRole,
    pub renames: &'static [(&'static str, &'static str)],
    pub ddl: &'static str,
}

impl Schema {
    /// Canonical name for a (lowercase) source column
    pub fn canonical<'a>(&self, column: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(legacy, _)| *legacy == column)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(column)
    }

    pub fn role_of(&self, column: &str) -> ColumnRole {
        let numeric =
            column.contains("value") || WEEK_TOKENS.iter().any(|t| column.starts_with(t));
        match (numeric, self.numeric) {
            (false, _) => ColumnRole::Text,
            (true, NumericRole::Float) => ColumnRole::Float,
            (true, NumericRole::Integer) => ColumnRole::Integer,
        }
    }
}

/// Wide metric observations: one row per (country, zone, metric)
pub const METRICS: Schema = Schema {
    table: "metrics_input",
    columns: &[
        "country",
        "city",
        "zone",
        "zone_type",
        "zone_prioritization",
        "metric",
        "l8w_value",
        "l7w_value",
        "l6w_value",
        "l5w_value",
        "l4w_value",
        "l3w_value",
        "l2w_value",
        "l1w_value",
        "l0w_value",
    ],
    key: &["country", "zone", "metric"],
    numeric: NumericRole::Float,
    renames: LEGACY_COLUMNS,
    ddl: METRICS_DDL,
};

/// Weekly order counts: one row per (country, zone)
pub const ORDERS: Schema = Schema {
    table: "orders",
    columns: &[
        "country", "city", "zone", "l8w", "l7w", "l6w", "l5w", "l4w", "l3w", "l2w", "l1w", "l0w",
    ],
    key: &["country", "zone"],
    numeric: NumericRole::Integer,
    renames: &[],
    ddl: ORDERS_DDL,
};

const METRICS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS metrics_input (
    id BIGSERIAL PRIMARY KEY,
    country VARCHAR(10),
    city VARCHAR(100),
    zone VARCHAR(200),
    zone_type VARCHAR(50),
    zone_prioritization VARCHAR(50),
    metric VARCHAR(100),
    l0w_value NUMERIC(10,4),
    l1w_value NUMERIC(10,4),
    l2w_value NUMERIC(10,4),
    l3w_value NUMERIC(10,4),
    l4w_value NUMERIC(10,4),
    l5w_value NUMERIC(10,4),
    l6w_value NUMERIC(10,4),
    l7w_value NUMERIC(10,4),
    l8w_value NUMERIC(10,4),
    created_at TIMESTAMP DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_metrics_input_metric ON metrics_input(metric);
CREATE INDEX IF NOT EXISTS idx_metrics_input_country ON metrics_input(country);
CREATE INDEX IF NOT EXISTS idx_metrics_input_zone ON metrics_input(zone);
"#;

const ORDERS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id BIGSERIAL PRIMARY KEY,
    country VARCHAR(10),
    city VARCHAR(100),
    zone VARCHAR(200),
    l0w INTEGER,
    l1w INTEGER,
    l2w INTEGER,
    l3w INTEGER,
    l4w INTEGER,
    l5w INTEGER,
    l6w INTEGER,
    l7w INTEGER,
    l8w INTEGER,
    created_at TIMESTAMP DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_orders_country ON orders(country);
CREATE INDEX IF NOT EXISTS idx_orders_zone ON orders(zone);
"#;
