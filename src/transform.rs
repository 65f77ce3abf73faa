//! Structured descriptors for set-based reshaping.
//!
//! Every insert the migration performs from a raw table is described here as
//! data: which raw columns are read, how each target value is derived, and
//! which rows qualify. [`crate::sql`] is the only place these descriptors are
//! turned into statements, so the full transformation set can be inspected
//! and tested without touching a database.

use crate::constants::GAME_ID_COLUMN;
use std::collections::BTreeSet;
use std::fmt;

/// Home or visiting column family of the game log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Home,
    Visiting,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Home, Side::Visiting];

    pub fn prefix(self) -> &'static str {
        match self {
            Side::Home => "h",
            Side::Visiting => "v",
        }
    }

    pub fn is_home(self) -> bool {
        matches!(self, Side::Home)
    }

    /// Raw column name for `field` in this side's column family.
    pub fn column(self, field: &str) -> String {
        format!("{}_{}", self.prefix(), field)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => write!(f, "home"),
            Side::Visiting => write!(f, "visiting"),
        }
    }
}

/// Which side of the final score a value is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    /// Home team if `h_score > v_score`, otherwise the visitors.
    Winner,
    /// Home team if `h_score < v_score`, otherwise the visitors.
    Loser,
}

/// One output value of a select.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Raw column, copied as-is.
    Column(String),
    /// Raw column cast to an integer.
    Integer(String),
    Text(String),
    Bool(bool),
    Null,
    /// `date || home team || game number`, the derived game key.
    GameKey,
    /// `D` -> true, `N` -> false, anything else -> NULL.
    DayFlag(String),
    /// Team name of the side selected by comparing final scores.
    TeamByScore(ScoreOutcome),
    /// Defensive appearance code (`D1`..`D10`) from a position column.
    DefensivePosition(String),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Expr::Integer(name.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expr::Text(value.into())
    }

    /// Raw columns this expression reads.
    pub fn columns(&self) -> Vec<String> {
        match self {
            Expr::Column(c) | Expr::Integer(c) | Expr::DayFlag(c) | Expr::DefensivePosition(c) => {
                vec![c.clone()]
            }
            Expr::GameKey => vec![
                "date".to_string(),
                Side::Home.column("name"),
                "number_of_game".to_string(),
            ],
            Expr::TeamByScore(_) => vec![
                Side::Home.column("score"),
                Side::Visiting.column("score"),
                Side::Home.column("name"),
                Side::Visiting.column("name"),
            ],
            Expr::Text(_) | Expr::Bool(_) | Expr::Null => Vec::new(),
        }
    }
}

/// `SELECT outputs FROM source [WHERE present IS NOT NULL]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectDescriptor {
    pub source: &'static str,
    pub outputs: Vec<Expr>,
    /// Rows qualify only when this raw column is non-null.
    pub present: Option<String>,
}

impl SelectDescriptor {
    pub fn from_table(source: &'static str, outputs: Vec<Expr>) -> Self {
        Self {
            source,
            outputs,
            present: None,
        }
    }

    pub fn when_present(mut self, column: impl Into<String>) -> Self {
        self.present = Some(column.into());
        self
    }

    pub fn columns(&self) -> BTreeSet<String> {
        let mut cols: BTreeSet<String> = self.outputs.iter().flat_map(Expr::columns).collect();
        if let Some(present) = &self.present {
            cols.insert(present.clone());
        }
        cols
    }
}

/// An `INSERT OR IGNORE` into one target table fed by the union of one or
/// more selects.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    /// Label used in logs, metrics and the migration report.
    pub name: String,
    pub target: &'static str,
    pub columns: Vec<&'static str>,
    pub selects: Vec<SelectDescriptor>,
}

impl InsertPlan {
    pub fn new(name: impl Into<String>, target: &'static str, columns: Vec<&'static str>) -> Self {
        Self {
            name: name.into(),
            target,
            columns,
            selects: Vec::new(),
        }
    }

    pub fn select(mut self, select: SelectDescriptor) -> Self {
        self.selects.push(select);
        self
    }

    /// Every select must produce exactly one value per target column.
    pub fn is_well_formed(&self) -> bool {
        !self.selects.is_empty()
            && self
                .selects
                .iter()
                .all(|s| s.outputs.len() == self.columns.len())
    }

    /// Raw columns read from `source`, excluding the derived game key column
    /// which the migration adds itself.
    pub fn required_columns(&self, source: &str) -> BTreeSet<String> {
        self.selects
            .iter()
            .filter(|s| s.source == source)
            .flat_map(SelectDescriptor::columns)
            .filter(|c| c != GAME_ID_COLUMN)
            .collect()
    }

    pub fn sources(&self) -> BTreeSet<&'static str> {
        self.selects.iter().map(|s| s.source).collect()
    }
}
