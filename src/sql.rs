//! Rendering of transformation descriptors into SQLite statements.

use crate::constants::{GAME_ID_COLUMN, UNKNOWN_POSITION_CODE};
use crate::transform::{Expr, InsertPlan, ScoreOutcome, SelectDescriptor, Side};

/// Double-quotes an identifier. Raw column names such as `1b_umpire_id`
/// are not valid bare identifiers.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn cast_integer(column: &str) -> String {
    format!("CAST({} AS INTEGER)", quote_ident(column))
}

pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Column(c) => quote_ident(c),
        Expr::Integer(c) => cast_integer(c),
        Expr::Text(v) => quote_literal(v),
        Expr::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Expr::Null => "NULL".to_string(),
        Expr::GameKey => format!(
            "{} || {} || {}",
            cast_integer("date"),
            quote_ident(&Side::Home.column("name")),
            cast_integer("number_of_game")
        ),
        Expr::DayFlag(c) => format!(
            "CASE {} WHEN 'D' THEN 1 WHEN 'N' THEN 0 ELSE NULL END",
            quote_ident(c)
        ),
        Expr::TeamByScore(outcome) => {
            let op = match outcome {
                ScoreOutcome::Winner => ">",
                ScoreOutcome::Loser => "<",
            };
            format!(
                "CASE WHEN {} {} {} THEN {} ELSE {} END",
                cast_integer(&Side::Home.column("score")),
                op,
                cast_integer(&Side::Visiting.column("score")),
                quote_ident(&Side::Home.column("name")),
                quote_ident(&Side::Visiting.column("name"))
            )
        }
        Expr::DefensivePosition(c) => format!(
            "CASE WHEN {pos} BETWEEN 1 AND {max} THEN 'D' || {pos} ELSE 'D{max}' END",
            pos = cast_integer(c),
            max = UNKNOWN_POSITION_CODE
        ),
    }
}

pub fn render_select(select: &SelectDescriptor) -> String {
    let outputs: Vec<String> = select.outputs.iter().map(render_expr).collect();
    let mut sql = format!(
        "SELECT {} FROM {}",
        outputs.join(", "),
        quote_ident(select.source)
    );
    if let Some(present) = &select.present {
        sql.push_str(&format!(" WHERE {} IS NOT NULL", quote_ident(present)));
    }
    sql
}

/// `INSERT OR IGNORE INTO target (cols) select UNION select ...`
pub fn render_insert(plan: &InsertPlan) -> String {
    let columns: Vec<String> = plan.columns.iter().map(|c| quote_ident(c)).collect();
    let selects: Vec<String> = plan.selects.iter().map(render_select).collect();
    format!(
        "INSERT OR IGNORE INTO {} ({}) {}",
        quote_ident(plan.target),
        columns.join(", "),
        selects.join(" UNION ")
    )
}

fn render_select_as(select: &SelectDescriptor, columns: &[&str]) -> String {
    let outputs: Vec<String> = select
        .outputs
        .iter()
        .zip(columns)
        .map(|(expr, col)| format!("{} AS {}", render_expr(expr), quote_ident(col)))
        .collect();
    let mut sql = format!(
        "SELECT {} FROM {}",
        outputs.join(", "),
        quote_ident(select.source)
    );
    if let Some(present) = &select.present {
        sql.push_str(&format!(" WHERE {} IS NOT NULL", quote_ident(present)));
    }
    sql
}

/// Counts source rows of `plan` that have no counterpart in the target
/// table, matching on `key`. Rows with NULL in any of `required` are left
/// out since the insert would skip them anyway.
pub fn render_pending_count(plan: &InsertPlan, key: &[&str], required: &[&str]) -> String {
    let selects: Vec<String> = plan
        .selects
        .iter()
        .map(|s| render_select_as(s, &plan.columns))
        .collect();
    let matches: Vec<String> = key
        .iter()
        .map(|c| format!("t.{col} IS s.{col}", col = quote_ident(c)))
        .collect();
    let mut conditions: Vec<String> = required
        .iter()
        .map(|c| format!("s.{} IS NOT NULL", quote_ident(c)))
        .collect();
    conditions.push(format!(
        "NOT EXISTS (SELECT 1 FROM {} AS t WHERE {})",
        quote_ident(plan.target),
        matches.join(" AND ")
    ));
    format!(
        "SELECT COUNT(*) FROM ({}) AS s WHERE {}",
        selects.join(" UNION "),
        conditions.join(" AND ")
    )
}

/// Fills the derived game key on raw game log rows that do not have one yet.
pub fn render_game_key_update(source: &str) -> String {
    format!(
        "UPDATE {} SET {} = {} WHERE {} IS NULL",
        quote_ident(source),
        quote_ident(GAME_ID_COLUMN),
        render_expr(&Expr::GameKey),
        quote_ident(GAME_ID_COLUMN)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_and_literals_are_escaped() {
        assert_eq!(quote_ident("1b_umpire_id"), "\"1b_umpire_id\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(quote_literal("Players' League"), "'Players'' League'");
    }

    #[test]
    fn test_award_attribution_comparisons() {
        let winner = render_expr(&Expr::TeamByScore(ScoreOutcome::Winner));
        assert_eq!(
            winner,
            "CASE WHEN CAST(\"h_score\" AS INTEGER) > CAST(\"v_score\" AS INTEGER) \
             THEN \"h_name\" ELSE \"v_name\" END"
        );
        let loser = render_expr(&Expr::TeamByScore(ScoreOutcome::Loser));
        assert!(loser.contains(") < CAST("));
    }

    #[test]
    fn test_insert_renders_union_of_selects() {
        let plan = InsertPlan::new("umpires", "person_appearance", vec!["game_id", "team_id"])
            .select(
                SelectDescriptor::from_table("game_log", vec![Expr::column("game_id"), Expr::Null])
                    .when_present("hp_umpire_id"),
            )
            .select(
                SelectDescriptor::from_table("game_log", vec![Expr::column("game_id"), Expr::Null])
                    .when_present("1b_umpire_id"),
            );

        assert_eq!(
            render_insert(&plan),
            "INSERT OR IGNORE INTO \"person_appearance\" (\"game_id\", \"team_id\") \
             SELECT \"game_id\", NULL FROM \"game_log\" WHERE \"hp_umpire_id\" IS NOT NULL \
             UNION \
             SELECT \"game_id\", NULL FROM \"game_log\" WHERE \"1b_umpire_id\" IS NOT NULL"
        );
    }

    #[test]
    fn test_pending_count_matches_on_key() {
        let plan = InsertPlan::new("park", "park", vec!["park_id", "nickname"]).select(
            SelectDescriptor::from_table("park_codes", vec![Expr::column("park_id"), Expr::column("aka")])
                .when_present("park_id"),
        );
        assert_eq!(
            render_pending_count(&plan, &["park_id"], &["park_id"]),
            "SELECT COUNT(*) FROM (SELECT \"park_id\" AS \"park_id\", \"aka\" AS \"nickname\" \
             FROM \"park_codes\" WHERE \"park_id\" IS NOT NULL) AS s \
             WHERE s.\"park_id\" IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM \"park\" AS t WHERE t.\"park_id\" IS s.\"park_id\")"
        );
    }

    #[test]
    fn test_game_key_update_only_touches_missing_keys() {
        let sql = render_game_key_update("game_log");
        assert!(sql.starts_with("UPDATE \"game_log\" SET \"game_id\" = CAST(\"date\" AS INTEGER)"));
        assert!(sql.ends_with("WHERE \"game_id\" IS NULL"));
    }
}
