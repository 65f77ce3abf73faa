//! Decomposition of the wide game log into per-game, per-team and
//! per-person rows.
//!
//! A game log row carries both teams' stat lines side by side, plus umpires,
//! managers, awards, starting pitchers and both nine-man lineups as repeated
//! column groups. The plans here split those groups into one row per team
//! (`team_appearance`) and one row per person and role (`person_appearance`).

use crate::constants::{
    self, GAME, GAME_ID_COLUMN, GAME_LOG, LINEUP_SLOTS, PERSON_APPEARANCE, TEAM_APPEARANCE,
    TEAM_STATS, UMPIRE_POSITIONS,
};
use crate::transform::{Expr, InsertPlan, ScoreOutcome, SelectDescriptor, Side};

const PERSON_APPEARANCE_COLUMNS: [&str; 4] = ["game_id", "team_id", "person_id", "appearance_type_id"];

/// One row per game; only columns that describe the game itself.
pub fn game_plan() -> InsertPlan {
    InsertPlan::new(
        GAME,
        GAME,
        vec![
            "game_id",
            "date",
            "number_of_game",
            "park_id",
            "length_outs",
            "day",
            "completion",
            "forfeit",
            "protest",
            "attendance",
            "length_minutes",
            "additional_info",
            "acquisition_info",
        ],
    )
    .select(
        SelectDescriptor::from_table(
            GAME_LOG,
            vec![
                Expr::column(GAME_ID_COLUMN),
                Expr::integer("date"),
                Expr::integer("number_of_game"),
                Expr::column("park_id"),
                Expr::column("length_outs"),
                Expr::DayFlag("day_night".to_string()),
                Expr::column("completion"),
                Expr::column("forefeit"),
                Expr::column("protest"),
                Expr::column("attendance"),
                Expr::column("length_minutes"),
                Expr::column("additional_info"),
                Expr::column("acquisition_info"),
            ],
        )
        .when_present(GAME_ID_COLUMN),
    )
}

fn team_appearance_select(side: Side) -> SelectDescriptor {
    let mut outputs = vec![
        Expr::column(side.column("name")),
        Expr::column(GAME_ID_COLUMN),
        Expr::Bool(side.is_home()),
        Expr::column(side.column("league")),
    ];
    outputs.extend(TEAM_STATS.iter().map(|stat| Expr::column(side.column(stat))));
    SelectDescriptor::from_table(GAME_LOG, outputs).when_present(side.column("name"))
}

/// Two rows per game: the home column family tagged `home = 1` and the
/// visiting family tagged `home = 0`.
pub fn team_appearance_plan() -> InsertPlan {
    let mut columns = vec!["team_id", "game_id", "home", "league_id"];
    columns.extend(TEAM_STATS);
    Side::BOTH
        .iter()
        .fold(InsertPlan::new(TEAM_APPEARANCE, TEAM_APPEARANCE, columns), |plan, side| {
            plan.select(team_appearance_select(*side))
        })
}

/// Team a person appearance is recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamAttribution {
    /// Umpires belong to no team.
    Unaffiliated,
    Side(Side),
    /// Resolved from the final score. Ties fall to the visiting team.
    ByScore(ScoreOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppearanceCode {
    Fixed(String),
    /// `D1`..`D10` read from a defensive position column.
    DefensivePosition(String),
}

/// One source column of person ids and how each non-null value becomes a
/// `person_appearance` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppearanceRule {
    pub person_column: String,
    pub team: TeamAttribution,
    pub appearance: AppearanceCode,
}

impl AppearanceRule {
    pub fn fixed(person_column: impl Into<String>, team: TeamAttribution, code: &str) -> Self {
        Self {
            person_column: person_column.into(),
            team,
            appearance: AppearanceCode::Fixed(code.to_string()),
        }
    }

    fn team_expr(&self) -> Expr {
        match self.team {
            TeamAttribution::Unaffiliated => Expr::Null,
            TeamAttribution::Side(side) => Expr::column(side.column("name")),
            TeamAttribution::ByScore(outcome) => Expr::TeamByScore(outcome),
        }
    }

    fn appearance_expr(&self) -> Expr {
        match &self.appearance {
            AppearanceCode::Fixed(code) => Expr::text(code.as_str()),
            AppearanceCode::DefensivePosition(column) => Expr::DefensivePosition(column.clone()),
        }
    }

    pub fn to_select(&self) -> SelectDescriptor {
        SelectDescriptor::from_table(
            GAME_LOG,
            vec![
                Expr::column(GAME_ID_COLUMN),
                self.team_expr(),
                Expr::column(self.person_column.as_str()),
                self.appearance_expr(),
            ],
        )
        .when_present(self.person_column.as_str())
    }
}

/// Umpires, managers, awards and starting pitchers.
pub fn role_rules() -> Vec<AppearanceRule> {
    let mut rules: Vec<AppearanceRule> = UMPIRE_POSITIONS
        .iter()
        .map(|(column, code)| AppearanceRule::fixed(*column, TeamAttribution::Unaffiliated, code))
        .collect();

    for side in Side::BOTH {
        rules.push(AppearanceRule::fixed(
            side.column("manager_id"),
            TeamAttribution::Side(side),
            constants::MANAGER,
        ));
    }

    let winner = TeamAttribution::ByScore(ScoreOutcome::Winner);
    let loser = TeamAttribution::ByScore(ScoreOutcome::Loser);
    rules.push(AppearanceRule::fixed("winning_pitcher_id", winner, constants::WINNING_PITCHER));
    rules.push(AppearanceRule::fixed("losing_pitcher_id", loser, constants::LOSING_PITCHER));
    rules.push(AppearanceRule::fixed("saving_pitcher_id", winner, constants::SAVING_PITCHER));
    rules.push(AppearanceRule::fixed(
        "winning_rbi_batter_id",
        winner,
        constants::WINNING_RBI_BATTER,
    ));

    for side in Side::BOTH {
        rules.push(AppearanceRule::fixed(
            side.column("starting_pitcher_id"),
            TeamAttribution::Side(side),
            constants::STARTING_PITCHER,
        ));
    }
    rules
}

/// A batting-order position of one team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineupSlot {
    pub side: Side,
    /// 1-based batting order.
    pub slot: u8,
}

impl LineupSlot {
    pub fn person_column(&self) -> String {
        self.side.column(&format!("player_{}_id", self.slot))
    }

    pub fn position_column(&self) -> String {
        self.side.column(&format!("player_{}_def_pos", self.slot))
    }

    pub fn offense_rule(&self) -> AppearanceRule {
        AppearanceRule::fixed(
            self.person_column(),
            TeamAttribution::Side(self.side),
            &format!("O{}", self.slot),
        )
    }

    pub fn defense_rule(&self) -> AppearanceRule {
        AppearanceRule {
            person_column: self.person_column(),
            team: TeamAttribution::Side(self.side),
            appearance: AppearanceCode::DefensivePosition(self.position_column()),
        }
    }

    pub fn plan_name(&self) -> String {
        format!("{}.{}_slot_{}", PERSON_APPEARANCE, self.side.prefix(), self.slot)
    }
}

/// All 18 (side, slot) pairs, home lineup first.
pub fn lineup_slots() -> Vec<LineupSlot> {
    Side::BOTH
        .iter()
        .flat_map(|side| (1..=LINEUP_SLOTS).map(move |slot| LineupSlot { side: *side, slot }))
        .collect()
}

/// The roles plan followed by one offense+defense plan per lineup slot.
pub fn person_appearance_plans() -> Vec<InsertPlan> {
    let roles = role_rules().iter().fold(
        InsertPlan::new(
            format!("{PERSON_APPEARANCE}.roles"),
            PERSON_APPEARANCE,
            PERSON_APPEARANCE_COLUMNS.to_vec(),
        ),
        |plan, rule| plan.select(rule.to_select()),
    );

    let mut plans = vec![roles];
    plans.extend(lineup_slots().into_iter().map(|slot| {
        InsertPlan::new(slot.plan_name(), PERSON_APPEARANCE, PERSON_APPEARANCE_COLUMNS.to_vec())
            .select(slot.offense_rule().to_select())
            .select(slot.defense_rule().to_select())
    }));
    plans
}
