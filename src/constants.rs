/// Table name constants shared by the loader, schema and cleanup steps.

// Raw input tables, dropped once the normalized tables are populated
pub const GAME_LOG: &str = "game_log";
pub const PARK_CODES: &str = "park_codes";
pub const PERSON_CODES: &str = "person_codes";
pub const TEAM_CODES: &str = "team_codes";

pub const RAW_TABLES: [&str; 4] = [GAME_LOG, PARK_CODES, PERSON_CODES, TEAM_CODES];

// Normalized tables
pub const PERSON: &str = "person";
pub const PARK: &str = "park";
pub const LEAGUE: &str = "league";
pub const APPEARANCE_TYPE: &str = "appearance_type";
pub const TEAM: &str = "team";
pub const GAME: &str = "game";
pub const TEAM_APPEARANCE: &str = "team_appearance";
pub const PERSON_APPEARANCE: &str = "person_appearance";

/// Column added to the raw game log to hold the derived game key.
pub const GAME_ID_COLUMN: &str = "game_id";

/// League ids seen in the game log, with their full names.
pub const LEAGUES: [(&str, &str); 6] = [
    ("NL", "National League"),
    ("AL", "American League"),
    ("AA", "American Association"),
    ("FL", "Federal League"),
    ("PL", "Players League"),
    ("UA", "Union Association"),
];

// Appearance type ids referenced directly by the reshaping rules
pub const MANAGER: &str = "MM";
pub const WINNING_PITCHER: &str = "AWP";
pub const LOSING_PITCHER: &str = "ALP";
pub const SAVING_PITCHER: &str = "ASP";
pub const WINNING_RBI_BATTER: &str = "AWB";
pub const STARTING_PITCHER: &str = "PSP";

/// Highest defensive position code; also the "Unknown Position" bucket.
pub const UNKNOWN_POSITION_CODE: i64 = 10;

pub const LINEUP_SLOTS: u8 = 9;

/// Built-in appearance catalog: (id, name, category).
pub const APPEARANCE_TYPES: [(&str, &str, &str); 31] = [
    ("O1", "Batter 1", "offense"),
    ("O2", "Batter 2", "offense"),
    ("O3", "Batter 3", "offense"),
    ("O4", "Batter 4", "offense"),
    ("O5", "Batter 5", "offense"),
    ("O6", "Batter 6", "offense"),
    ("O7", "Batter 7", "offense"),
    ("O8", "Batter 8", "offense"),
    ("O9", "Batter 9", "offense"),
    ("D1", "Pitcher", "defense"),
    ("D2", "Catcher", "defense"),
    ("D3", "1st Base", "defense"),
    ("D4", "2nd Base", "defense"),
    ("D5", "3rd Base", "defense"),
    ("D6", "Shortstop", "defense"),
    ("D7", "Left Field", "defense"),
    ("D8", "Center Field", "defense"),
    ("D9", "Right Field", "defense"),
    ("D10", "Unknown Position", "defense"),
    ("UHP", "Home Plate", "umpire"),
    ("U1B", "First Base", "umpire"),
    ("U2B", "Second Base", "umpire"),
    ("U3B", "Third Base", "umpire"),
    ("ULF", "Left Field", "umpire"),
    ("URF", "Right Field", "umpire"),
    ("MM", "Manager", "manager"),
    ("AWP", "Winning Pitcher", "award"),
    ("ALP", "Losing Pitcher", "award"),
    ("ASP", "Saving Pitcher", "award"),
    ("AWB", "Winning RBI Batter", "award"),
    ("PSP", "Starting Pitcher", "pitcher"),
];

/// Umpire columns in the game log and the role each one records.
pub const UMPIRE_POSITIONS: [(&str, &str); 6] = [
    ("hp_umpire_id", "UHP"),
    ("1b_umpire_id", "U1B"),
    ("2b_umpire_id", "U2B"),
    ("3b_umpire_id", "U3B"),
    ("lf_umpire_id", "ULF"),
    ("rf_umpire_id", "URF"),
];

/// Per-team stat columns repeated with `h_`/`v_` prefixes in the game log.
/// `line_score` is text, every other stat is an integer.
pub const TEAM_STATS: [&str; 30] = [
    "score",
    "line_score",
    "at_bats",
    "hits",
    "doubles",
    "triples",
    "homeruns",
    "rbi",
    "sacrifice_hits",
    "sacrifice_flies",
    "hit_by_pitch",
    "walks",
    "intentional_walks",
    "strikeouts",
    "stolen_bases",
    "caught_stealing",
    "grounded_into_double",
    "first_catcher_interference",
    "left_on_base",
    "pitchers_used",
    "individual_earned_runs",
    "team_earned_runs",
    "wild_pitches",
    "balks",
    "putouts",
    "assists",
    "errors",
    "passed_balls",
    "double_plays",
    "triple_plays",
];

