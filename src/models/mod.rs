pub mod cricket_match;
pub mod delivery;
pub mod player_innings;
pub mod tournament;
