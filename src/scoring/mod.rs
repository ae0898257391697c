pub mod commentary;
pub mod event_log;
pub mod innings_aggregator;
pub mod live_match;
pub mod state_machine;
pub mod tournament_engine;
