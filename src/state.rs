use std::sync::Arc;

use crate::config::AppConfig;
use crate::scoring::event_log::EventLog;
use crate::scoring::live_match::LiveMatchRegistry;
use crate::services::retry::RetryPolicy;
use crate::services::score_store::ScoreStore;
use crate::services::stats_service::StatsService;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScoreStore>,
    pub matches: Arc<LiveMatchRegistry>,
    pub events: EventLog,
    pub stats: Arc<StatsService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn ScoreStore>, config: AppConfig) -> Self {
        let policy = RetryPolicy::from_config(&config);
        AppState {
            matches: Arc::new(LiveMatchRegistry::new(
                store.clone(),
                policy,
                config.match_mailbox_capacity,
            )),
            events: EventLog::new(store.clone(), policy),
            stats: Arc::new(StatsService::new(store.clone(), policy)),
            store,
            config: Arc::new(config),
        }
    }
}
