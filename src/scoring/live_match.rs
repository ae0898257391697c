//! One task per live match.
//!
//! Every command for a match goes through that match's mailbox, so the state
//! machine and the innings aggregator only ever run on one task and need no
//! locking. Writes to the store happen after the in-memory change has been
//! committed; a write that cannot be made durable stays queued and blocks
//! further scoring until it is flushed or abandoned.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, error, info};

use super::event_log::EventLog;
use super::innings_aggregator::InningsAggregator;
use super::state_machine::{DeliveryOutcome, MatchStateMachine};
use crate::errors::{AppError, Result};
use crate::models::cricket_match::{Chase, Match, Openers, StartMatch};
use crate::models::delivery::{Delivery, DeliveryInput, WicketInput};
use crate::models::player_innings::PlayerInnings;
use crate::services::retry::{persist_with_retry, RetryPolicy};
use crate::services::score_store::ScoreStore;

pub type Reply<T> = oneshot::Sender<Result<T>>;

pub enum MatchCommand {
    Start(StartMatch, Reply<Match>),
    RecordDelivery(DeliveryInput, Reply<ScoringUpdate>),
    RecordWicket(WicketInput, Reply<ScoringUpdate>),
    SetBatsman(String, Reply<Match>),
    SetBowler(String, Reply<Match>),
    EndInnings(Option<Openers>, Reply<Match>),
    Complete(Option<String>, Reply<Match>),
    Cancel(Reply<Match>),
    Flush { abandon: bool, reply: Reply<FlushReport> },
    Snapshot(Reply<Match>),
    Scorecard(Reply<Vec<PlayerInnings>>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoringUpdate {
    pub delivery: Delivery,
    pub over_completed: bool,
    pub innings_closed: bool,
    pub chase: Option<Chase>,
    pub scoreline: String,
    #[serde(rename = "match")]
    pub state: Match,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlushReport {
    pub match_id: String,
    pub written: usize,
    pub abandoned: usize,
    pub pending: usize,
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Delivery(Delivery),
    Match(Box<Match>),
    PlayerInnings(PlayerInnings),
}

impl PendingWrite {
    // Writes with the same key replace each other; only the newest matters.
    fn key(&self) -> Option<String> {
        match self {
            Self::Delivery(_) => None,
            Self::Match(_) => Some("match".to_string()),
            Self::PlayerInnings(row) => Some(format!("player:{}", row.player_id)),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Delivery(d) => format!("append delivery {}", d.label()),
            Self::Match(m) => format!("save match {}", m.match_id),
            Self::PlayerInnings(row) => format!("save innings row {}/{}", row.match_id, row.player_id),
        }
    }
}

struct MatchActor {
    machine: MatchStateMachine,
    aggregator: InningsAggregator,
    events: EventLog,
    store: Arc<dyn ScoreStore>,
    policy: RetryPolicy,
    pending: VecDeque<PendingWrite>,
}

impl MatchActor {
    fn new(m: Match, deliveries: &[Delivery], store: Arc<dyn ScoreStore>, policy: RetryPolicy) -> Self {
        let aggregator = InningsAggregator::replay(&m.match_id, &m.tournament_id, deliveries);
        Self {
            machine: MatchStateMachine::new(m),
            aggregator,
            events: EventLog::new(store.clone(), policy),
            store,
            policy,
            pending: VecDeque::new(),
        }
    }

    fn match_id(&self) -> &str {
        &self.machine.state().match_id
    }

    fn finished(&self) -> bool {
        self.machine.state().phase.is_terminal() && self.pending.is_empty()
    }

    async fn process_mailbox(mut self, mut mailbox_rx: mpsc::Receiver<MatchCommand>) {
        while let Some(command) = mailbox_rx.recv().await {
            self.handle(command).await;

            if self.finished() {
                // answer whatever is already queued, then stop
                mailbox_rx.close();
                while let Some(command) = mailbox_rx.recv().await {
                    self.handle(command).await;
                }
                break;
            }
        }
        debug!(match_id = %self.match_id(), "match task stopped");
    }

    async fn handle(&mut self, command: MatchCommand) {
        match command {
            MatchCommand::Start(request, reply) => {
                let result = self.transition(|m| m.start(&request)).await;
                if result.is_ok() {
                    info!(match_id = %self.match_id(), "match started");
                }
                respond(reply, result);
            }
            MatchCommand::RecordDelivery(input, reply) => {
                let result = self.score(|m| m.record_delivery(&input)).await;
                respond(reply, result);
            }
            MatchCommand::RecordWicket(input, reply) => {
                let result = self.score(|m| m.record_wicket(&input)).await;
                respond(reply, result);
            }
            MatchCommand::SetBatsman(player_id, reply) => {
                let result = self.transition(|m| m.set_new_batsman(&player_id)).await;
                respond(reply, result);
            }
            MatchCommand::SetBowler(player_id, reply) => {
                let result = self.transition(|m| m.set_bowler(&player_id)).await;
                respond(reply, result);
            }
            MatchCommand::EndInnings(openers, reply) => {
                let result = self.transition(|m| m.end_innings(openers.as_ref())).await;
                respond(reply, result);
            }
            MatchCommand::Complete(winner, reply) => {
                let result = self.transition(|m| m.complete_match(winner.as_deref())).await;
                if let Ok(m) = &result {
                    info!(
                        match_id = %m.match_id,
                        summary = m.result.as_ref().map(|r| r.summary.as_str()).unwrap_or_default(),
                        "match completed"
                    );
                }
                respond(reply, result);
            }
            MatchCommand::Cancel(reply) => {
                let result = self.transition(|m| m.cancel()).await;
                respond(reply, result);
            }
            MatchCommand::Flush { abandon, reply } => {
                let result = if abandon {
                    let abandoned = self.abandon();
                    Ok(self.report(0, abandoned))
                } else {
                    self.flush_pending().await.map(|written| self.report(written, 0))
                };
                respond(reply, result);
            }
            MatchCommand::Snapshot(reply) => respond(reply, Ok(self.machine.state().clone())),
            MatchCommand::Scorecard(reply) => respond(reply, Ok(self.aggregator.rows())),
        }
    }

    async fn score<F>(&mut self, op: F) -> Result<ScoringUpdate>
    where
        F: FnOnce(&mut MatchStateMachine) -> Result<DeliveryOutcome>,
    {
        self.ensure_flushed().await?;
        let outcome = op(&mut self.machine)?;

        let rows = self.aggregator.apply(&outcome.delivery);
        self.enqueue(PendingWrite::Delivery(outcome.delivery.clone()));
        for row in rows {
            self.enqueue(PendingWrite::PlayerInnings(row));
        }
        self.enqueue(PendingWrite::Match(Box::new(self.machine.state().clone())));
        self.flush_after_commit().await?;

        let state = self.machine.state().clone();
        Ok(ScoringUpdate {
            delivery: outcome.delivery,
            over_completed: outcome.over_completed,
            innings_closed: outcome.innings_closed,
            chase: outcome.chase,
            scoreline: state.scoreline(),
            state,
        })
    }

    async fn transition<F>(&mut self, op: F) -> Result<Match>
    where
        F: FnOnce(&mut MatchStateMachine) -> Result<()>,
    {
        self.ensure_flushed().await?;
        op(&mut self.machine)?;

        self.enqueue(PendingWrite::Match(Box::new(self.machine.state().clone())));
        self.flush_after_commit().await?;
        Ok(self.machine.state().clone())
    }

    fn enqueue(&mut self, write: PendingWrite) {
        if let Some(key) = write.key() {
            self.pending.retain(|queued| queued.key().as_deref() != Some(key.as_str()));
        }
        self.pending.push_back(write);
    }

    async fn ensure_flushed(&mut self) -> Result<()> {
        self.flush_pending().await.map(|_| ()).map_err(|e| {
            AppError::persistence(format!(
                "match {} has {} unsaved write(s), flush them before scoring: {}",
                self.match_id(),
                self.pending.len(),
                e
            ))
        })
    }

    async fn flush_after_commit(&mut self) -> Result<()> {
        self.flush_pending().await.map(|_| ()).map_err(|e| {
            AppError::persistence(format!(
                "accepted by match {} but {} write(s) are not yet durable, retry with flush: {}",
                self.match_id(),
                self.pending.len(),
                e
            ))
        })
    }

    async fn flush_pending(&mut self) -> Result<usize> {
        let mut written = 0;
        while let Some(write) = self.pending.front() {
            self.persist(write).await?;
            self.pending.pop_front();
            written += 1;
        }
        Ok(written)
    }

    async fn persist(&self, write: &PendingWrite) -> Result<()> {
        match write {
            PendingWrite::Delivery(delivery) => self.events.append(delivery).await,
            PendingWrite::Match(m) => {
                persist_with_retry(&write.label(), &self.policy, || self.store.save_match(m)).await
            }
            PendingWrite::PlayerInnings(row) => {
                persist_with_retry(&write.label(), &self.policy, || {
                    self.store.upsert_player_innings(row)
                })
                .await
            }
        }
    }

    fn abandon(&mut self) -> usize {
        let abandoned = self.pending.len();
        if abandoned > 0 {
            let labels: Vec<String> = self.pending.iter().map(PendingWrite::label).collect();
            error!(
                match_id = %self.match_id(),
                abandoned,
                writes = ?labels,
                "abandoning unsaved writes, the stored match no longer matches the live one"
            );
            self.pending.clear();
        }
        abandoned
    }

    fn report(&self, written: usize, abandoned: usize) -> FlushReport {
        FlushReport {
            match_id: self.match_id().to_string(),
            written,
            abandoned,
            pending: self.pending.len(),
        }
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if reply.send(result).is_err() {
        debug!("caller went away before the reply");
    }
}

#[derive(Clone)]
pub struct MatchHandle {
    mailbox_tx: mpsc::Sender<MatchCommand>,
}

impl MatchHandle {
    fn is_open(&self) -> bool {
        !self.mailbox_tx.is_closed()
    }
}

/// Routes commands to the task that owns each match, starting the task on
/// first use.
pub struct LiveMatchRegistry {
    store: Arc<dyn ScoreStore>,
    policy: RetryPolicy,
    mailbox_capacity: usize,
    handles: Arc<RwLock<HashMap<String, MatchHandle>>>,
    loading: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LiveMatchRegistry {
    pub fn new(store: Arc<dyn ScoreStore>, policy: RetryPolicy, mailbox_capacity: usize) -> Self {
        Self {
            store,
            policy,
            mailbox_capacity: mailbox_capacity.max(1),
            handles: Arc::new(RwLock::new(HashMap::new())),
            loading: Mutex::new(HashMap::new()),
        }
    }

    pub async fn live_count(&self) -> usize {
        self.handles.read().await.values().filter(|h| h.is_open()).count()
    }

    pub async fn create(&self, m: Match) -> Result<Match> {
        let label = format!("create match {}", m.match_id);
        persist_with_retry(&label, &self.policy, || self.store.save_match(&m)).await?;
        info!(match_id = %m.match_id, tournament_id = %m.tournament_id, "match created");
        Ok(m)
    }

    async fn open_handle(&self, match_id: &str) -> Option<MatchHandle> {
        self.handles
            .read()
            .await
            .get(match_id)
            .filter(|h| h.is_open())
            .cloned()
    }

    async fn load_gate(&self, match_id: &str) -> Arc<Mutex<()>> {
        self.loading
            .lock()
            .await
            .entry(match_id.to_string())
            .or_default()
            .clone()
    }

    async fn handle(&self, match_id: &str) -> Result<MatchHandle> {
        if let Some(handle) = self.open_handle(match_id).await {
            return Ok(handle);
        }

        // one loader per match; the registry lock is only taken to insert
        let gate = self.load_gate(match_id).await;
        let _loading = gate.lock().await;
        if let Some(handle) = self.open_handle(match_id).await {
            return Ok(handle);
        }

        let m = self
            .store
            .find_match(match_id)
            .await?
            .ok_or(AppError::DocumentNotFound)?;
        let deliveries = self.store.deliveries(match_id).await?;
        debug!(match_id, deliveries = deliveries.len(), "starting match task");

        let (mailbox_tx, mailbox_rx) = mpsc::channel(self.mailbox_capacity);
        let handle = MatchHandle { mailbox_tx };
        self.handles
            .write()
            .await
            .insert(match_id.to_string(), handle.clone());

        let actor = MatchActor::new(m, &deliveries, self.store.clone(), self.policy);
        let registry = Arc::clone(&self.handles);
        let id = match_id.to_string();
        tokio::spawn(async move {
            actor.process_mailbox(mailbox_rx).await;

            let mut handles = registry.write().await;
            if handles.get(&id).map_or(false, |h| !h.is_open()) {
                handles.remove(&id);
            }
        });

        Ok(handle)
    }

    async fn call<T>(&self, match_id: &str, command: impl FnOnce(Reply<T>) -> MatchCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut command = command(reply_tx);

        // a task that just stopped hands the command back; start a fresh one
        for _ in 0..2 {
            let handle = self.handle(match_id).await?;
            match handle.mailbox_tx.send(command).await {
                Ok(()) => {
                    return reply_rx.await.map_err(|_| {
                        AppError::ServiceUnavailable(format!("match {} stopped before replying", match_id))
                    })?;
                }
                Err(mpsc::error::SendError(returned)) => command = returned,
            }
        }

        Err(AppError::ServiceUnavailable(format!(
            "match {} is not accepting commands",
            match_id
        )))
    }

    pub async fn start(&self, match_id: &str, request: StartMatch) -> Result<Match> {
        self.call(match_id, |reply| MatchCommand::Start(request, reply)).await
    }

    pub async fn record_delivery(&self, match_id: &str, input: DeliveryInput) -> Result<ScoringUpdate> {
        self.call(match_id, |reply| MatchCommand::RecordDelivery(input, reply)).await
    }

    pub async fn record_wicket(&self, match_id: &str, input: WicketInput) -> Result<ScoringUpdate> {
        self.call(match_id, |reply| MatchCommand::RecordWicket(input, reply)).await
    }

    pub async fn set_new_batsman(&self, match_id: &str, player_id: String) -> Result<Match> {
        self.call(match_id, |reply| MatchCommand::SetBatsman(player_id, reply)).await
    }

    pub async fn set_bowler(&self, match_id: &str, player_id: String) -> Result<Match> {
        self.call(match_id, |reply| MatchCommand::SetBowler(player_id, reply)).await
    }

    pub async fn end_innings(&self, match_id: &str, openers: Option<Openers>) -> Result<Match> {
        self.call(match_id, |reply| MatchCommand::EndInnings(openers, reply)).await
    }

    pub async fn complete(&self, match_id: &str, winner_team_id: Option<String>) -> Result<Match> {
        self.call(match_id, |reply| MatchCommand::Complete(winner_team_id, reply)).await
    }

    pub async fn cancel(&self, match_id: &str) -> Result<Match> {
        self.call(match_id, MatchCommand::Cancel).await
    }

    pub async fn flush(&self, match_id: &str, abandon: bool) -> Result<FlushReport> {
        self.call(match_id, |reply| MatchCommand::Flush { abandon, reply }).await
    }

    /// Live state when the match has a running task, otherwise the stored
    /// document.
    pub async fn snapshot(&self, match_id: &str) -> Result<Match> {
        if self.open_handle(match_id).await.is_some() {
            if let Ok(m) = self.call(match_id, MatchCommand::Snapshot).await {
                return Ok(m);
            }
        }
        self.store
            .find_match(match_id)
            .await?
            .ok_or(AppError::DocumentNotFound)
    }

    pub async fn scorecard(&self, match_id: &str) -> Result<Vec<PlayerInnings>> {
        if self.open_handle(match_id).await.is_some() {
            if let Ok(rows) = self.call(match_id, MatchCommand::Scorecard).await {
                return Ok(rows);
            }
        }
        if self.store.find_match(match_id).await?.is_none() {
            return Err(AppError::DocumentNotFound);
        }
        self.store.player_innings_for_match(match_id).await
    }
}
