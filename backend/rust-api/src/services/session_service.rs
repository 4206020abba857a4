use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::metrics::{GAME_SESSIONS_STARTED_TOTAL, SUBMITS_TOTAL};
use crate::models::puzzle::{draw_side_orders, PlayablePair, PAIRS_PER_PUZZLE};
use crate::models::session::{
    PlayerSession, Selection, SelectionInput, SessionError, SessionStatus, SessionView,
    SubmitOutcome, SubmitResponse,
};
use crate::models::DateKey;
use crate::services::puzzle_service::PuzzleService;
use crate::services::stats_service::StatsService;
use crate::stores::{CacheStore, PuzzleStore, SessionStore, StatsStore, StoreError};
use crate::utils::clock;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Guest sessions outlive their calendar day by enough to survive a midnight
/// reload, then fall out of the cache.
const GUEST_SESSION_TTL_SECONDS: u64 = 48 * 60 * 60;

/// Who a session belongs to: an authenticated user id from JWT claims, or the
/// opaque `guest_token` cookie value.
#[derive(Debug, Clone)]
pub enum Owner {
    User(String),
    Guest(String),
}

impl Owner {
    pub fn id(&self) -> &str {
        match self {
            Owner::User(id) | Owner::Guest(id) => id,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Owner::Guest(_))
    }

    fn kind_label(&self) -> &'static str {
        if self.is_guest() {
            "guest"
        } else {
            "user"
        }
    }
}

/// The per-day game flow: one session per `(owner, date)`, graded against the
/// scheduled pairs, with each authenticated completion handed to the
/// statistics engine exactly once. Authenticated sessions live in Mongo under
/// the versioned-write contract; guest sessions are JSON blobs in the TTL
/// cache.
pub struct SessionService {
    puzzle_service: PuzzleService,
    stats_service: StatsService,
    sessions: Arc<dyn SessionStore>,
    cache: Arc<dyn CacheStore>,
}

impl SessionService {
    pub fn new(
        puzzles: Arc<dyn PuzzleStore>,
        sessions: Arc<dyn SessionStore>,
        stats: Arc<dyn StatsStore>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            puzzle_service: PuzzleService::new(puzzles),
            stats_service: StatsService::new(stats),
            sessions,
            cache,
        }
    }

    /// Today's session for the caller, created on first contact. A terminal
    /// session reconstructs its result instead of starting over.
    pub async fn current_session(
        &self,
        owner: &Owner,
        now: DateTime<Utc>,
    ) -> Result<SessionView, ApiError> {
        let today = clock::date_key_at(now);
        let pairs = self.puzzle_service.playable_pairs(today).await?;

        let session = match self.load(owner, today).await? {
            Some(existing) => self.ensure_stats_recorded(existing, now).await?,
            None => self.start_session(owner, today, &pairs, now).await?,
        };
        Ok(SessionView::build(&session, &pairs))
    }

    /// Record one choice. Never consumes a try; slots stay editable until the
    /// board is submitted.
    pub async fn select(
        &self,
        owner: &Owner,
        pair_index: usize,
        selected_image_url: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionView, ApiError> {
        let today = clock::date_key_at(now);
        let pairs = self.puzzle_service.playable_pairs(today).await?;

        let was_human_choice = pairs
            .get(pair_index)
            .is_some_and(|pair| pair.human == selected_image_url);

        let session = self
            .mutate(owner, today, &pairs, now, |session| {
                session.record_selection(
                    pair_index,
                    Selection {
                        selected_image_url: selected_image_url.to_string(),
                        was_human_choice,
                    },
                )
            })
            .await?;
        Ok(SessionView::build(&session, &pairs))
    }

    /// Grade the board. A terminal session replays its stored result instead
    /// of re-grading.
    pub async fn submit(
        &self,
        owner: &Owner,
        now: DateTime<Utc>,
    ) -> Result<SubmitResponse, ApiError> {
        let today = clock::date_key_at(now);
        let pairs = self.puzzle_service.playable_pairs(today).await?;

        if let Some(existing) = self.load(owner, today).await? {
            if let Some(outcome) = existing.outcome() {
                SUBMITS_TOTAL.with_label_values(&["replay"]).inc();
                self.ensure_stats_recorded(existing, now).await?;
                return Ok(SubmitResponse::from(outcome));
            }
        }

        let session = self
            .mutate(owner, today, &pairs, now, |session| {
                match session.submit(&pairs) {
                    // Lost a race to another device's terminal submit; the
                    // stored result stands.
                    Err(SessionError::AlreadyComplete) => Ok(()),
                    other => other.map(|_| ()),
                }
            })
            .await?;

        let result_label = match session.status {
            SessionStatus::Won => "won",
            SessionStatus::Lost => "lost",
            _ => "in_progress",
        };
        SUBMITS_TOTAL.with_label_values(&[result_label]).inc();

        let outcome = SubmitOutcome {
            status: session.status,
            correct_count: session.correct_selection_count(),
            tries_remaining: session.tries_remaining,
        };
        if session.is_complete() {
            self.ensure_stats_recorded(session, now).await?;
        }
        Ok(SubmitResponse::from(outcome))
    }

    /// Today's saved selections. Reading never creates a session.
    pub async fn selections(
        &self,
        owner: &Owner,
        now: DateTime<Utc>,
    ) -> Result<Vec<Option<Selection>>, ApiError> {
        let today = clock::date_key_at(now);
        match self.load(owner, today).await? {
            Some(session) => Ok(session.selections),
            None => Ok(vec![None; PAIRS_PER_PUZZLE]),
        }
    }

    /// Replace the whole board in one write (cross-device persistence).
    pub async fn replace_selections(
        &self,
        owner: &Owner,
        inputs: Vec<Option<SelectionInput>>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Option<Selection>>, ApiError> {
        let today = clock::date_key_at(now);
        let pairs = self.puzzle_service.playable_pairs(today).await?;

        let selections: Vec<Option<Selection>> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                input.map(|input| Selection {
                    was_human_choice: pairs
                        .get(index)
                        .is_some_and(|pair| pair.human == input.selected_image_url),
                    selected_image_url: input.selected_image_url,
                })
            })
            .collect();

        let session = self
            .mutate(owner, today, &pairs, now, |session| {
                session.replace_selections(selections.clone())
            })
            .await?;
        Ok(session.selections)
    }

    /// Client-driven try consumption (certain quit paths burn a try). The
    /// model clamps at zero and loses the day there.
    pub async fn decrement_tries(
        &self,
        owner: &Owner,
        now: DateTime<Utc>,
    ) -> Result<PlayerSession, ApiError> {
        let today = clock::date_key_at(now);
        let pairs = self.puzzle_service.playable_pairs(today).await?;
        let session = self
            .mutate(owner, today, &pairs, now, |session| {
                session.decrement_tries();
                Ok(())
            })
            .await?;
        if session.is_complete() {
            return self.ensure_stats_recorded(session, now).await;
        }
        Ok(session)
    }

    /// Restore the full try budget while the day is still playable.
    pub async fn reset_tries(
        &self,
        owner: &Owner,
        now: DateTime<Utc>,
    ) -> Result<PlayerSession, ApiError> {
        let today = clock::date_key_at(now);
        let pairs = self.puzzle_service.playable_pairs(today).await?;
        self.mutate(owner, today, &pairs, now, |session| {
            session.reset_tries();
            Ok(())
        })
        .await
    }

    fn guest_key(id: &str) -> String {
        format!("guest_session:{}", id)
    }

    async fn load(&self, owner: &Owner, date: DateKey) -> Result<Option<PlayerSession>, ApiError> {
        let id = PlayerSession::session_id(owner.id(), date);
        match owner {
            Owner::User(_) => Ok(self.sessions.get(&id).await?),
            Owner::Guest(_) => match self.cache.get(&Self::guest_key(&id)).await? {
                Some(raw) => {
                    let session = serde_json::from_str(&raw).map_err(|e| {
                        ApiError::internal(format!("Stored guest session is unreadable: {}", e))
                    })?;
                    Ok(Some(session))
                }
                None => Ok(None),
            },
        }
    }

    /// Every write refreshes the TTL, so an active guest never loses today's
    /// board mid-game.
    async fn save_guest(&self, session: &PlayerSession) -> Result<(), ApiError> {
        let payload = serde_json::to_string(session)
            .map_err(|e| ApiError::internal(format!("Guest session encode failed: {}", e)))?;
        self.cache
            .set_ex(
                &Self::guest_key(&session.id),
                &payload,
                GUEST_SESSION_TTL_SECONDS,
            )
            .await?;
        Ok(())
    }

    fn fresh_session(
        &self,
        owner: &Owner,
        date: DateKey,
        pairs: &[PlayablePair],
        now: DateTime<Utc>,
    ) -> PlayerSession {
        let order = draw_side_orders(&mut rand::rng(), pairs.len());
        PlayerSession::start(owner.id(), owner.is_guest(), date, order, now)
    }

    async fn start_session(
        &self,
        owner: &Owner,
        date: DateKey,
        pairs: &[PlayablePair],
        now: DateTime<Utc>,
    ) -> Result<PlayerSession, ApiError> {
        let session = self.fresh_session(owner, date, pairs, now);
        let stored = match owner {
            Owner::User(_) => match self.sessions.put_versioned(&session, 0).await {
                Ok(stored) => stored,
                // Another device created it first; theirs wins.
                Err(StoreError::Conflict) => self
                    .sessions
                    .get(&session.id)
                    .await?
                    .ok_or_else(|| ApiError::internal("Session missing after create conflict"))?,
                Err(e) => return Err(e.into()),
            },
            Owner::Guest(_) => {
                self.save_guest(&session).await?;
                session
            }
        };
        GAME_SESSIONS_STARTED_TOTAL
            .with_label_values(&[owner.kind_label()])
            .inc();
        tracing::info!(
            owner_id = %stored.owner_id,
            date = %date,
            guest = stored.is_guest,
            "Started game session"
        );
        Ok(stored)
    }

    /// One read-modify-write of today's session, created on first touch.
    /// Authenticated sessions go through the versioned retry loop; guest
    /// writes are last-write-wins in the cache. Domain errors short-circuit
    /// without burning retry budget.
    async fn mutate<F>(
        &self,
        owner: &Owner,
        date: DateKey,
        pairs: &[PlayablePair],
        now: DateTime<Utc>,
        op: F,
    ) -> Result<PlayerSession, ApiError>
    where
        F: Fn(&mut PlayerSession) -> Result<(), SessionError>,
    {
        let (stored, created) = match owner {
            Owner::User(_) => {
                let id = PlayerSession::session_id(owner.id(), date);
                let aggressive_cfg = RetryConfig::aggressive();
                let outcome = retry_async_with_config(aggressive_cfg, || async {
                    let (mut session, created) = match self.sessions.get(&id).await? {
                        Some(existing) => (existing, false),
                        None => (self.fresh_session(owner, date, pairs, now), true),
                    };
                    match op(&mut session) {
                        Ok(()) => {
                            session.updated_at = now;
                            let expected = session.version;
                            let stored = self.sessions.put_versioned(&session, expected).await?;
                            Ok::<_, StoreError>(Ok((stored, created)))
                        }
                        Err(domain) => Ok(Err(domain)),
                    }
                })
                .await?;
                outcome?
            }
            Owner::Guest(_) => {
                let (mut session, created) = match self.load(owner, date).await? {
                    Some(existing) => (existing, false),
                    None => (self.fresh_session(owner, date, pairs, now), true),
                };
                op(&mut session)?;
                session.updated_at = now;
                self.save_guest(&session).await?;
                (session, created)
            }
        };
        if created {
            GAME_SESSIONS_STARTED_TOTAL
                .with_label_values(&[owner.kind_label()])
                .inc();
        }
        Ok(stored)
    }

    /// Exactly-once hand-off to the statistics engine. The terminal session
    /// is already persisted; the flag flips only after the engine accepted
    /// the completion, so a crash in between retries on the next load. The
    /// engine's same-day idempotence makes that retry safe.
    async fn ensure_stats_recorded(
        &self,
        session: PlayerSession,
        now: DateTime<Utc>,
    ) -> Result<PlayerSession, ApiError> {
        if !session.is_complete() || session.stats_recorded {
            return Ok(session);
        }

        let mut recorded = session.clone();
        recorded.stats_recorded = true;
        recorded.updated_at = now;

        if session.is_guest {
            // Guest aggregates live client-side; just settle the flag.
            self.save_guest(&recorded).await?;
            return Ok(recorded);
        }

        let correct_count = session.correct_selection_count();
        self.stats_service
            .record_completion(
                &session.owner_id,
                correct_count,
                PAIRS_PER_PUZZLE as u32,
                now,
            )
            .await?;

        match self
            .sessions
            .put_versioned(&recorded, recorded.version)
            .await
        {
            Ok(stored) => Ok(stored),
            // Someone else settled the flag first; read their version.
            Err(StoreError::Conflict) => {
                Ok(self.sessions.get(&session.id).await?.unwrap_or(recorded))
            }
            Err(e) => Err(e.into()),
        }
    }
}
