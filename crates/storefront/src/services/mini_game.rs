//! Daily lucky-wheel service.
//!
//! Each visitor gets one spin per calendar day. The backend draws the prize;
//! this service decides whether a spin may happen, works out where the wheel
//! comes to rest, holds the reveal back for the length of the animation and
//! only then records the day as played.
//!
//! Each visitor's [`SpinState`] lives in the gate between requests. The
//! persisted played date seeds it and stays the record across restarts.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;
use rand::Rng;
use serde::Serialize;
use spoke_core::spin::{MAX_FULL_TURNS, MIN_FULL_TURNS, rest_rotation};
use spoke_core::{Clock, Prize, PrizeId, PrizeResult, SpinRejected, SpinState, WheelConfig};
use thiserror::Error;
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::backend::{BackendError, MiniGameApi};
use crate::config::MiniGameConfig;
use crate::models::session::keys;

/// Format the played date is persisted in.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// How long a visitor's spin state is kept without requests.
const STATE_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on spin states held at once.
const MAX_STATES: u64 = 100_000;

type LiveState = Arc<Mutex<SpinState>>;

/// Errors that can occur during a spin.
#[derive(Debug, Error)]
pub enum SpinError {
    /// The gate refused the spin.
    #[error(transparent)]
    Rejected(#[from] SpinRejected),

    /// The backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The played date could not be read or written.
    #[error("Session error: {0}")]
    Store(#[from] tower_sessions::session::Error),
}

/// Where the date of the last spin is kept.
pub trait PlayedDateStore: Send + Sync {
    /// Date of the last completed spin, if any.
    fn last_played(&self) -> impl Future<Output = Result<Option<NaiveDate>, SpinError>> + Send;

    /// Record a completed spin.
    fn record_played(&self, date: NaiveDate) -> impl Future<Output = Result<(), SpinError>> + Send;
}

impl PlayedDateStore for Session {
    async fn last_played(&self) -> Result<Option<NaiveDate>, SpinError> {
        let raw = self.get::<String>(keys::LAST_SPIN_DATE).await?;
        Ok(raw.and_then(|raw| match NaiveDate::parse_from_str(&raw, DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring malformed last spin date");
                None
            }
        }))
    }

    async fn record_played(&self, date: NaiveDate) -> Result<(), SpinError> {
        self.insert(keys::LAST_SPIN_DATE, date.format(DATE_FORMAT).to_string())
            .await?;
        Ok(())
    }
}

/// The wheel as shown on page load.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelView {
    pub prizes: Vec<Prize>,
    pub has_played: bool,
    /// Today's prize, when it was revealed while this gate was running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PrizeResult>,
}

/// A completed spin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinOutcome {
    pub result: PrizeResult,
    /// Clockwise rotation that leaves the won segment under the pointer.
    pub rotation_degrees: f64,
    /// How long to celebrate; absent for a losing prize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub celebrate_for_ms: Option<u64>,
}

/// Once-per-day spin gate.
///
/// Cheap to clone; clones share the visitors' spin states.
pub struct SpinGate<B> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    config: MiniGameConfig,
    states: Cache<String, LiveState>,
}

impl<B> Clone for SpinGate<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            clock: Arc::clone(&self.clock),
            config: self.config,
            states: self.states.clone(),
        }
    }
}

impl<B: MiniGameApi> SpinGate<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, clock: Arc<dyn Clock>, config: MiniGameConfig) -> Self {
        Self {
            backend,
            clock,
            config,
            states: Cache::builder()
                .max_capacity(MAX_STATES)
                .time_to_idle(STATE_IDLE)
                .build(),
        }
    }

    /// The visitor's spin state, brought up to today.
    async fn live_state(
        &self,
        visitor: &str,
        store: &impl PlayedDateStore,
    ) -> Result<LiveState, SpinError> {
        let last_played = store.last_played().await?;
        let today = self.clock.today();
        let live = self
            .states
            .get_with(visitor.to_string(), async {
                Arc::new(Mutex::new(SpinState::mount(last_played, today)))
            })
            .await;
        lock(&live).roll_over(today);
        Ok(live)
    }

    /// The wheel layout, whether today's spin is used up and, after a page
    /// reload, the prize already revealed today.
    ///
    /// # Errors
    ///
    /// Returns error if the layout cannot be fetched or the store read.
    #[instrument(skip(self, store))]
    pub async fn wheel(
        &self,
        visitor: &str,
        store: &impl PlayedDateStore,
    ) -> Result<WheelView, SpinError> {
        let live = self.live_state(visitor, store).await?;
        let (has_played, result) = {
            let state = lock(&live);
            (state.has_played(), state.result().cloned())
        };
        let wheel = self.backend.wheel_config().await?;
        Ok(WheelView {
            prizes: wheel.prizes,
            has_played,
            result,
        })
    }

    /// Spin the wheel for `visitor`.
    ///
    /// Resolves after the reveal delay. The day only counts as played once
    /// the result is revealed; a failed call, or a request dropped before the
    /// reveal, leaves the allowance intact.
    ///
    /// # Errors
    ///
    /// - [`SpinRejected::AlreadySpinning`] while another spin for the same
    ///   visitor is running
    /// - [`SpinRejected::AlreadyPlayed`] if today's spin is used; the backend
    ///   is not called
    /// - [`SpinError::Backend`] if the draw fails
    /// - [`SpinError::Store`] if the played date cannot be read or written
    #[instrument(skip(self, store))]
    pub async fn spin(
        &self,
        visitor: &str,
        store: &impl PlayedDateStore,
    ) -> Result<SpinOutcome, SpinError> {
        let live = self.live_state(visitor, store).await?;
        lock(&live).begin_spin()?;
        let _attempt = SpinAttempt(Arc::clone(&live));

        let mut result = match self.backend.spin_wheel().await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Spin failed; allowance kept");
                return Err(e.into());
            }
        };

        if result.strip_coupon_if_losing() {
            warn!(prize_id = %result.prize.id, "Dropped coupon attached to a losing prize");
        }

        let rotation_degrees = self.rotation_for(&result.prize.id).await;

        tokio::time::sleep(self.config.reveal_delay).await;

        let today = self.clock.today();
        store.record_played(today).await?;
        if !lock(&live).reveal(result.clone(), today) {
            warn!("Spin state reset before the reveal");
        }

        info!(
            prize_id = %result.prize.id,
            prize_type = ?result.prize.prize_type,
            "Spin revealed"
        );

        let celebrate_for_ms = result
            .prize
            .prize_type
            .is_win()
            .then(|| u64::try_from(self.config.celebration.as_millis()).unwrap_or(u64::MAX));

        Ok(SpinOutcome {
            result,
            rotation_degrees,
            celebrate_for_ms,
        })
    }

    /// Rest rotation for the won prize against the cached wheel layout.
    async fn rotation_for(&self, prize_id: &PrizeId) -> f64 {
        let wheel = match self.backend.wheel_config().await {
            Ok(wheel) => wheel,
            Err(e) => {
                warn!(error = %e, "Wheel layout unavailable; wheel will not turn");
                WheelConfig::default()
            }
        };

        let segments = u32::try_from(wheel.prizes.len()).unwrap_or(u32::MAX);
        let index = wheel
            .index_of(prize_id)
            .and_then(|index| u32::try_from(index).ok())
            .unwrap_or_else(|| {
                if segments > 0 {
                    warn!(prize_id = %prize_id, "Won prize is not on the wheel; resting on the first segment");
                }
                0
            });

        let full_turns = rand::rng().random_range(MIN_FULL_TURNS..=MAX_FULL_TURNS);
        rest_rotation(index, segments, full_turns)
    }
}

/// Hands the allowance back unless the spin it guards was revealed.
struct SpinAttempt(LiveState);

impl Drop for SpinAttempt {
    fn drop(&mut self) {
        lock(&self.0).fail_spin();
    }
}

fn lock(state: &Mutex<SpinState>) -> MutexGuard<'_, SpinState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use spoke_core::{Coupon, CouponExpiry, FixedClock, PrizeType};

    use super::*;

    #[derive(Default)]
    struct MemoryDates(Mutex<Option<NaiveDate>>);

    impl PlayedDateStore for MemoryDates {
        async fn last_played(&self) -> Result<Option<NaiveDate>, SpinError> {
            Ok(*self.0.lock().unwrap())
        }

        async fn record_played(&self, date: NaiveDate) -> Result<(), SpinError> {
            *self.0.lock().unwrap() = Some(date);
            Ok(())
        }
    }

    struct FakeGame {
        spins: AtomicUsize,
        wheel: WheelConfig,
        /// `None` answers with a 500.
        results: Mutex<Vec<Option<PrizeResult>>>,
    }

    impl FakeGame {
        fn new(results: Vec<Option<PrizeResult>>) -> Self {
            Self {
                spins: AtomicUsize::new(0),
                wheel: WheelConfig {
                    prizes: vec![
                        prize("p-10", PrizeType::Discount),
                        prize("p-ship", PrizeType::Freeship),
                        prize("p-gift", PrizeType::Gift),
                        prize("p-none", PrizeType::None),
                    ],
                },
                results: Mutex::new(results),
            }
        }
    }

    impl MiniGameApi for FakeGame {
        async fn wheel_config(&self) -> Result<WheelConfig, BackendError> {
            Ok(self.wheel.clone())
        }

        async fn spin_wheel(&self) -> Result<PrizeResult, BackendError> {
            self.spins.fetch_add(1, Ordering::SeqCst);
            let next = self.results.lock().unwrap().remove(0);
            // Leave time for a second request to overlap
            tokio::time::sleep(Duration::from_millis(200)).await;
            next.ok_or(BackendError::Api {
                status: 500,
                message: "draw failed".to_string(),
            })
        }
    }

    fn prize(id: &str, prize_type: PrizeType) -> Prize {
        Prize {
            id: PrizeId::new(id),
            name: id.to_string(),
            name_vi: String::new(),
            color: None,
            prize_type,
            discount: (prize_type == PrizeType::Discount).then_some(Decimal::TEN),
        }
    }

    fn won(id: &str, prize_type: PrizeType) -> PrizeResult {
        PrizeResult {
            prize: prize(id, prize_type),
            coupon: Some(Coupon {
                code: "SPIN-7Q2X".to_string(),
                valid_until: CouponExpiry::At(Utc.with_ymd_and_hms(2026, 10, 24, 0, 0, 0).unwrap()),
                description: String::new(),
            }),
            message: String::new(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    struct SharedClock(Arc<Mutex<NaiveDate>>);

    impl Clock for SharedClock {
        fn today(&self) -> NaiveDate {
            *self.0.lock().unwrap()
        }
    }

    fn gate(game: FakeGame) -> (Arc<FakeGame>, SpinGate<FakeGame>) {
        let game = Arc::new(game);
        let gate = SpinGate::new(
            Arc::clone(&game),
            Arc::new(FixedClock(day(17))),
            MiniGameConfig::default(),
        );
        (game, gate)
    }

    #[tokio::test]
    async fn test_played_today_rejected_without_network() {
        let (game, gate) = gate(FakeGame::new(vec![Some(won("p-gift", PrizeType::Gift))]));
        let store = MemoryDates(Mutex::new(Some(day(17))));

        let err = gate.spin("visitor-a", &store).await.unwrap_err();
        assert!(matches!(err, SpinError::Rejected(SpinRejected::AlreadyPlayed)));
        assert_eq!(game.spins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_date_recorded_only_after_reveal() {
        let (_game, gate) = gate(FakeGame::new(vec![Some(won("p-gift", PrizeType::Gift))]));
        let store = MemoryDates(Mutex::new(Some(day(16))));
        let started = tokio::time::Instant::now();

        let (outcome, ()) = tokio::join!(gate.spin("visitor-a", &store), async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(*store.0.lock().unwrap(), Some(day(16)));
        });

        let outcome = outcome.unwrap();
        assert!(started.elapsed() >= MiniGameConfig::default().reveal_delay);
        assert_eq!(*store.0.lock().unwrap(), Some(day(17)));
        assert_eq!(outcome.celebrate_for_ms, Some(5_000));
        assert!(outcome.result.visible_coupon().is_some());

        // Reopening the same day shows the prize again
        let view = gate.wheel("visitor-a", &store).await.unwrap();
        assert!(view.has_played);
        assert_eq!(view.result.unwrap().prize.id, PrizeId::new("p-gift"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_spin_keeps_allowance() {
        let (game, gate) = gate(FakeGame::new(vec![
            None,
            Some(won("p-10", PrizeType::Discount)),
        ]));
        let store = MemoryDates(Mutex::new(Some(day(16))));

        let err = gate.spin("visitor-a", &store).await.unwrap_err();
        assert!(matches!(err, SpinError::Backend(_)));
        assert_eq!(*store.0.lock().unwrap(), Some(day(16)));
        assert!(!gate.wheel("visitor-a", &store).await.unwrap().has_played);

        gate.spin("visitor-a", &store).await.unwrap();
        assert_eq!(game.spins.load(Ordering::SeqCst), 2);
        assert_eq!(*store.0.lock().unwrap(), Some(day(17)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_losing_prize_never_shows_coupon() {
        let (_game, gate) = gate(FakeGame::new(vec![Some(won("p-none", PrizeType::None))]));
        let store = MemoryDates::default();

        let outcome = gate.spin("visitor-a", &store).await.unwrap();
        assert_eq!(outcome.result.coupon, None);
        assert_eq!(outcome.celebrate_for_ms, None);
        assert_eq!(*store.0.lock().unwrap(), Some(day(17)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_rests_on_won_segment() {
        let (_game, gate) = gate(FakeGame::new(vec![Some(won("p-gift", PrizeType::Gift))]));
        let outcome = gate.spin("visitor-a", &MemoryDates::default()).await.unwrap();

        // 4 segments of 90°, segment 2 is centred on 225°
        let rotation = outcome.rotation_degrees;
        assert!((rotation % 360.0 - 135.0).abs() < 1e-9, "rotation {rotation}");
        let turns = (rotation / 360.0).floor();
        assert!((5.0..=8.0).contains(&turns), "turns {turns}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_prize_rests_on_first_segment() {
        let (_game, gate) = gate(FakeGame::new(vec![Some(won("p-retired", PrizeType::Gift))]));
        let outcome = gate.spin("visitor-a", &MemoryDates::default()).await.unwrap();
        assert!((outcome.rotation_degrees % 360.0 - 315.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_spin_is_rejected() {
        let (game, gate) = gate(FakeGame::new(vec![Some(won("p-gift", PrizeType::Gift))]));
        let store = MemoryDates::default();

        let (first, second) = tokio::join!(gate.spin("visitor-a", &store), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            gate.spin("visitor-a", &store).await
        });

        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(SpinError::Rejected(SpinRejected::AlreadySpinning))
        ));
        assert_eq!(game.spins.load(Ordering::SeqCst), 1);

        // Once finished, the same visitor is told they have played
        let third = gate.spin("visitor-a", &store).await.unwrap_err();
        assert!(matches!(third, SpinError::Rejected(SpinRejected::AlreadyPlayed)));
    }

    #[tokio::test]
    async fn test_wheel_view() {
        let (_game, gate) = gate(FakeGame::new(vec![]));
        let view = gate
            .wheel("visitor-a", &MemoryDates::default())
            .await
            .unwrap();
        assert_eq!(view.prizes.len(), 4);
        assert!(!view.has_played);
        assert!(view.result.is_none());

        let view = gate
            .wheel("visitor-b", &MemoryDates(Mutex::new(Some(day(17)))))
            .await
            .unwrap();
        assert!(view.has_played);
        assert!(view.result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_spin_hands_allowance_back() {
        let (game, gate) = gate(FakeGame::new(vec![
            Some(won("p-gift", PrizeType::Gift)),
            Some(won("p-10", PrizeType::Discount)),
        ]));
        let store = MemoryDates::default();

        // The visitor leaves while the wheel is still turning
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), gate.spin("visitor-a", &store)).await;
        assert!(abandoned.is_err());
        assert_eq!(*store.0.lock().unwrap(), None);

        let outcome = gate.spin("visitor-a", &store).await.unwrap();
        assert_eq!(outcome.result.prize.id, PrizeId::new("p-10"));
        assert_eq!(game.spins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_wheel_rolls_over_at_midnight() {
        let game = Arc::new(FakeGame::new(vec![
            Some(won("p-gift", PrizeType::Gift)),
            Some(won("p-ship", PrizeType::Freeship)),
        ]));
        let today = Arc::new(Mutex::new(day(17)));
        let gate = SpinGate::new(
            Arc::clone(&game),
            Arc::new(SharedClock(Arc::clone(&today))),
            MiniGameConfig::default(),
        );
        let store = MemoryDates::default();

        gate.spin("visitor-a", &store).await.unwrap();
        let err = gate.spin("visitor-a", &store).await.unwrap_err();
        assert!(matches!(err, SpinError::Rejected(SpinRejected::AlreadyPlayed)));

        *today.lock().unwrap() = day(18);
        let view = gate.wheel("visitor-a", &store).await.unwrap();
        assert!(!view.has_played);
        assert!(view.result.is_none());

        gate.spin("visitor-a", &store).await.unwrap();
        assert_eq!(*store.0.lock().unwrap(), Some(day(18)));
    }
}
