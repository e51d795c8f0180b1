//! Once-per-day lucky-wheel gate and prize reveal.
//!
//! ```text
//! mount ──► Idle { has_played: false } ──spin──► Spinning ──reveal──► Revealed(result)
//!   │                ▲                              │
//!   │                └─────────── spin failed ──────┘
//!   └─(played today)─► Idle { has_played: true }
//! ```
//!
//! The day is a calendar date supplied by a [`Clock`], never an elapsed-time
//! window, so a spin at 23:59 and another at 00:01 are two different days.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::PrizeResult;

/// Minimum whole turns the wheel makes before coming to rest.
pub const MIN_FULL_TURNS: u32 = 5;
/// Maximum whole turns the wheel makes before coming to rest.
pub const MAX_FULL_TURNS: u32 = 8;

/// Source of "today".
///
/// The same clock must be used when the played date is written and when it
/// is read back, otherwise a visitor near midnight can get two spins or none.
pub trait Clock: Send + Sync {
    /// The current calendar date.
    fn today(&self) -> NaiveDate;
}

/// The process's local wall-clock date.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// A clock stuck on one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Why a spin was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpinRejected {
    /// Today's spin has been used.
    #[error("already played today")]
    AlreadyPlayed,
    /// A spin is in flight.
    #[error("a spin is already in progress")]
    AlreadySpinning,
}

/// Where the widget is in its daily cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpinPhase {
    /// Waiting for the spin button.
    Idle {
        /// Whether today's spin is used up.
        has_played: bool,
    },
    /// Waiting for the backend's prize and the wheel animation.
    Spinning,
    /// Showing the prize the backend chose.
    Revealed(Box<PrizeResult>),
}

/// Spin gate state for one visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinState {
    last_played: Option<NaiveDate>,
    phase: SpinPhase,
}

impl SpinState {
    /// Build the state from the persisted last-played date.
    #[must_use]
    pub fn mount(last_played: Option<NaiveDate>, today: NaiveDate) -> Self {
        Self {
            last_played,
            phase: SpinPhase::Idle {
                has_played: last_played == Some(today),
            },
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> &SpinPhase {
        &self.phase
    }

    /// Date of the last completed spin.
    #[must_use]
    pub const fn last_played(&self) -> Option<NaiveDate> {
        self.last_played
    }

    /// Whether today's spin is used up.
    #[must_use]
    pub const fn has_played(&self) -> bool {
        matches!(
            self.phase,
            SpinPhase::Idle { has_played: true } | SpinPhase::Revealed(_)
        )
    }

    /// Whether a spin is in flight.
    #[must_use]
    pub const fn is_spinning(&self) -> bool {
        matches!(self.phase, SpinPhase::Spinning)
    }

    /// The revealed result, if any.
    #[must_use]
    pub fn result(&self) -> Option<&PrizeResult> {
        match &self.phase {
            SpinPhase::Revealed(result) => Some(result),
            _ => None,
        }
    }

    /// Re-check the gate after the calendar day may have changed.
    ///
    /// A widget left open past midnight becomes spinnable again. An in-flight
    /// spin is left alone.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.is_spinning() || self.last_played == Some(today) {
            return;
        }
        self.phase = SpinPhase::Idle { has_played: false };
    }

    /// `Idle(has_played = false)` → `Spinning`.
    ///
    /// # Errors
    ///
    /// Refuses when today's spin is used or one is already in flight; the
    /// state is unchanged in that case.
    pub fn begin_spin(&mut self) -> Result<(), SpinRejected> {
        match self.phase {
            SpinPhase::Idle { has_played: false } => {
                self.phase = SpinPhase::Spinning;
                Ok(())
            }
            SpinPhase::Spinning => Err(SpinRejected::AlreadySpinning),
            SpinPhase::Idle { has_played: true } | SpinPhase::Revealed(_) => {
                Err(SpinRejected::AlreadyPlayed)
            }
        }
    }

    /// `Spinning` → `Idle(has_played = false)`; the attempt does not count.
    pub fn fail_spin(&mut self) {
        if self.is_spinning() {
            self.phase = SpinPhase::Idle { has_played: false };
        }
    }

    /// `Spinning` → `Revealed(result)`, recording `today` as played.
    ///
    /// Returns `false` and changes nothing if no spin was in flight.
    #[must_use]
    pub fn reveal(&mut self, result: PrizeResult, today: NaiveDate) -> bool {
        if !self.is_spinning() {
            return false;
        }
        self.last_played = Some(today);
        self.phase = SpinPhase::Revealed(Box::new(result));
        true
    }
}

/// Rotation, in degrees clockwise, that brings the centre of segment `index`
/// under a pointer at the top after `full_turns` whole turns.
///
/// A wheel with no segments does not move.
#[must_use]
pub fn rest_rotation(index: u32, segments: u32, full_turns: u32) -> f64 {
    if segments == 0 {
        return 0.0;
    }
    let segment = 360.0 / f64::from(segments);
    let centre = f64::from(index % segments).mul_add(segment, segment / 2.0);
    f64::from(full_turns).mul_add(360.0, 360.0 - centre)
}
