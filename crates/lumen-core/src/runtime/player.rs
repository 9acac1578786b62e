// SPDX-License-Identifier: Apache-2.0
//! The player transport: owns unbounded wall time, derives model time from
//! the program's [`TimeModel`], and applies a view policy (play / pause /
//! scrub / loop) on top (§2, §4.1).
//!
//! Looping is a *view* policy for finite time models only: it is equivalent
//! to moving the play head back to zero and is never expressed as graph
//! feedback. Per the source this implementation follows, a view-side loop
//! wrap is a display affordance and synthesizes no `wrapEvent` — the player
//! wraps `tModelMs` back into range before the executor ever derives time
//! from it, so `TimeDerive`'s own clamp-at-bound never fires while looping
//! is enabled. Scrubbing adjusts `tModelMs` directly and never touches
//! `StateBuffer`; stateful operators simply observe the jump next frame.
use crate::ir::program::TimeModel;

/// Sustained run state: mutually exclusive, toggled by the host
/// (`play`/`pause`), independent of the one-shot `scrub` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Wall time advances and is reflected into model time every frame.
    Playing,
    /// Wall time is still tracked, but model time is frozen.
    Paused,
}

/// Host-supplied initial transport configuration, constructed once and
/// passed to [`Player::new`], in the style of the teacher's sandbox
/// configuration structs.
#[derive(Debug, Clone, Copy)]
pub struct PlayerConfig {
    /// Initial run state.
    pub run_state: RunState,
    /// Whether a finite time model's play head should wrap to zero at its
    /// duration instead of clamping and holding.
    pub loop_enabled: bool,
    /// Absolute wall-time origin in milliseconds, usually `0.0`.
    pub initial_t_abs_ms: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            run_state: RunState::Playing,
            loop_enabled: false,
            initial_t_abs_ms: 0.0,
        }
    }
}

/// Owns `tAbsMs`/`tModelMs` across frames and applies the current view
/// policy when advancing.
#[derive(Debug, Clone, Copy)]
pub struct Player {
    time_model: TimeModel,
    run_state: RunState,
    loop_enabled: bool,
    t_abs_ms: f64,
    t_model_ms: f64,
}

impl Player {
    /// Builds a player for the given program time topology.
    #[must_use]
    pub fn new(time_model: TimeModel, config: PlayerConfig) -> Self {
        Self {
            time_model,
            run_state: config.run_state,
            loop_enabled: config.loop_enabled,
            t_abs_ms: config.initial_t_abs_ms,
            t_model_ms: 0.0,
        }
    }

    /// Switches to the playing run state; model time resumes advancing.
    pub fn play(&mut self) {
        self.run_state = RunState::Playing;
    }

    /// Switches to the paused run state; model time freezes at its current
    /// value while wall time keeps accumulating underneath.
    pub fn pause(&mut self) {
        self.run_state = RunState::Paused;
    }

    /// Returns true if the player is currently playing.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.run_state == RunState::Playing
    }

    /// Enables or disables loop-at-duration for finite time models. Has no
    /// effect under [`TimeModel::Infinite`].
    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    /// Jumps model time directly to `t_model_ms`, clamped to the time
    /// model's valid range. `StateBuffer` contents are never touched by a
    /// scrub; stateful operators see the new time on their next sample.
    pub fn scrub_to(&mut self, t_model_ms: f64) {
        self.t_model_ms = clamp_to_model(self.time_model, t_model_ms.max(0.0));
    }

    /// Advances wall time by `dt_wall_ms` and, if playing, reflects the
    /// advance into model time under the current time model and loop
    /// policy. Returns the resulting `(tAbsMs, tModelMs)` pair for the
    /// executor's `TimeDerive` step.
    pub fn advance(&mut self, dt_wall_ms: f64) -> (f64, f64) {
        self.t_abs_ms += dt_wall_ms;
        if self.run_state == RunState::Playing {
            self.t_model_ms += dt_wall_ms;
            self.t_model_ms = match self.time_model {
                TimeModel::Infinite => self.t_model_ms,
                TimeModel::Finite { duration_ms } if duration_ms > 0.0 => {
                    if self.loop_enabled && self.t_model_ms >= duration_ms {
                        self.t_model_ms.rem_euclid(duration_ms)
                    } else {
                        self.t_model_ms.min(duration_ms)
                    }
                }
                TimeModel::Finite { .. } => 0.0,
            };
        }
        (self.t_abs_ms, self.t_model_ms)
    }

    /// Current absolute wall time in milliseconds.
    #[must_use]
    pub fn t_abs_ms(&self) -> f64 {
        self.t_abs_ms
    }

    /// Current model time in milliseconds.
    #[must_use]
    pub fn t_model_ms(&self) -> f64 {
        self.t_model_ms
    }
}

fn clamp_to_model(time_model: TimeModel, t_model_ms: f64) -> f64 {
    match time_model {
        TimeModel::Infinite => t_model_ms,
        TimeModel::Finite { duration_ms } => t_model_ms.clamp(0.0, duration_ms.max(0.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_player_accumulates_wall_time_but_not_model_time() {
        let mut player = Player::new(TimeModel::Infinite, PlayerConfig::default());
        player.pause();
        let (t_abs, t_model) = player.advance(500.0);
        assert_eq!(t_abs, 500.0);
        assert_eq!(t_model, 0.0);
    }

    #[test]
    fn infinite_model_never_clamps() {
        let mut player = Player::new(TimeModel::Infinite, PlayerConfig::default());
        let (_, t_model) = player.advance(10_000.0);
        assert_eq!(t_model, 10_000.0);
    }

    #[test]
    fn finite_model_clamps_and_holds_without_loop() {
        let mut player = Player::new(TimeModel::Finite { duration_ms: 1000.0 }, PlayerConfig::default());
        let (_, t_model) = player.advance(1500.0);
        assert_eq!(t_model, 1000.0);
    }

    #[test]
    fn finite_model_wraps_to_zero_with_loop_enabled() {
        let config = PlayerConfig {
            loop_enabled: true,
            ..PlayerConfig::default()
        };
        let mut player = Player::new(TimeModel::Finite { duration_ms: 1000.0 }, config);
        let (_, t_model) = player.advance(1200.0);
        assert!((0.0..1000.0).contains(&t_model));
        assert!((t_model - 200.0).abs() < 1e-9);
    }

    #[test]
    fn scrub_does_not_require_playing() {
        let mut player = Player::new(TimeModel::Finite { duration_ms: 1000.0 }, PlayerConfig::default());
        player.pause();
        player.scrub_to(750.0);
        assert_eq!(player.t_model_ms(), 750.0);
    }

    #[test]
    fn scrub_clamps_to_finite_bounds() {
        let mut player = Player::new(TimeModel::Finite { duration_ms: 1000.0 }, PlayerConfig::default());
        player.scrub_to(5000.0);
        assert_eq!(player.t_model_ms(), 1000.0);
    }
}
