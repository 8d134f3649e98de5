//! The game command machine and match timer.
//!
//! ```text
//! Idle    --START-->   Running
//! Running --PAUSE-->   Paused     Running --STOP--> Idle
//! Paused  --UNPAUSE--> Running    Paused  --STOP--> Idle
//! any     --RESET-->   same state, stats and runtime cleared
//! ```

use rayz_core::net::frames::GameCommandKind;
use rayz_core::time::{ms_since, reached};

use crate::events::Event;
use crate::Engine;

impl Engine {
    /// Executes a game command. Illegal transitions are `Rejected` with
    /// a short reason and leave the state untouched.
    pub fn game_command(
        &mut self,
        cmd: GameCommandKind,
        now_ms: u32,
    ) -> Result<Vec<Event>, &'static str> {
        match cmd {
            GameCommandKind::Start => {
                if self.timer.running {
                    return Err("already running");
                }
                self.timer.running = true;
                self.timer.paused = false;
                self.timer.game_over_latched = false;
                self.timer.end_time_ms = if self.rules.game_duration_s > 0 {
                    now_ms.wrapping_add(self.rules.game_duration_s.saturating_mul(1_000))
                } else {
                    0
                };
                tracing::info!(
                    duration_s = self.rules.game_duration_s,
                    "game started"
                );
                Ok(Vec::new())
            },
            GameCommandKind::Stop => {
                if !self.timer.running {
                    return Err("not running");
                }
                self.timer.running = false;
                self.timer.paused = false;
                self.timer.end_time_ms = 0;
                tracing::info!("game stopped");
                Ok(Vec::new())
            },
            GameCommandKind::Reset => {
                self.reset_stats();
                Ok(Vec::new())
            },
            GameCommandKind::Pause => {
                if !self.timer.running || self.timer.paused {
                    return Err("not running");
                }
                self.timer.paused = true;
                self.timer.pause_started_ms = now_ms;
                Ok(Vec::new())
            },
            GameCommandKind::Unpause => {
                if !self.timer.paused {
                    return Err("not paused");
                }
                // Push the deadline out by however long we sat paused.
                if self.timer.end_time_ms != 0 {
                    let paused_for = ms_since(now_ms, self.timer.pause_started_ms);
                    self.timer.end_time_ms = self.timer.end_time_ms.wrapping_add(paused_for);
                }
                self.timer.paused = false;
                Ok(Vec::new())
            },
        }
    }

    /// Match-timer expiry, driven by the 100 ms tick.
    pub(crate) fn tick_session(&mut self, now_ms: u32) -> Vec<Event> {
        if self.timer.running
            && !self.timer.paused
            && self.timer.end_time_ms != 0
            && reached(now_ms, self.timer.end_time_ms)
        {
            self.timer.running = false;
            self.timer.game_over_latched = true;
            self.timer.end_time_ms = 0;
            tracing::info!("game over (time limit)");
            return vec![Event::GameOver];
        }
        Vec::new()
    }

    /// Seconds left on the match timer; `None` when the timer is off.
    pub fn remaining_time_s(&self, now_ms: u32) -> Option<u32> {
        if !self.timer.running || self.timer.end_time_ms == 0 {
            return None;
        }
        let reference = if self.timer.paused {
            self.timer.pause_started_ms
        } else {
            now_ms
        };
        if reached(reference, self.timer.end_time_ms) {
            Some(0)
        } else {
            Some(ms_since(self.timer.end_time_ms, reference) / 1_000)
        }
    }
}
