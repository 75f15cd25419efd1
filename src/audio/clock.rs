// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The shared audio clock.
//!
//! Time is counted in frames rendered by the output, so it only moves forward
//! and it moves exactly as fast as the hardware consumes audio.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use super::OutputError;

/// Lifecycle state of the output behind a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    /// Created but not yet confirmed as rendering.
    Suspended,
    /// The output is rendering and the clock is advancing.
    Running,
    /// The output has been torn down. Terminal.
    Closed,
}

/// Converts a time in seconds to the nearest frame at the given rate. Negative
/// times map to frame zero.
pub fn seconds_to_frame(seconds: f64, sample_rate: u32) -> u64 {
    (seconds * f64::from(sample_rate)).round().max(0.0) as u64
}

/// A monotonic clock measured in rendered frames.
pub struct Clock {
    /// Frames rendered since the output was created.
    frames: AtomicU64,
    /// Frames per second.
    sample_rate: u32,
    /// Lifecycle state, observable by waiters.
    state: watch::Sender<ClockState>,
}

impl Clock {
    /// Creates a suspended clock at frame zero.
    pub fn new(sample_rate: u32) -> Clock {
        let (state, _) = watch::channel(ClockState::Suspended);
        Clock {
            frames: AtomicU64::new(0),
            sample_rate,
            state,
        }
    }

    /// Returns the current time in seconds.
    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Returns the number of frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Returns the sample rate the clock counts in.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Converts an absolute time in seconds to the nearest frame. Negative
    /// times map to frame zero.
    pub fn seconds_to_frame(&self, seconds: f64) -> u64 {
        seconds_to_frame(seconds, self.sample_rate)
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ClockState {
        *self.state.borrow()
    }

    /// Moves the clock forward after a block has been rendered.
    pub(crate) fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    /// Marks the clock as running. Has no effect once closed.
    pub(crate) fn mark_running(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ClockState::Suspended {
                *state = ClockState::Running;
                true
            } else {
                false
            }
        });
        if changed {
            info!(sample_rate = self.sample_rate, "Audio clock running");
        }
    }

    /// Closes the clock. Idempotent.
    pub(crate) fn close(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state != ClockState::Closed {
                *state = ClockState::Closed;
                true
            } else {
                false
            }
        });
        if changed {
            info!(frames = self.frames(), "Audio clock closed");
        }
    }

    /// Waits until the clock is running, or fails if it is closed or does not
    /// start within the timeout.
    pub async fn wait_running(&self, timeout: Duration) -> Result<(), OutputError> {
        let mut rx = self.state.subscribe();
        let result = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| *state != ClockState::Suspended),
        )
        .await;
        let state = match result {
            Ok(Ok(state)) => *state,
            Ok(Err(_)) => ClockState::Closed,
            Err(_) => return Err(OutputError::NotResumed(timeout)),
        };

        match state {
            ClockState::Running => Ok(()),
            _ => Err(OutputError::Closed),
        }
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_monotonically() {
        let clock = Clock::new(48000);
        assert_eq!(clock.now(), 0.0);

        clock.advance(24000);
        assert_eq!(clock.now(), 0.5);
        let before = clock.now();
        clock.advance(0);
        assert!(clock.now() >= before);
        clock.advance(24000);
        assert_eq!(clock.now(), 1.0);
        assert_eq!(clock.frames(), 48000);
    }

    #[test]
    fn test_seconds_to_frame() {
        let clock = Clock::new(44100);
        assert_eq!(clock.seconds_to_frame(1.0), 44100);
        assert_eq!(clock.seconds_to_frame(0.1), 4410);
        assert_eq!(clock.seconds_to_frame(-1.0), 0);
        assert_eq!(seconds_to_frame(0.5, 48000), 24000);
    }

    #[test]
    fn test_state_transitions() {
        let clock = Clock::new(44100);
        assert_eq!(clock.state(), ClockState::Suspended);

        clock.mark_running();
        assert_eq!(clock.state(), ClockState::Running);

        // Resuming again is a no-op.
        clock.mark_running();
        assert_eq!(clock.state(), ClockState::Running);

        clock.close();
        assert_eq!(clock.state(), ClockState::Closed);

        // Closed is terminal.
        clock.mark_running();
        assert_eq!(clock.state(), ClockState::Closed);
    }

    #[tokio::test]
    async fn test_wait_running() {
        let clock = std::sync::Arc::new(Clock::new(44100));

        let waiter = {
            let clock = clock.clone();
            tokio::spawn(async move { clock.wait_running(Duration::from_secs(5)).await })
        };
        clock.mark_running();
        assert!(waiter.await.unwrap().is_ok());

        // Already running returns immediately.
        assert!(clock.wait_running(Duration::from_millis(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_running_timeout() {
        let clock = Clock::new(44100);
        let result = clock.wait_running(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(OutputError::NotResumed(_))));
    }

    #[tokio::test]
    async fn test_wait_running_closed() {
        let clock = Clock::new(44100);
        clock.close();
        let result = clock.wait_running(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(OutputError::Closed)));
    }
}
