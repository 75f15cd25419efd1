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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the audio callback thread when NOTESAMPLER_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// Reads NOTESAMPLER_THREAD_PRIORITY (0-99) once, before the stream is built, so the
/// callback never touches the environment.
pub(crate) fn callback_thread_priority() -> ThreadPriority {
    let requested = std::env::var("NOTESAMPLER_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_CALLBACK_THREAD_PRIORITY);

    match ThreadPriorityValue::try_from(requested) {
        Ok(value) => ThreadPriority::Crossplatform(value),
        Err(_) => ThreadPriority::Max,
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Whether to attempt SCHED_FIFO for the audio callback thread.
/// Opt out with NOTESAMPLER_DISABLE_RT_AUDIO=1.
pub(crate) fn rt_audio_enabled() -> bool {
    !env_flag("NOTESAMPLER_DISABLE_RT_AUDIO")
}

/// Raises the priority of the calling thread. Only does work the first time it
/// is called from a given callback.
pub(crate) fn configure_audio_thread_priority(
    priority: ThreadPriority,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    let _ = set_current_thread_priority(priority);

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled RT SCHED_FIFO for audio callback thread"),
            Err(e) => warn!(error = %e, "Failed to set RT SCHED_FIFO for audio callback thread"),
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;

    *priority_set = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_flag() {
        std::env::set_var("NOTESAMPLER_TEST_FLAG_ON", "yes");
        std::env::set_var("NOTESAMPLER_TEST_FLAG_OFF", "0");
        assert!(env_flag("NOTESAMPLER_TEST_FLAG_ON"));
        assert!(!env_flag("NOTESAMPLER_TEST_FLAG_OFF"));
        assert!(!env_flag("NOTESAMPLER_TEST_FLAG_UNSET"));
    }
}
