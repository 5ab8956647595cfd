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

/// Overrides the configured worker priority (0-99).
const PRIORITY_ENV: &str = "INJECTOR_THREAD_PRIORITY";

/// Disables SCHED_FIFO for the worker even when configured.
const DISABLE_RT_ENV: &str = "INJECTOR_DISABLE_RT";

/// Resolves the worker priority. The environment takes precedence over the
/// configured value; out-of-range values are ignored.
pub fn worker_thread_priority(configured: Option<u8>) -> Option<ThreadPriorityValue> {
    std::env::var(PRIORITY_ENV)
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .or(configured)
        .filter(|n| *n < 100)
        .and_then(|n| ThreadPriorityValue::try_from(n).ok())
}

pub(crate) fn env_flag(name: &str) -> bool {
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

/// Returns whether SCHED_FIFO should be requested for the worker.
pub fn rt_enabled(configured: bool) -> bool {
    configured && !env_flag(DISABLE_RT_ENV)
}

/// Applies the priority to the calling thread. Failures are logged and ignored.
pub fn configure_worker_thread_priority(priority: ThreadPriorityValue, realtime: bool) {
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(error = ?e, "Failed to set scheduler thread priority");
    }

    #[cfg(unix)]
    if realtime {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for scheduler thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for scheduler thread"
                );
            }
        }
    }

    #[cfg(not(unix))]
    let _ = realtime;
}
