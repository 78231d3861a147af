//! Local monotonic counter + Berkeley averaging across known peers
//! (spec.md §4.4, grounded on `server/chord/timer.py`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::info;

use crate::core::{sleep_or_shutdown, ChordNode};
use crate::id::Id;

pub const TIMER_TICK_PERIOD: Duration = Duration::from_secs(1);

struct TimerState {
    time_counter: i64,
    node_timers: HashMap<Id, i64>,
}

pub struct Timer {
    self_id: Id,
    state: Mutex<TimerState>,
}

fn wall_clock_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Timer {
    pub fn new(self_id: Id) -> Self {
        let now = wall_clock_secs();
        let mut node_timers = HashMap::new();
        node_timers.insert(self_id, now);
        Timer {
            self_id,
            state: Mutex::new(TimerState {
                time_counter: now,
                node_timers,
            }),
        }
    }

    pub fn now(&self) -> i64 {
        self.state.lock().unwrap().time_counter
    }

    /// `update_time` loop body: increments the local counter by one second.
    pub fn tick(&self) {
        let mut state = self.state.lock().unwrap();
        state.time_counter += 1;
        let time_counter = state.time_counter;
        state.node_timers.insert(self.self_id, time_counter);
    }

    /// `floor(sum(observed) / count(observed))` over all known node timers.
    pub fn berkeley_average(&self) -> i64 {
        let state = self.state.lock().unwrap();
        if state.node_timers.is_empty() {
            return state.time_counter;
        }
        let total: i64 = state.node_timers.values().sum();
        total / state.node_timers.len() as i64
    }

    /// Inbound `PING_LEADER` handler: record the sender's clock, recompute
    /// the Berkeley average, adopt it locally, and return the new value.
    pub fn observe_and_average(&self, sender_id: Id, sender_time: i64) -> i64 {
        {
            let mut state = self.state.lock().unwrap();
            state.node_timers.insert(sender_id, sender_time);
        }
        let avg = self.berkeley_average();
        let mut state = self.state.lock().unwrap();
        state.time_counter = avg;
        state.node_timers.insert(self.self_id, avg);
        avg
    }

    /// Outbound `check_leader` adopts whatever the leader returns.
    pub fn adopt(&self, new_time: i64) {
        let mut state = self.state.lock().unwrap();
        state.time_counter = new_time;
        state.node_timers.insert(self.self_id, new_time);
    }
}

impl ChordNode {
    /// `update_time` loop: ticks the local clock once a second.
    pub async fn timer_tick_loop(self: Arc<Self>) {
        info!("timer tick loop started");
        let mut shutdown = self.shutdown_signal();
        loop {
            self.timer.tick();
            if sleep_or_shutdown(TIMER_TICK_PERIOD, &mut shutdown).await {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_of(n: u8) -> Id {
        Id::from_slice(&[n])
    }

    #[test]
    fn tick_increments_counter() {
        let timer = Timer::new(id_of(1));
        let before = timer.now();
        timer.tick();
        assert_eq!(timer.now(), before + 1);
    }

    #[test]
    fn berkeley_average_with_single_node_is_self() {
        let timer = Timer::new(id_of(1));
        let now = timer.now();
        assert_eq!(timer.berkeley_average(), now);
    }

    #[test]
    fn observe_and_average_moves_toward_peers() {
        let timer = Timer::new(id_of(1));
        let self_time = timer.now();
        let avg = timer.observe_and_average(id_of(2), self_time + 10);
        assert_eq!(avg, self_time + 5);
        assert_eq!(timer.now(), avg);
    }
}
