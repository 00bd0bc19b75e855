use crate::ports::clock::Clock;
use chrono::{DateTime, Utc};

/// システム時計
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
