use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::definition::Extra;

/// Unit of a timer duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Number of seconds in one unit.
    pub const fn seconds(self) -> f64 {
        match self {
            Self::Seconds => 1.0,
            Self::Minutes => 60.0,
            Self::Hours => 3_600.0,
            Self::Days => 86_400.0,
        }
    }
}

/// Timer behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimerType {
    #[default]
    Delay,
    Wait,
    Schedule,
}

/// Payload of a `timer` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerData {
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub unit: TimeUnit,
    #[serde(default, alias = "timer_type")]
    pub timer_type: TimerType,
    #[serde(flatten)]
    pub extra: Extra,
}

impl TimerData {
    /// Creates a delay timer.
    pub fn delay(duration: f64, unit: TimeUnit) -> Self {
        Self {
            duration,
            unit,
            timer_type: TimerType::Delay,
            extra: Extra::new(),
        }
    }

    /// Returns the wait time, or `None` when the duration is negative or not
    /// finite.
    pub fn wait_time(&self) -> Option<Duration> {
        let seconds = self.duration * self.unit.seconds();
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }

        Duration::try_from_secs_f64(seconds).ok()
    }
}
