use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::feed::FeedItem;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("player is not running")]
    Closed,
    #[error("player ipc: {0}")]
    Ipc(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub current_time: f64,
    pub duration: Option<f64>,
}

/// Playback capability behind one feed card.
pub trait MediaDevice {
    fn is_video(&self) -> bool;
    fn play(&mut self) -> Result<(), DeviceError>;
    fn pause(&mut self) -> Result<(), DeviceError>;
    fn paused(&self) -> bool;
    fn muted(&self) -> bool;
    fn set_muted(&mut self, muted: bool) -> Result<(), DeviceError>;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64) -> Result<(), DeviceError>;
    /// Known, positive duration in seconds.
    fn duration(&self) -> Option<f64>;
    fn subscribe_progress(&mut self) -> Receiver<Position>;
    fn unsubscribe_progress(&mut self);
    fn tick(&mut self, _elapsed: Duration) {}
}

pub trait DeviceFactory {
    fn create(&self, item: &FeedItem) -> Result<Box<dyn MediaDevice>>;
}

/// Static images have nothing to drive.
#[derive(Debug, Default)]
pub struct StillImage;

impl MediaDevice for StillImage {
    fn is_video(&self) -> bool {
        false
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn paused(&self) -> bool {
        true
    }

    fn muted(&self) -> bool {
        true
    }

    fn set_muted(&mut self, _muted: bool) -> Result<(), DeviceError> {
        Ok(())
    }

    fn current_time(&self) -> f64 {
        0.0
    }

    fn set_current_time(&mut self, _seconds: f64) -> Result<(), DeviceError> {
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn subscribe_progress(&mut self) -> Receiver<Position> {
        let (_tx, rx) = unbounded();
        rx
    }

    fn unsubscribe_progress(&mut self) {}
}

/// Clock-driven video that loops at the end. Used when no external player is
/// configured and as the device under test.
#[derive(Debug)]
pub struct SimulatedVideo {
    paused: bool,
    muted: bool,
    current_time: f64,
    duration: Option<f64>,
    interval: Duration,
    since_report: Duration,
    progress_tx: Option<Sender<Position>>,
}

impl SimulatedVideo {
    /// Starts paused and muted, like a freshly mounted background card.
    pub fn new(duration: Option<Duration>, interval: Duration) -> Self {
        Self {
            paused: true,
            muted: true,
            current_time: 0.0,
            duration: duration
                .map(|d| d.as_secs_f64())
                .filter(|secs| *secs > 0.0),
            interval,
            since_report: Duration::ZERO,
            progress_tx: None,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.progress_tx.is_some()
    }

    fn report(&mut self) {
        let position = Position {
            current_time: self.current_time,
            duration: self.duration,
        };
        if let Some(tx) = &self.progress_tx {
            if tx.send(position).is_err() {
                self.progress_tx = None;
            }
        }
    }
}

impl MediaDevice for SimulatedVideo {
    fn is_video(&self) -> bool {
        true
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.paused = true;
        Ok(())
    }

    fn paused(&self) -> bool {
        self.paused
    }

    fn muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), DeviceError> {
        self.muted = muted;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), DeviceError> {
        let upper = self.duration.unwrap_or(f64::MAX);
        self.current_time = seconds.clamp(0.0, upper);
        self.report();
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn subscribe_progress(&mut self) -> Receiver<Position> {
        let (tx, rx) = unbounded();
        self.progress_tx = Some(tx);
        self.since_report = Duration::ZERO;
        rx
    }

    fn unsubscribe_progress(&mut self) {
        self.progress_tx = None;
    }

    fn tick(&mut self, elapsed: Duration) {
        if self.paused {
            return;
        }
        self.current_time += elapsed.as_secs_f64();
        if let Some(duration) = self.duration {
            if self.current_time >= duration {
                self.current_time %= duration;
            }
        }
        self.since_report += elapsed;
        if self.since_report >= self.interval {
            self.since_report = Duration::ZERO;
            self.report();
        }
    }
}

pub struct SimulatedFactory {
    pub duration: Duration,
    pub progress_interval: Duration,
}

impl DeviceFactory for SimulatedFactory {
    fn create(&self, item: &FeedItem) -> Result<Box<dyn MediaDevice>> {
        if !item.is_video() {
            return Ok(Box::new(StillImage));
        }
        Ok(Box::new(SimulatedVideo::new(
            Some(self.duration),
            self.progress_interval,
        )))
    }
}
