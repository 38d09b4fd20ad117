//! Timed take replay

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::error::PlayError;
use crate::event::CanonicalEvent;

use super::take::{sort_by_offset, RecordedEvent};

/// Lowest accepted speed factor
pub const MIN_SPEED: f64 = 0.001;

/// Longest delay a single scheduled replay may have (one week)
const MAX_DELAY_MS: f64 = 7.0 * 24.0 * 3600.0 * 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    pub speed: f64,
    pub looping: bool,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            looping: false,
        }
    }
}

impl PlayOptions {
    /// Multiplier from recorded to replay time
    pub fn time_scale(&self) -> f64 {
        1.0 / self.speed.max(MIN_SPEED)
    }
}

/// A running replay. Dropping or stopping it cancels every pending event.
#[derive(Debug)]
pub struct Player {
    handle: JoinHandle<()>,
}

impl Player {
    /// Start replaying `events` into `sink`.
    ///
    /// Each event is delivered `offset_ms / speed` after playback start,
    /// ordered by offset. With looping, the next pass begins `last_offset / speed`
    /// plus one millisecond after the last event of the previous pass. The
    /// sink returns `false` when its receiver is gone, which ends playback.
    pub fn spawn<F>(mut events: Vec<RecordedEvent>, options: PlayOptions, sink: F) -> Result<Self, PlayError>
    where
        F: FnMut(CanonicalEvent) -> bool + Send + 'static,
    {
        if events.is_empty() {
            return Err(PlayError::Empty);
        }
        sort_by_offset(&mut events);

        info!(
            "Playing {} events (speed {}x, loop={})",
            events.len(),
            options.speed,
            options.looping
        );

        let handle = tokio::spawn(run(events, options, sink));
        Ok(Self { handle })
    }

    /// Cancel all pending replays
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<F>(events: Vec<RecordedEvent>, options: PlayOptions, mut sink: F)
where
    F: FnMut(CanonicalEvent) -> bool + Send + 'static,
{
    let scale = options.time_scale();
    let last_offset = events.last().map(|e| e.offset_ms).unwrap_or(0.0);
    let mut pass_start = Instant::now();
    let mut pass: u64 = 0;

    loop {
        for recorded in &events {
            sleep_until(pass_start + scaled_delay(recorded.offset_ms, scale)).await;
            if !sink(recorded.event) {
                debug!("Playback sink closed");
                return;
            }
        }

        if !options.looping {
            break;
        }

        pass += 1;
        pass_start = Instant::now() + scaled_delay(last_offset, scale) + Duration::from_millis(1);
        debug!("Playback loop pass {}", pass);
    }

    debug!("Playback finished");
}

fn scaled_delay(offset_ms: f64, scale: f64) -> Duration {
    let ms = offset_ms * scale;
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms.min(MAX_DELAY_MS) / 1000.0)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn take(offsets: &[f64]) -> Vec<RecordedEvent> {
        offsets
            .iter()
            .enumerate()
            .map(|(i, &offset_ms)| RecordedEvent {
                offset_ms,
                event: CanonicalEvent::control_change(1, 7, i as u8),
            })
            .collect()
    }

    fn channel_sink(
        tx: mpsc::UnboundedSender<(Instant, CanonicalEvent)>,
    ) -> impl FnMut(CanonicalEvent) -> bool + Send + 'static {
        move |event| tx.send((Instant::now(), event)).is_ok()
    }

    #[tokio::test]
    async fn test_empty_take_is_rejected() {
        let result = Player::spawn(Vec::new(), PlayOptions::default(), |_| true);
        assert_eq!(result.err(), Some(PlayError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_speed_halves_delays() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let _player = Player::spawn(
            take(&[0.0, 100.0, 300.0, 340.0]),
            PlayOptions {
                speed: 2.0,
                looping: false,
            },
            channel_sink(tx),
        )
        .unwrap();

        let mut seen = Vec::new();
        while let Some((at, event)) = rx.recv().await {
            seen.push((at.duration_since(start), event.value));
        }

        assert_eq!(
            seen,
            vec![
                (Duration::from_millis(0), 0),
                (Duration::from_millis(50), 1),
                (Duration::from_millis(150), 2),
                (Duration::from_millis(170), 3),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_restarts_after_scaled_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let player = Player::spawn(
            take(&[10.0, 40.0]),
            PlayOptions {
                speed: 1.0,
                looping: true,
            },
            channel_sink(tx),
        )
        .unwrap();

        let mut times = Vec::new();
        for _ in 0..4 {
            let (at, _) = rx.recv().await.unwrap();
            times.push(at.duration_since(start));
        }
        player.stop();

        // Second pass starts 40 + 1 ms after the last event of the first
        assert_eq!(
            times,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(40),
                Duration::from_millis(91),
                Duration::from_millis(121),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_fire_at_their_own_offsets() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let _player = Player::spawn(take(&[100.0, 10.0]), PlayOptions::default(), channel_sink(tx)).unwrap();

        let mut seen = Vec::new();
        while let Some((at, event)) = rx.recv().await {
            seen.push((at.duration_since(start), event.value));
        }

        assert_eq!(
            seen,
            vec![(Duration::from_millis(10), 1), (Duration::from_millis(100), 0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = Player::spawn(take(&[0.0, 500.0]), PlayOptions::default(), channel_sink(tx)).unwrap();

        assert!(rx.recv().await.is_some());
        player.stop();
        // Sender is dropped with the aborted task
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_speed_is_floored() {
        let options = PlayOptions {
            speed: 0.0,
            looping: false,
        };
        assert_eq!(options.time_scale(), 1000.0);
        assert_eq!(scaled_delay(-5.0, 1.0), Duration::ZERO);
        assert_eq!(scaled_delay(f64::NAN, 1.0), Duration::ZERO);
    }
}
