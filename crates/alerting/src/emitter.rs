//! Alarm emitter: at most one bounded alarm at a time

use crate::pattern::AlarmPattern;
use crate::AudioError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A sound output able to play an alarm pattern
pub trait AudioOutput: Send + Sync {
    /// Begin playing `pattern`. Output continues (silent after the pattern)
    /// until the returned playback is stopped.
    fn play(&self, pattern: &AlarmPattern) -> Result<Arc<dyn Playback>, AudioError>;
}

/// Handle to sound currently owned by an output
pub trait Playback: Send + Sync {
    /// Silence and release the underlying resources. Idempotent.
    fn stop(&self);

    /// Whether the playback has been stopped or ended on its own
    fn is_finished(&self) -> bool;
}

struct ActiveAlarm {
    playback: Arc<dyn Playback>,
    watchdog: JoinHandle<()>,
    started: Instant,
}

/// Drives an [`AudioOutput`] with start/stop semantics suitable for alerts.
///
/// `start` is a no-op while an alarm is in progress, and every alarm is cut
/// at the pattern's hard stop by a watchdog independent of the output.
pub struct AlarmEmitter {
    output: Box<dyn AudioOutput>,
    pattern: AlarmPattern,
    active: Option<ActiveAlarm>,
}

impl AlarmEmitter {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self::with_pattern(output, AlarmPattern::default())
    }

    pub fn with_pattern(output: Box<dyn AudioOutput>, pattern: AlarmPattern) -> Self {
        Self {
            output,
            pattern,
            active: None,
        }
    }

    /// Emitter with no sound device
    pub fn silent() -> Self {
        Self::new(Box::new(SilentOutput))
    }

    /// Start the alarm. Returns true if a new alarm began.
    ///
    /// Output failures are logged and swallowed; the caller's visual alert
    /// does not depend on sound.
    pub fn start(&mut self) -> bool {
        if self.is_playing() {
            debug!("Alarm already playing, ignoring start");
            return false;
        }
        self.release();

        let playback = match self.output.play(&self.pattern) {
            Ok(playback) => playback,
            Err(e) => {
                warn!("Alarm unavailable, continuing without sound: {}", e);
                return false;
            }
        };

        let hard_stop = self.pattern.hard_stop;
        let started = Instant::now();
        let watched = Arc::clone(&playback);
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep_until(started + hard_stop).await;
            if !watched.is_finished() {
                debug!("Alarm reached hard stop after {:?}", hard_stop);
                watched.stop();
            }
        });

        info!("Alarm started");
        self.active = Some(ActiveAlarm {
            playback,
            watchdog,
            started,
        });
        true
    }

    /// Silence any alarm in progress. Safe to call at any time.
    pub fn stop(&mut self) {
        if let Some(active) = &self.active {
            if !active.playback.is_finished() {
                info!("Alarm stopped after {:?}", active.started.elapsed());
            }
        }
        self.release();
    }

    /// Whether an alarm currently owns the output
    pub fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| !active.playback.is_finished())
            .unwrap_or(false)
    }

    /// Resolves once the alarm in progress has been cut at its hard stop,
    /// releasing it. Pends while no alarm is held.
    pub async fn expired(&mut self) {
        match self.active.as_mut() {
            Some(active) => {
                if !active.watchdog.is_finished() {
                    let _ = (&mut active.watchdog).await;
                }
            }
            None => std::future::pending::<()>().await,
        }
        self.release();
    }

    fn release(&mut self) {
        if let Some(active) = self.active.take() {
            active.watchdog.abort();
            active.playback.stop();
        }
    }
}

impl Drop for AlarmEmitter {
    fn drop(&mut self) {
        self.release();
    }
}

/// Output for systems without a sound device: playback is tracked but inaudible
pub struct SilentOutput;

impl AudioOutput for SilentOutput {
    fn play(&self, _pattern: &AlarmPattern) -> Result<Arc<dyn Playback>, AudioError> {
        Ok(Arc::new(FlagPlayback::default()))
    }
}

/// Playback whose only state is a stopped flag
#[derive(Debug, Default)]
pub struct FlagPlayback {
    stopped: AtomicBool,
}

impl Playback for FlagPlayback {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingOutput {
        plays: Arc<AtomicUsize>,
        last: Arc<Mutex<Option<Arc<FlagPlayback>>>>,
    }

    impl AudioOutput for CountingOutput {
        fn play(&self, _pattern: &AlarmPattern) -> Result<Arc<dyn Playback>, AudioError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            let playback = Arc::new(FlagPlayback::default());
            *self.last.lock().unwrap() = Some(Arc::clone(&playback));
            Ok(playback)
        }
    }

    struct BrokenOutput;

    impl AudioOutput for BrokenOutput {
        fn play(&self, _pattern: &AlarmPattern) -> Result<Arc<dyn Playback>, AudioError> {
            Err(AudioError::DeviceNotAvailable("no sound card".into()))
        }
    }

    fn counting() -> (AlarmEmitter, Arc<AtomicUsize>, Arc<Mutex<Option<Arc<FlagPlayback>>>>) {
        let output = CountingOutput::default();
        let plays = Arc::clone(&output.plays);
        let last = Arc::clone(&output.last);
        (AlarmEmitter::new(Box::new(output)), plays, last)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_while_playing() {
        let (mut emitter, plays, _) = counting();

        assert!(emitter.start());
        assert!(!emitter.start());
        assert!(emitter.is_playing());
        assert_eq!(plays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_stop_releases_output() {
        let (mut emitter, plays, last) = counting();
        emitter.start();

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(emitter.is_playing());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!emitter.is_playing());
        assert!(last.lock().unwrap().as_ref().unwrap().is_finished());

        assert!(emitter.start());
        assert_eq!(plays.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_immediate_and_repeatable() {
        let (mut emitter, _, last) = counting();
        emitter.stop();

        emitter.start();
        emitter.stop();
        emitter.stop();

        assert!(!emitter.is_playing());
        assert!(last.lock().unwrap().as_ref().unwrap().is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_output_degrades_silently() {
        let mut emitter = AlarmEmitter::new(Box::new(BrokenOutput));
        assert!(!emitter.start());
        assert!(!emitter.is_playing());
        emitter.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_emitter_tracks_playback() {
        let mut emitter = AlarmEmitter::silent();
        assert!(emitter.start());
        assert!(emitter.is_playing());
        tokio::time::sleep(crate::HARD_STOP + Duration::from_millis(1)).await;
        assert!(!emitter.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_resolves_at_hard_stop() {
        let (mut emitter, _, _) = counting();
        let started = Instant::now();
        emitter.start();

        emitter.expired().await;
        assert_eq!(started.elapsed(), crate::HARD_STOP);
        assert!(!emitter.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_pends_without_alarm() {
        let (mut emitter, _, _) = counting();
        let idle = tokio::time::timeout(Duration::from_secs(10), emitter.expired()).await;
        assert!(idle.is_err());

        emitter.start();
        emitter.stop();
        let stopped = tokio::time::timeout(Duration::from_secs(10), emitter.expired()).await;
        assert!(stopped.is_err());
    }
}
