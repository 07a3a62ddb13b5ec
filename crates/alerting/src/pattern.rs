//! Alarm tone synthesis

use std::time::Duration;

/// Absolute upper bound on any alarm, measured from start
pub const HARD_STOP: Duration = Duration::from_secs(3);

/// Three-pulse square-wave alarm sweeping between two pitches
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmPattern {
    /// Lower pitch (Hz)
    pub low_hz: f32,
    /// Upper pitch (Hz)
    pub high_hz: f32,
    /// Time spent on each pitch before switching (ms)
    pub sweep_step_ms: u32,
    /// Peak gain of each pulse (0-1)
    pub peak_gain: f32,
    /// Number of pulses
    pub pulses: u32,
    /// Start-to-start distance between pulses (ms)
    pub pulse_spacing_ms: u32,
    /// Ramp-up time of a pulse (ms)
    pub attack_ms: u32,
    /// Total length of a pulse including its ramp down (ms)
    pub pulse_len_ms: u32,
    /// Playback is cut here regardless of the pulse schedule
    pub hard_stop: Duration,
}

impl Default for AlarmPattern {
    fn default() -> Self {
        Self {
            low_hz: 880.0,  // A5
            high_hz: 1760.0, // A6
            sweep_step_ms: 100,
            peak_gain: 0.5,
            pulses: 3,
            pulse_spacing_ms: 300,
            attack_ms: 50,
            pulse_len_ms: 200,
            hard_stop: HARD_STOP,
        }
    }
}

impl AlarmPattern {
    /// Pitch at `t` seconds after start
    pub fn frequency_at(&self, t: f32) -> f32 {
        let step = (t * 1000.0 / self.sweep_step_ms.max(1) as f32) as u64;
        if step % 2 == 0 {
            self.low_hz
        } else {
            self.high_hz
        }
    }

    /// Gain envelope at `t` seconds after start
    pub fn gain_at(&self, t: f32) -> f32 {
        if t < 0.0 || t >= self.hard_stop.as_secs_f32() {
            return 0.0;
        }

        let ms = t * 1000.0;
        let spacing = self.pulse_spacing_ms.max(1) as f32;
        let pulse = (ms / spacing) as u32;
        if pulse >= self.pulses {
            return 0.0;
        }

        let offset = ms - pulse as f32 * spacing;
        let attack = self.attack_ms as f32;
        let len = self.pulse_len_ms as f32;
        if offset < attack {
            self.peak_gain * offset / attack.max(1.0)
        } else if offset < len {
            self.peak_gain * (len - offset) / (len - attack).max(1.0)
        } else {
            0.0
        }
    }

    /// Time until the last pulse has faded out, bounded by the hard stop
    pub fn audible_duration(&self) -> Duration {
        let last_end = match self.pulses {
            0 => 0,
            n => (n - 1) * self.pulse_spacing_ms + self.pulse_len_ms,
        };
        Duration::from_millis(last_end as u64).min(self.hard_stop)
    }

    /// Mono samples of the audible part of the alarm.
    ///
    /// Never longer than `hard_stop`; output devices pad with silence.
    pub fn render(&self, sample_rate: u32) -> Vec<f32> {
        let rate = sample_rate.max(1) as f32;
        let count = (self.audible_duration().as_secs_f32() * rate) as usize;
        let max = (self.hard_stop.as_secs_f32() * rate) as usize;

        let mut phase = 0.0f32;
        (0..count.min(max))
            .map(|i| {
                let t = i as f32 / rate;
                phase = (phase + self.frequency_at(t) / rate).fract();
                let square = if phase < 0.5 { 1.0 } else { -1.0 };
                square * self.gain_at(t)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pitch_alternates_by_octave() {
        let pattern = AlarmPattern::default();
        assert_eq!(pattern.frequency_at(0.05), 880.0);
        assert_eq!(pattern.frequency_at(0.15), 1760.0);
        assert_eq!(pattern.frequency_at(0.25), 880.0);
        assert_eq!(pattern.high_hz, pattern.low_hz * 2.0);
    }

    #[test]
    fn test_three_pulses_separated_by_silence() {
        let pattern = AlarmPattern::default();
        for start in [0.0, 0.3, 0.6] {
            assert!(pattern.gain_at(start + 0.05) > 0.45);
            assert_eq!(pattern.gain_at(start + 0.25), 0.0);
        }
        assert_eq!(pattern.gain_at(1.0), 0.0);
    }

    #[test]
    fn test_render_length() {
        let pattern = AlarmPattern::default();
        assert_eq!(pattern.audible_duration(), Duration::from_millis(800));
        assert_eq!(pattern.render(8000).len(), 6400);
    }

    #[test]
    fn test_hard_stop_truncates_long_schedule() {
        let pattern = AlarmPattern {
            pulses: 50,
            ..Default::default()
        };
        assert_eq!(pattern.audible_duration(), HARD_STOP);
        assert_eq!(pattern.render(1000).len(), 3000);
        assert_eq!(pattern.gain_at(3.1), 0.0);
    }

    proptest! {
        #[test]
        fn rendered_samples_stay_within_gain(
            pulses in 0u32..40,
            spacing in 50u32..600,
            rate in 1000u32..16000,
        ) {
            let pattern = AlarmPattern {
                pulses,
                pulse_spacing_ms: spacing,
                ..Default::default()
            };
            let samples = pattern.render(rate);
            prop_assert!(samples.len() as f32 <= HARD_STOP.as_secs_f32() * rate as f32);
            prop_assert!(samples.iter().all(|s| s.abs() <= pattern.peak_gain + f32::EPSILON));
        }
    }
}
