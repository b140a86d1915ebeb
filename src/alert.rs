//! Audio and speech alerting.
//!
//! `Alerter` is the handle the dashboard owns for everything audible:
//! - A short two-tone beep, rendered to PCM on a lazily created audio context
//! - Spoken alerts where the newest utterance always wins
//!
//! Where the sound actually goes is an `AlertOutput`.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const TONE_DURATION: Duration = Duration::from_millis(300);
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

const TONE_LOW_HZ: f32 = 800.0;
const TONE_HIGH_HZ: f32 = 1_000.0;
const TONE_PEAK_GAIN: f32 = 0.3;
const TONE_FLOOR_GAIN: f32 = 0.01;
const TONE_ATTACK_SECS: f32 = 0.01;

/// Rough speaking time per character at rate 1.0.
const SPEECH_MS_PER_CHAR: f32 = 150.0;

/// 800 Hz, then 1000 Hz from 100 ms, back to 800 Hz from 200 ms.
pub fn tone_frequency(t: f32) -> f32 {
    if (0.1..0.2).contains(&t) {
        TONE_HIGH_HZ
    } else {
        TONE_LOW_HZ
    }
}

/// Linear attack to 0.3 over 10 ms, then exponential decay to 0.01 at 300 ms.
pub fn tone_gain(t: f32) -> f32 {
    let end = TONE_DURATION.as_secs_f32();
    if t <= 0.0 {
        0.0
    } else if t < TONE_ATTACK_SECS {
        TONE_PEAK_GAIN * t / TONE_ATTACK_SECS
    } else if t < end {
        let progress = (t - TONE_ATTACK_SECS) / (end - TONE_ATTACK_SECS);
        TONE_PEAK_GAIN * (TONE_FLOOR_GAIN / TONE_PEAK_GAIN).powf(progress)
    } else {
        0.0
    }
}

/// Render the alert tone as mono PCM. The oscillator phase is continuous
/// across frequency steps.
pub fn synthesize_tone(sample_rate: u32) -> Vec<f32> {
    let sample_rate = sample_rate.max(1);
    let count = (TONE_DURATION.as_secs_f64() * f64::from(sample_rate)).round() as usize;
    let mut phase = 0.0f32;
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let sample = phase.sin() * tone_gain(t);
            phase = (phase + 2.0 * PI * tone_frequency(t) / sample_rate as f32) % (2.0 * PI);
            sample
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SpeechSettings {
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            lang: "ko-KR".to_string(),
            rate: 1.2,
            pitch: 1.0,
            volume: 0.8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: &str, settings: &SpeechSettings) -> Self {
        Self {
            text: text.to_string(),
            lang: settings.lang.clone(),
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
        }
    }

    pub fn estimated_duration(&self) -> Duration {
        let chars = self.text.chars().count() as f32;
        let rate = if self.rate > 0.0 { self.rate } else { 1.0 };
        Duration::from_millis((chars * SPEECH_MS_PER_CHAR / rate).round() as u64)
    }
}

/// Destination for alert audio and speech.
pub trait AlertOutput: Send {
    fn sample_rate(&self) -> u32 {
        DEFAULT_SAMPLE_RATE
    }

    fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<()>;

    fn speak(&mut self, utterance: &Utterance) -> Result<()>;

    /// Cut off the utterance currently being spoken.
    fn cancel_speech(&mut self) -> Result<()>;
}

/// Writes alerts to the log.
pub struct LogOutput;

impl AlertOutput for LogOutput {
    fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        log::info!(
            "alert tone: {} samples @ {} Hz (peak {:.2})",
            samples.len(),
            sample_rate,
            peak
        );
        Ok(())
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        log::info!(
            "speech [{} x{:.1}]: {}",
            utterance.lang,
            utterance.rate,
            utterance.text
        );
        Ok(())
    }

    fn cancel_speech(&mut self) -> Result<()> {
        log::debug!("speech cancelled");
        Ok(())
    }
}

pub struct NullOutput;

impl AlertOutput for NullOutput {
    fn play(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<()> {
        Ok(())
    }

    fn speak(&mut self, _utterance: &Utterance) -> Result<()> {
        Ok(())
    }

    fn cancel_speech(&mut self) -> Result<()> {
        Ok(())
    }
}

/// What a `MemoryOutput` has received so far.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlertLog {
    pub tones: usize,
    pub utterances: Vec<String>,
    pub cancellations: usize,
}

/// Records alerts in memory. Clones share the same log.
#[derive(Clone, Default)]
pub struct MemoryOutput {
    log: Arc<Mutex<AlertLog>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> AlertLog {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn record(&self, f: impl FnOnce(&mut AlertLog)) -> Result<()> {
        let mut log = self
            .log
            .lock()
            .map_err(|_| anyhow!("alert log lock poisoned"))?;
        f(&mut log);
        Ok(())
    }
}

impl AlertOutput for MemoryOutput {
    fn play(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<()> {
        self.record(|log| log.tones += 1)
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        self.record(|log| log.utterances.push(utterance.text.clone()))
    }

    fn cancel_speech(&mut self) -> Result<()> {
        self.record(|log| log.cancellations += 1)
    }
}

struct AudioContext {
    sample_rate: u32,
    tone: Vec<f32>,
}

pub struct Alerter {
    output: Box<dyn AlertOutput>,
    speech: SpeechSettings,
    audio: Option<AudioContext>,
    /// Session time at which the current utterance is expected to finish.
    speaking_until: Option<Duration>,
}

impl Alerter {
    pub fn new(output: Box<dyn AlertOutput>, speech: SpeechSettings) -> Self {
        Self {
            output,
            speech,
            audio: None,
            speaking_until: None,
        }
    }

    /// Create the audio context. Must follow a user gesture; later calls are no-ops.
    pub fn init_audio(&mut self) {
        if self.audio.is_some() {
            return;
        }
        let sample_rate = self.output.sample_rate();
        self.audio = Some(AudioContext {
            sample_rate,
            tone: synthesize_tone(sample_rate),
        });
        log::debug!("audio context initialized at {} Hz", sample_rate);
    }

    pub fn audio_ready(&self) -> bool {
        self.audio.is_some()
    }

    /// Play the alert tone. Returns false when no audio context exists yet.
    pub fn play_alert_sound(&mut self) -> bool {
        let Some(audio) = self.audio.as_ref() else {
            log::debug!("alert tone skipped: audio context not initialized");
            return false;
        };
        if let Err(err) = self.output.play(&audio.tone, audio.sample_rate) {
            log::warn!("alert tone failed: {}", err);
        }
        true
    }

    /// Speak `text`, cancelling any utterance still in flight.
    pub fn speak(&mut self, text: &str, now: Duration) {
        if self.is_speaking(now) {
            if let Err(err) = self.output.cancel_speech() {
                log::warn!("speech cancel failed: {}", err);
            }
        }
        let utterance = Utterance::new(text, &self.speech);
        self.speaking_until = Some(now + utterance.estimated_duration());
        if let Err(err) = self.output.speak(&utterance) {
            log::warn!("speech failed: {}", err);
            self.speaking_until = None;
        }
    }

    pub fn is_speaking(&self, now: Duration) -> bool {
        self.speaking_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_has_expected_envelope() {
        assert_eq!(tone_gain(0.0), 0.0);
        assert!((tone_gain(0.005) - 0.15).abs() < 1e-4);
        assert!((tone_gain(0.01) - 0.3).abs() < 1e-4);
        assert!((tone_gain(0.2999) - 0.01).abs() < 1e-3);
        assert_eq!(tone_gain(0.3), 0.0);
    }

    #[test]
    fn tone_steps_frequency() {
        assert_eq!(tone_frequency(0.05), 800.0);
        assert_eq!(tone_frequency(0.15), 1000.0);
        assert_eq!(tone_frequency(0.25), 800.0);
    }

    #[test]
    fn synthesized_tone_is_300ms_and_bounded() {
        let samples = synthesize_tone(8_000);
        assert_eq!(samples.len(), 2_400);
        assert!(samples.iter().all(|s| s.abs() <= 0.3 + 1e-6));
        assert!(samples.iter().any(|s| s.abs() > 0.2));
    }

    #[test]
    fn tone_requires_audio_context() {
        let output = MemoryOutput::new();
        let mut alerter = Alerter::new(Box::new(output.clone()), SpeechSettings::default());
        assert!(!alerter.play_alert_sound());
        alerter.init_audio();
        assert!(alerter.play_alert_sound());
        assert_eq!(output.log().tones, 1);
    }

    #[test]
    fn newer_utterance_cancels_one_in_flight() {
        let output = MemoryOutput::new();
        let mut alerter = Alerter::new(Box::new(output.clone()), SpeechSettings::default());
        alerter.speak("위험 요소 감지: 낙하물", Duration::ZERO);
        alerter.speak("위험 요소 감지: 포트홀", Duration::from_millis(100));
        alerter.speak("이미지 분석이 완료되었습니다.", Duration::from_secs(60));

        let log = output.log();
        assert_eq!(log.utterances.len(), 3);
        assert_eq!(log.cancellations, 1);
    }

    #[test]
    fn utterance_uses_configured_voice() {
        let utterance = Utterance::new("안녕", &SpeechSettings::default());
        assert_eq!(utterance.lang, "ko-KR");
        assert_eq!(utterance.rate, 1.2);
        assert_eq!(utterance.volume, 0.8);
        assert_eq!(utterance.estimated_duration(), Duration::from_millis(250));

        let slow = Utterance::new(
            "포트홀",
            &SpeechSettings {
                rate: 0.7,
                ..SpeechSettings::default()
            },
        );
        assert_eq!(slow.estimated_duration(), Duration::from_millis(643));
    }

    #[test]
    fn audio_becomes_ready_once_initialized() {
        let mut alerter = Alerter::new(Box::new(NullOutput), SpeechSettings::default());
        assert!(!alerter.audio_ready());
        assert!(!alerter.play_alert_sound());

        alerter.init_audio();
        alerter.init_audio();
        assert!(alerter.audio_ready());
        assert!(alerter.play_alert_sound());
    }
}
