//! Simulated devices
//!
//! Stand-ins for real output so a publication can be driven from a terminal
//! or a test: audio that only keeps time, speech that only counts words, a
//! document loader that loads instantly and a highlighter that logs.
//! Everything reports back through the player's input channel.

use crate::devices::{
    AudioDevice, ChapterResolver, Devices, DocumentContent, EmbeddedMediaHandle, HighlightSink,
    HighlightTarget, LoadTicket, SpeechDevice,
};
use crate::error::{Error, Result};
use crate::playback::{InputSender, PlayerEvent, PlayerInput, TokioScheduler};
use crate::timeline::{FragmentHierarchy, TimelineAggregate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info};

/// Position report interval
const TICK: Duration = Duration::from_millis(20);

/// Simulated speaking time per character at rate 1.0
const SPEECH_MS_PER_CHAR: u64 = 60;

/// Length assumed for sources whose clips are all open-ended
const OPEN_ENDED_TAIL_SECS: f64 = 5.0;

/// Full simulated device set reporting into `tx`
pub fn sim_devices(tx: InputSender, aggregate: &TimelineAggregate) -> Devices {
    Devices {
        audio: Box::new(SimAudio::for_publication(tx.clone(), aggregate)),
        speech: Box::new(SimSpeech::new(tx.clone())),
        highlighter: Box::new(LoggingHighlighter),
        loader: Box::new(InstantLoader::new(tx.clone())),
        content: Box::new(PlaceholderContent),
        scheduler: Box::new(TokioScheduler::new(tx)),
    }
}

fn send(tx: &InputSender, event: PlayerEvent) {
    if tx.send(PlayerInput::Event(event)).is_err() {
        debug!("Player gone, dropping simulated device event");
    }
}

/// Audio that keeps time without producing samples
///
/// A source is as long as the largest clip end any timeline uses for it.
pub struct SimAudio {
    tx: InputSender,
    lengths: HashMap<String, f64>,
    src: Option<String>,
    /// Play head, in microseconds
    position_us: Arc<AtomicU64>,
    rate: f64,
    ticker: Option<JoinHandle<()>>,
}

impl SimAudio {
    pub fn new(tx: InputSender, lengths: HashMap<String, f64>) -> Self {
        Self {
            tx,
            lengths,
            src: None,
            position_us: Arc::new(AtomicU64::new(0)),
            rate: 1.0,
            ticker: None,
        }
    }

    /// Source lengths derived from every clip in the publication
    pub fn for_publication(tx: InputSender, aggregate: &TimelineAggregate) -> Self {
        let mut lengths: HashMap<String, f64> = HashMap::new();
        for tree in aggregate.trees() {
            for &par in tree.parallels() {
                let Some(clip) = tree.audio_of(par) else {
                    continue;
                };
                let Some(src) = clip.src.as_ref() else {
                    continue;
                };
                let end = if clip.is_open_ended() {
                    clip.clip_begin + OPEN_ENDED_TAIL_SECS
                } else {
                    clip.clip_end
                };
                let length = lengths.entry(src.clone()).or_insert(0.0);
                *length = length.max(end);
            }
        }
        Self::new(tx, lengths)
    }

    fn position_secs(&self) -> f64 {
        self.position_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    fn set_position(&self, secs: f64) {
        self.position_us
            .store((secs.max(0.0) * 1_000_000.0) as u64, Ordering::Relaxed);
    }

    fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn start_ticker(&mut self) -> Result<()> {
        self.stop_ticker();
        let src = self
            .src
            .clone()
            .ok_or_else(|| Error::Device("no source loaded".to_string()))?;
        let length = self.lengths.get(&src).copied().unwrap_or(0.0);
        let step_us = (TICK.as_secs_f64() * self.rate * 1_000_000.0) as u64;
        let end_us = (length * 1_000_000.0) as u64;
        let position = Arc::clone(&self.position_us);
        let tx = self.tx.clone();

        send(&tx, PlayerEvent::AudioPlaying);
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = time::interval(TICK);
            interval.tick().await;
            loop {
                interval.tick().await;
                let now = (position.load(Ordering::Relaxed) + step_us).min(end_us);
                position.store(now, Ordering::Relaxed);
                send(
                    &tx,
                    PlayerEvent::AudioPosition {
                        src: src.clone(),
                        seconds: now as f64 / 1_000_000.0,
                    },
                );
                if now >= end_us {
                    send(&tx, PlayerEvent::AudioEnded);
                    break;
                }
            }
        }));
        Ok(())
    }
}

impl AudioDevice for SimAudio {
    fn play_clip(&mut self, src: &str, start_secs: f64) -> Result<()> {
        if !self.lengths.contains_key(src) {
            return Err(Error::Device(format!("unknown audio source {}", src)));
        }
        debug!("Sim audio: {} from {:.3}s", src, start_secs);
        self.src = Some(src.to_string());
        self.set_position(start_secs);
        self.start_ticker()
    }

    fn seek(&mut self, position_secs: f64) -> Result<()> {
        self.set_position(position_secs);
        Ok(())
    }

    fn pause(&mut self) {
        if self.is_ticking() {
            self.stop_ticker();
            send(&self.tx, PlayerEvent::AudioPaused);
        }
    }

    fn resume(&mut self) -> Result<()> {
        self.start_ticker()
    }

    fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        if self.is_ticking() {
            debug!("Sim audio: rate {:.2} at {:.3}s", rate, self.position_secs());
            // Restart so the new step size applies
            if let Err(e) = self.start_ticker() {
                debug!("Sim audio: {}", e);
            }
        }
    }

    fn set_volume(&mut self, volume: f64) {
        debug!("Sim audio: volume {:.2}", volume);
    }

    fn reset(&mut self) {
        self.stop_ticker();
        self.src = None;
        self.set_position(0.0);
    }
}

impl Drop for SimAudio {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

/// Speech that takes time proportional to its text and reports each word
pub struct SimSpeech {
    tx: InputSender,
    utterance: Option<JoinHandle<()>>,
}

impl SimSpeech {
    pub fn new(tx: InputSender) -> Self {
        Self { tx, utterance: None }
    }
}

impl SpeechDevice for SimSpeech {
    fn speak(&mut self, text: &str, rate: f64, _volume: f64) -> Result<()> {
        self.cancel();
        info!("Speaking: {}", text);

        let rate = if rate > 0.0 { rate } else { 1.0 };
        let words: Vec<(usize, usize)> = text
            .split_whitespace()
            .map(|word| {
                let byte_offset = word.as_ptr() as usize - text.as_ptr() as usize;
                (text[..byte_offset].chars().count(), word.chars().count())
            })
            .collect();
        let tx = self.tx.clone();

        self.utterance = Some(tokio::spawn(async move {
            for (char_index, char_length) in words {
                send(
                    &tx,
                    PlayerEvent::SpeechBoundary {
                        char_index,
                        char_length,
                    },
                );
                let ms = ((char_length as u64 + 1) * SPEECH_MS_PER_CHAR) as f64 / rate;
                time::sleep(Duration::from_millis(ms as u64)).await;
            }
            send(&tx, PlayerEvent::SpeechEnded);
        }));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(utterance) = self.utterance.take() {
            utterance.abort();
        }
    }
}

impl Drop for SimSpeech {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Loader for a host that can show any document at once
pub struct InstantLoader {
    tx: InputSender,
}

impl InstantLoader {
    pub fn new(tx: InputSender) -> Self {
        Self { tx }
    }
}

impl ChapterResolver for InstantLoader {
    fn load_document(&mut self, href: &str, anchor: Option<&str>, ticket: LoadTicket) {
        info!("Showing {}{}", href, anchor.map(|a| format!("#{}", a)).unwrap_or_default());
        send(&self.tx, PlayerEvent::DocumentLoaded { ticket });
    }
}

/// Document content without documents: every fragment reads as its own name
#[derive(Debug, Default)]
pub struct PlaceholderContent;

impl FragmentHierarchy for PlaceholderContent {
    fn contains(&self, _href: &str, _outer_id: &str, _inner_id: &str) -> bool {
        false
    }
}

impl DocumentContent for PlaceholderContent {
    fn fragment_text(&self, href: &str, fragment_id: Option<&str>) -> Option<String> {
        Some(match fragment_id {
            Some(id) => format!("Text of {} in {}", id, href),
            None => format!("Text of {}", href),
        })
    }

    fn embedded_media(
        &mut self,
        _href: &str,
        _fragment_id: Option<&str>,
    ) -> Option<Box<dyn EmbeddedMediaHandle>> {
        None
    }
}

/// Highlighter that logs
#[derive(Debug, Default)]
pub struct LoggingHighlighter;

impl HighlightSink for LoggingHighlighter {
    fn highlight(&mut self, target: &HighlightTarget) {
        info!(
            "Highlight {}#{}",
            target.document_href,
            target.fragment_id.as_deref().unwrap_or("")
        );
    }

    fn unhighlight(&mut self, target: &HighlightTarget) {
        debug!(
            "Unhighlight {}#{}",
            target.document_href,
            target.fragment_id.as_deref().unwrap_or("")
        );
    }

    fn ensure_visible(&mut self, target: &HighlightTarget) {
        debug!("Scroll to {}#{:?}", target.document_href, target.fragment_id);
    }

    fn highlight_range(&mut self, target: &HighlightTarget, char_index: usize, char_length: usize) {
        debug!(
            "Word {}..{} of {:?}",
            char_index,
            char_index + char_length,
            target.fragment_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::player_channel;
    use crate::timeline::fixtures::simple_timeline;
    use crate::timeline::TimelineTree;

    async fn next_event(rx: &mut tokio::sync::mpsc::UnboundedReceiver<PlayerInput>) -> PlayerEvent {
        match time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(PlayerInput::Event(event))) => event,
            other => panic!("Expected a device event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sim_audio_ticks_until_source_end() {
        let (handle, mut rx) = player_channel();
        let aggregate = TimelineAggregate::new(vec![TimelineTree::from_dto(&simple_timeline("c1")).unwrap()]);
        let mut audio = SimAudio::for_publication(handle.sender(), &aggregate);
        assert!(audio.play_clip("nope.mp3", 0.0).is_err());

        audio.play_clip("c1.mp3", 5.9).unwrap();
        assert_eq!(next_event(&mut rx).await, PlayerEvent::AudioPlaying);

        let mut last = 0.0;
        loop {
            match next_event(&mut rx).await {
                PlayerEvent::AudioPosition { seconds, .. } => {
                    assert!(seconds > last);
                    last = seconds;
                }
                PlayerEvent::AudioEnded => break,
                other => panic!("Unexpected {:?}", other),
            }
        }
        assert!((last - 6.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_sim_audio_pause_reports_and_stops() {
        let (handle, mut rx) = player_channel();
        let mut audio = SimAudio::new(handle.sender(), HashMap::from([("a.mp3".to_string(), 60.0)]));
        audio.play_clip("a.mp3", 1.0).unwrap();
        assert_eq!(next_event(&mut rx).await, PlayerEvent::AudioPlaying);

        audio.pause();
        loop {
            if next_event(&mut rx).await == PlayerEvent::AudioPaused {
                break;
            }
        }
        audio.seek(10.0).unwrap();
        audio.resume().unwrap();
        assert_eq!(next_event(&mut rx).await, PlayerEvent::AudioPlaying);
        match next_event(&mut rx).await {
            PlayerEvent::AudioPosition { src, seconds } => {
                assert_eq!(src, "a.mp3");
                assert!(seconds >= 10.0);
            }
            other => panic!("Unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sim_speech_reports_words_then_end() {
        let (handle, mut rx) = player_channel();
        let mut speech = SimSpeech::new(handle.sender());
        speech.speak("two words", 4.0, 1.0).unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            PlayerEvent::SpeechBoundary {
                char_index: 0,
                char_length: 3
            }
        );
        assert_eq!(
            next_event(&mut rx).await,
            PlayerEvent::SpeechBoundary {
                char_index: 4,
                char_length: 5
            }
        );
        assert_eq!(next_event(&mut rx).await, PlayerEvent::SpeechEnded);
    }

    #[tokio::test]
    async fn test_cancelled_speech_stays_silent() {
        let (handle, mut rx) = player_channel();
        let mut speech = SimSpeech::new(handle.sender());
        speech.speak("a fairly long sentence to cancel", 1.0, 1.0).unwrap();
        speech.cancel();

        // At most the first boundary may have slipped out
        let quiet = time::timeout(Duration::from_millis(300), async {
            while let Some(input) = rx.recv().await {
                if let PlayerInput::Event(PlayerEvent::SpeechEnded) = input {
                    return true;
                }
            }
            false
        })
        .await;
        assert!(!matches!(quiet, Ok(true)));
    }

    #[tokio::test]
    async fn test_instant_loader_answers_with_ticket() {
        let (handle, mut rx) = player_channel();
        let mut loader = InstantLoader::new(handle.sender());
        loader.load_document("c2.xhtml", Some("p1"), LoadTicket(4));
        assert_eq!(
            next_event(&mut rx).await,
            PlayerEvent::DocumentLoaded {
                ticket: LoadTicket(4)
            }
        );
    }
}
