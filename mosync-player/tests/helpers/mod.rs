//! Test helpers for mosync-player integration tests
//!
//! Provides recording fakes for every device the orchestrator talks to and a
//! [`Harness`] that drives a player synchronously:
//! - Device calls land in one shared [`CallLog`] in the order they were made
//! - Scheduled events are held until the test fires them
//! - Document loads complete only when the test says so

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mosync_common::{EventBus, PlayerSettings, SyncEvent};
use mosync_player::devices::{
    AudioDevice, ChapterResolver, Devices, DocumentContent, EmbeddedMediaHandle, HighlightSink,
    HighlightTarget, LoadTicket, Scheduler, SpeechDevice,
};
use mosync_player::playback::{MediaOverlayPlayer, PlayerEvent, PlayerState, Sounding};
use mosync_player::timeline::FragmentHierarchy;
use mosync_player::{Error, Result, TimelineAggregate};
use serde_json::{json, Value};
use tokio::sync::broadcast;

// ================================================================================================
// Call log
// ================================================================================================

/// One observable device interaction
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    PlayClip { src: String, start: f64 },
    Seek(f64),
    PauseAudio,
    ResumeAudio,
    ResetAudio,
    Rate(f64),
    Speak(String),
    CancelSpeech,
    Highlight(Option<String>),
    Unhighlight(Option<String>),
    EnsureVisible(Option<String>),
    WordRange(usize, usize),
    Load { href: String, anchor: Option<String>, ticket: LoadTicket },
    EmbeddedPlay(String),
    EmbeddedPause(String),
}

#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn all(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

// ================================================================================================
// Fakes
// ================================================================================================

pub struct FakeAudio {
    log: CallLog,
    fail_play: Arc<AtomicBool>,
    loaded: Arc<Mutex<Option<String>>>,
}

impl AudioDevice for FakeAudio {
    fn play_clip(&mut self, src: &str, start_secs: f64) -> Result<()> {
        self.log.record(Call::PlayClip {
            src: src.to_string(),
            start: start_secs,
        });
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(Error::Device(format!("cannot open {}", src)));
        }
        *self.loaded.lock().unwrap() = Some(src.to_string());
        Ok(())
    }

    fn seek(&mut self, position_secs: f64) -> Result<()> {
        self.log.record(Call::Seek(position_secs));
        Ok(())
    }

    fn pause(&mut self) {
        self.log.record(Call::PauseAudio);
    }

    fn resume(&mut self) -> Result<()> {
        self.log.record(Call::ResumeAudio);
        Ok(())
    }

    fn set_rate(&mut self, rate: f64) {
        self.log.record(Call::Rate(rate));
    }

    fn set_volume(&mut self, _volume: f64) {}

    fn reset(&mut self) {
        self.log.record(Call::ResetAudio);
        *self.loaded.lock().unwrap() = None;
    }
}

pub struct FakeSpeech {
    log: CallLog,
}

impl SpeechDevice for FakeSpeech {
    fn speak(&mut self, text: &str, _rate: f64, _volume: f64) -> Result<()> {
        self.log.record(Call::Speak(text.to_string()));
        Ok(())
    }

    fn cancel(&mut self) {
        self.log.record(Call::CancelSpeech);
    }
}

pub struct FakeHighlighter {
    log: CallLog,
}

impl HighlightSink for FakeHighlighter {
    fn highlight(&mut self, target: &HighlightTarget) {
        self.log.record(Call::Highlight(target.fragment_id.clone()));
    }

    fn unhighlight(&mut self, target: &HighlightTarget) {
        self.log.record(Call::Unhighlight(target.fragment_id.clone()));
    }

    fn ensure_visible(&mut self, target: &HighlightTarget) {
        self.log.record(Call::EnsureVisible(target.fragment_id.clone()));
    }

    fn highlight_range(&mut self, _target: &HighlightTarget, char_index: usize, char_length: usize) {
        self.log.record(Call::WordRange(char_index, char_length));
    }
}

/// Loader that only records; the test completes loads
pub struct FakeLoader {
    log: CallLog,
}

impl ChapterResolver for FakeLoader {
    fn load_document(&mut self, href: &str, anchor: Option<&str>, ticket: LoadTicket) {
        self.log.record(Call::Load {
            href: href.to_string(),
            anchor: anchor.map(str::to_string),
            ticket,
        });
    }
}

pub struct FakeEmbedded {
    log: CallLog,
    fragment: String,
}

impl EmbeddedMediaHandle for FakeEmbedded {
    fn play(&mut self) -> Result<()> {
        self.log.record(Call::EmbeddedPlay(self.fragment.clone()));
        Ok(())
    }

    fn pause(&mut self) {
        self.log.record(Call::EmbeddedPause(self.fragment.clone()));
    }
}

/// Document content keyed by fragment id
#[derive(Default)]
pub struct FakeContent {
    log: CallLog,
    texts: HashMap<String, String>,
    embedded: HashSet<String>,
    /// (outer, inner) element pairs
    nesting: HashSet<(String, String)>,
}

impl FakeContent {
    pub fn with_text(mut self, fragment: &str, text: &str) -> Self {
        self.texts.insert(fragment.to_string(), text.to_string());
        self
    }

    pub fn with_embedded(mut self, fragment: &str) -> Self {
        self.embedded.insert(fragment.to_string());
        self
    }

    pub fn with_nesting(mut self, outer: &str, inner: &str) -> Self {
        self.nesting.insert((outer.to_string(), inner.to_string()));
        self
    }
}

impl FragmentHierarchy for FakeContent {
    fn contains(&self, _href: &str, outer_id: &str, inner_id: &str) -> bool {
        self.nesting
            .contains(&(outer_id.to_string(), inner_id.to_string()))
    }
}

impl DocumentContent for FakeContent {
    fn fragment_text(&self, _href: &str, fragment_id: Option<&str>) -> Option<String> {
        fragment_id.and_then(|id| self.texts.get(id).cloned())
    }

    fn embedded_media(
        &mut self,
        _href: &str,
        fragment_id: Option<&str>,
    ) -> Option<Box<dyn EmbeddedMediaHandle>> {
        let fragment = fragment_id.filter(|id| self.embedded.contains(*id))?;
        Some(Box::new(FakeEmbedded {
            log: self.log.clone(),
            fragment: fragment.to_string(),
        }))
    }
}

/// Scheduler that holds events until [`Harness::fire_scheduled`]
#[derive(Clone, Default)]
pub struct ManualScheduler {
    pending: Arc<Mutex<Vec<(Duration, PlayerEvent)>>>,
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, event: PlayerEvent) {
        self.pending.lock().unwrap().push((delay, event));
    }
}

// ================================================================================================
// Harness
// ================================================================================================

pub struct Harness {
    pub player: MediaOverlayPlayer,
    pub log: CallLog,
    pub events: broadcast::Receiver<SyncEvent>,
    pub scheduler: ManualScheduler,
    pub fail_audio: Arc<AtomicBool>,
    /// Source the fake audio device has loaded
    pub loaded_src: Arc<Mutex<Option<String>>>,
}

impl Harness {
    pub fn new(publication: Value, settings: PlayerSettings) -> Self {
        Self::with_content(publication, settings, FakeContent::default())
    }

    pub fn with_content(publication: Value, settings: PlayerSettings, content: FakeContent) -> Self {
        let aggregate = TimelineAggregate::from_json(&publication.to_string())
            .expect("publication fixture should load");
        let log = CallLog::default();
        let scheduler = ManualScheduler::default();
        let fail_audio = Arc::new(AtomicBool::new(false));
        let loaded_src = Arc::new(Mutex::new(None));

        let devices = Devices {
            audio: Box::new(FakeAudio {
                log: log.clone(),
                fail_play: fail_audio.clone(),
                loaded: loaded_src.clone(),
            }),
            speech: Box::new(FakeSpeech { log: log.clone() }),
            highlighter: Box::new(FakeHighlighter { log: log.clone() }),
            loader: Box::new(FakeLoader { log: log.clone() }),
            content: Box::new(FakeContent {
                log: log.clone(),
                ..content
            }),
            scheduler: Box::new(scheduler.clone()),
        };

        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let player = MediaOverlayPlayer::new(Arc::new(aggregate), devices, settings, bus);
        log.take();

        Self {
            player,
            log,
            events,
            scheduler,
            fail_audio,
            loaded_src,
        }
    }

    pub fn send(&mut self, event: PlayerEvent) {
        self.player.handle_event(event);
    }

    /// Position report from whatever the audio device has loaded
    pub fn position(&mut self, seconds: f64) {
        let src = self.loaded_src.lock().unwrap().clone().unwrap_or_default();
        self.position_in(&src, seconds);
    }

    /// Position report measured in `src`
    pub fn position_in(&mut self, src: &str, seconds: f64) {
        self.send(PlayerEvent::AudioPosition {
            src: src.to_string(),
            seconds,
        });
    }

    /// Ticket of the most recent load request
    pub fn last_ticket(&self) -> LoadTicket {
        self.log
            .all()
            .iter()
            .rev()
            .find_map(|call| match call {
                Call::Load { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .expect("a document load should have been requested")
    }

    /// Answer the most recent load request
    pub fn complete_load(&mut self) {
        let ticket = self.last_ticket();
        self.send(PlayerEvent::DocumentLoaded { ticket });
    }

    /// `play()` then let the first document render
    pub fn start(&mut self) {
        self.player.play();
        self.complete_load();
    }

    /// Deliver every scheduled event, returning what was delivered
    pub fn fire_scheduled(&mut self) -> Vec<PlayerEvent> {
        let due: Vec<PlayerEvent> = std::mem::take(&mut *self.scheduler.pending.lock().unwrap())
            .into_iter()
            .map(|(_, event)| event)
            .collect();
        for event in &due {
            self.player.handle_event(event.clone());
        }
        due
    }

    pub fn scheduled(&self) -> Vec<(Duration, PlayerEvent)> {
        self.scheduler.pending.lock().unwrap().clone()
    }

    /// Drop scheduled events without delivering them
    pub fn take_scheduled(&self) -> Vec<PlayerEvent> {
        std::mem::take(&mut *self.scheduler.pending.lock().unwrap())
            .into_iter()
            .map(|(_, event)| event)
            .collect()
    }

    pub fn emitted(&mut self) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn highlighted_fragment(&self) -> Option<String> {
        self.player.highlighted().and_then(|t| t.fragment_id.clone())
    }

    pub fn state(&self) -> PlayerState {
        self.player.state().clone()
    }

    pub fn is_playing_audio(&self) -> bool {
        self.state() == PlayerState::Playing(Sounding::Audio)
    }
}

// ================================================================================================
// Publication fixtures
// ================================================================================================

pub fn par(src: &str, audio: &str, begin: f64, end: f64) -> Value {
    json!({
        "nodeType": "par",
        "children": [
            {"nodeType": "text", "src": src},
            {"nodeType": "audio", "src": audio, "clipBegin": begin, "clipEnd": end}
        ]
    })
}

pub fn silent_par(src: &str) -> Value {
    json!({
        "nodeType": "par",
        "children": [{"nodeType": "text", "src": src}]
    })
}

pub fn typed(epub_type: &str, mut node: Value) -> Value {
    node["epubType"] = json!(epub_type);
    node
}

pub fn seq(children: Vec<Value>) -> Value {
    json!({"nodeType": "seq", "children": children})
}

pub fn seq_ref(text_ref: &str, children: Vec<Value>) -> Value {
    json!({"nodeType": "seq", "textRef": text_ref, "children": children})
}

pub fn timeline(document_id: &str, href: &str, children: Vec<Value>) -> Value {
    json!({
        "documentId": document_id,
        "documentHref": href,
        "root": seq(children)
    })
}

pub fn blank_timeline(href: &str) -> Value {
    json!({
        "documentHref": href,
        "root": seq(vec![silent_par(href)])
    })
}

pub fn publication(timelines: Vec<Value>) -> Value {
    json!({ "timelines": timelines })
}

/// `c1`: p1 [0,2], p2 [2,5], p3 [5,6] of c1.mp3
pub fn chapter_one() -> Value {
    timeline(
        "c1",
        "c1.xhtml",
        vec![
            par("c1.xhtml#p1", "c1.mp3", 0.0, 2.0),
            par("c1.xhtml#p2", "c1.mp3", 2.0, 5.0),
            par("c1.xhtml#p3", "c1.mp3", 5.0, 6.0),
        ],
    )
}

/// `c2`: q1 [0,3], q2 [3,4] of c2.mp3
pub fn chapter_two() -> Value {
    timeline(
        "c2",
        "c2.xhtml",
        vec![
            par("c2.xhtml#q1", "c2.mp3", 0.0, 3.0),
            par("c2.xhtml#q2", "c2.mp3", 3.0, 4.0),
        ],
    )
}

/// Two chapters, 10 s of narration
pub fn two_chapters() -> Value {
    publication(vec![chapter_one(), chapter_two()])
}

pub fn play_clip(src: &str, start: f64) -> Call {
    Call::PlayClip {
        src: src.to_string(),
        start,
    }
}

pub fn highlight(fragment: &str) -> Call {
    Call::Highlight(Some(fragment.to_string()))
}
