//! Shared test utilities
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parley_gateway::agent::{AgentPipeline, CapabilityCatalog};
use parley_gateway::call::{ActiveCall, CallServices, StreamStart, Transcript};
use parley_gateway::channels::{OutboundChannel, SendReceipt};
use parley_gateway::db::{self, CallStore, MemoryRecord, MemoryStore, MemoryUpdate};
use parley_gateway::providers::{CompletionCascade, CompletionProvider, CompletionRequest};
use parley_gateway::voice::{AudioStream, MediaSink, SpeechSynthesizer, SttFrame, SttWord};
use parley_gateway::{Config, DbPool, Error, Result};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// What a scripted provider does on each call
#[derive(Clone)]
pub enum Script {
    Reply(String),
    Fail,
    Empty,
    /// Reply after a delay
    Slow(Duration, String),
}

/// Completion provider with a fixed behaviour and a call counter
pub struct ScriptedProvider {
    name: String,
    script: Script,
    calls: AtomicUsize,
    last: StdMutex<Option<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script,
            calls: AtomicUsize::new(0),
            last: StdMutex::new(None),
        })
    }

    pub fn replying(name: &str, text: &str) -> Arc<Self> {
        Self::new(name, Script::Reply(text.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request.clone());
        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Fail => Err(Error::provider(&self.name, "503: overloaded")),
            Script::Empty => Ok("   ".to_string()),
            Script::Slow(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
        }
    }
}

/// Cascade over scripted providers
pub fn cascade(providers: &[Arc<ScriptedProvider>]) -> CompletionCascade {
    CompletionCascade::new(
        providers
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn CompletionProvider>)
            .collect(),
    )
}

/// Records frames and clear requests
#[derive(Default)]
pub struct RecordingSink {
    pub frames: AtomicUsize,
    pub clears: AtomicUsize,
}

impl RecordingSink {
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSink for RecordingSink {
    async fn send_audio(&self, _frame: &[u8]) -> Result<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Synthesizer producing a fixed amount of μ-law silence per line
pub struct CannedSynth {
    pub bytes: usize,
}

#[async_trait]
impl SpeechSynthesizer for CannedSynth {
    async fn synthesize(&self, _text: &str) -> Result<AudioStream> {
        let chunks: Vec<Result<Vec<u8>>> = vec![0xFFu8; self.bytes]
            .chunks(400)
            .map(|c| Ok(c.to_vec()))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Memory store with no records that remembers inserts
#[derive(Default)]
pub struct StubMemory {
    pub inserted: StdMutex<Vec<MemoryRecord>>,
}

#[async_trait]
impl MemoryStore for StubMemory {
    async fn search(&self, keyword: &str) -> Result<Vec<MemoryRecord>> {
        Ok(self
            .inserted
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.subject.contains(keyword) || r.content.contains(keyword))
            .cloned()
            .collect())
    }

    async fn insert(&self, record: MemoryRecord) -> Result<()> {
        self.inserted.lock().unwrap().push(record);
        Ok(())
    }

    async fn update(&self, _id: &str, _update: MemoryUpdate) -> Result<bool> {
        Ok(false)
    }
}

/// In-memory call store
#[derive(Default)]
pub struct StubCalls {
    pub transcripts: StdMutex<HashMap<String, Transcript>>,
    pub summaries: StdMutex<HashMap<String, String>>,
}

impl StubCalls {
    pub fn with_summary(phone: &str, summary: &str) -> Self {
        let calls = Self::default();
        calls
            .summaries
            .lock()
            .unwrap()
            .insert(phone.to_string(), summary.to_string());
        calls
    }
}

#[async_trait]
impl CallStore for StubCalls {
    async fn save_transcript(&self, transcript: &Transcript) -> Result<()> {
        self.transcripts
            .lock()
            .unwrap()
            .insert(transcript.call_id.clone(), transcript.clone());
        Ok(())
    }

    async fn load_transcript(&self, call_id: &str) -> Result<Option<Transcript>> {
        Ok(self.transcripts.lock().unwrap().get(call_id).cloned())
    }

    async fn save_summary(&self, phone: &str, _call_id: &str, summary: &str) -> Result<()> {
        self.summaries
            .lock()
            .unwrap()
            .insert(phone.to_string(), summary.to_string());
        Ok(())
    }

    async fn latest_summary(&self, phone: &str) -> Result<Option<String>> {
        Ok(self.summaries.lock().unwrap().get(phone).cloned())
    }
}

/// Outbound channel that records sends
pub struct RecordingChannel {
    pub texts: StdMutex<Vec<(String, String)>>,
    pub emails: StdMutex<Vec<(String, String)>>,
    sms_ok: bool,
    email_ok: bool,
}

impl RecordingChannel {
    pub fn new(sms_ok: bool, email_ok: bool) -> Arc<Self> {
        Arc::new(Self {
            texts: StdMutex::new(Vec::new()),
            emails: StdMutex::new(Vec::new()),
            sms_ok,
            email_ok,
        })
    }

    pub fn texts(&self) -> Vec<(String, String)> {
        self.texts.lock().unwrap().clone()
    }

    pub fn email_count(&self) -> usize {
        self.emails.lock().unwrap().len()
    }
}

#[async_trait]
impl OutboundChannel for RecordingChannel {
    async fn send_text(&self, to: &str, body: &str) -> SendReceipt {
        self.texts
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        if self.sms_ok {
            SendReceipt::sent(Some("SM1".to_string()))
        } else {
            SendReceipt::failed()
        }
    }

    async fn send_email(&self, to: &str, subject: &str, _html: &str) -> SendReceipt {
        self.emails
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        if self.email_ok {
            SendReceipt::sent(None)
        } else {
            SendReceipt::failed()
        }
    }
}

/// Collaborators for a test call
pub struct Harness {
    pub services: Arc<CallServices>,
    pub sink: Arc<RecordingSink>,
    pub channel: Arc<RecordingChannel>,
    pub calls: Arc<StubCalls>,
    pub memory: Arc<StubMemory>,
}

impl Harness {
    /// Default config, one scripted provider, short synthesized lines
    pub fn new(provider: &Arc<ScriptedProvider>) -> Self {
        Self::with(Config::default(), provider, StubCalls::default())
    }

    pub fn with(config: Config, provider: &Arc<ScriptedProvider>, calls: StubCalls) -> Self {
        Self::with_synth(config, provider, calls, 640)
    }

    pub fn with_synth(
        config: Config,
        provider: &Arc<ScriptedProvider>,
        calls: StubCalls,
        synth_bytes: usize,
    ) -> Self {
        Self::with_providers(config, std::slice::from_ref(provider), calls, synth_bytes)
    }

    /// Several providers, tried in the given order
    pub fn with_providers(
        config: Config,
        providers: &[Arc<ScriptedProvider>],
        calls: StubCalls,
        synth_bytes: usize,
    ) -> Self {
        let memory = Arc::new(StubMemory::default());
        let calls = Arc::new(calls);
        let channel = RecordingChannel::new(true, true);

        let pipeline = AgentPipeline::new(
            cascade(providers),
            Arc::clone(&memory) as Arc<dyn MemoryStore>,
            CapabilityCatalog::new(config.capabilities.clone()),
            config.persona.clone(),
            config.owner.clone(),
        )
        .with_voice_attempt_timeout(config.llm.voice_attempt_timeout);

        let services = Arc::new(CallServices::new(
            &config,
            pipeline,
            Arc::clone(&calls) as Arc<dyn CallStore>,
            Arc::clone(&channel) as Arc<dyn OutboundChannel>,
            Arc::new(CannedSynth { bytes: synth_bytes }),
            None,
        ));

        Self {
            services,
            sink: Arc::new(RecordingSink::default()),
            channel,
            calls,
            memory,
        }
    }

    /// Start a call from `phone` and let the greeting play
    pub async fn start_call(&self, phone: Option<&str>) -> Arc<ActiveCall> {
        let call = ActiveCall::start(
            Arc::clone(&self.services),
            Arc::clone(&self.sink) as Arc<dyn MediaSink>,
            StreamStart {
                stream_id: "MZ-test".to_string(),
                call_id: "CA-test".to_string(),
                caller_phone: phone.map(ToString::to_string),
            },
        )
        .await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        call
    }
}

/// A final recognizer frame attributed to one speaker
pub fn final_frame(text: &str, speaker: u32) -> SttFrame {
    let words = text
        .split_whitespace()
        .map(|w| SttWord::new(w, Some(speaker)))
        .collect();
    SttFrame::final_result(text, words)
}

/// Say something as the primary caller and wait out the whole turn cycle
pub async fn caller_says(call: &Arc<ActiveCall>, text: &str) {
    call.on_frame(final_frame(text, 0)).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
}
