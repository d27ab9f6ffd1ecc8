//! Live call orchestration
//!
//! An [`ActiveCall`] owns one call's session state, its timers and its
//! playback. Recognizer frames drive it:
//!
//! ```text
//! final frame ──► speaker gate ──► buffer + debounce ──► dispatch (agent turn)
//!                     │                                        │
//!                bystander log                        pacing delay ──► speak reply
//!                                                              │
//! speech started ──► cancel pacing + steering;            steering injection
//!                    if playing: stop playback, clear
//! ```
//!
//! Lock order is session before tasks, and neither is held across playback.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::followup::{FollowUp, send_followup};
use super::identity::{ContactDirectory, resolve_identity};
use super::registry::SessionRegistry;
use super::session::CallSession;
use super::tasks::CallTasks;
use super::transcript::TranscriptRole;
use crate::agent::{
    AgentPipeline, Intent, ReplyMode, TurnReply, TurnRequest, classify_intent, extract_caller_name,
};
use crate::channels::OutboundChannel;
use crate::config::{Config, OwnerConfig};
use crate::db::{CallStore, MemoryStore};
use crate::providers::ChatTurn;
use crate::steering::{SteeringEngine, Touchpoint};
use crate::voice::{
    MediaSink, PacingConfig, PlaybackController, PlaybackOutcome, SpeechRecognizer,
    SpeechSynthesizer, SttConnection, SttFrame, TurnPhase, VoiceActivity, debounce_interval,
    response_delay,
};

/// Spoken when an agent turn overruns the response timeout
pub const RECOVERY_LINE: &str =
    "Sorry, I had a little hiccup on my end there. Could you say that one more time?";

/// Shared collaborators for every call
pub struct CallServices {
    pub pipeline: AgentPipeline,
    pub steering: SteeringEngine,
    pub directory: ContactDirectory,
    pub calls: Arc<dyn CallStore>,
    pub channel: Arc<dyn OutboundChannel>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// `None` runs calls without transcription
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    pub pacing: PacingConfig,
    pub greeting_delay: Duration,
    pub response_timeout: Duration,
    pub owner: OwnerConfig,
    pub registry: SessionRegistry<ActiveCall>,
}

impl CallServices {
    /// Wire services from config plus the concrete adapters
    #[must_use]
    pub fn new(
        config: &Config,
        pipeline: AgentPipeline,
        calls: Arc<dyn CallStore>,
        channel: Arc<dyn OutboundChannel>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
    ) -> Self {
        Self {
            pipeline,
            steering: SteeringEngine::new(config.steering.clone(), &config.persona, &config.owner),
            directory: ContactDirectory::from_config(&config.owner, &config.contacts),
            calls,
            channel,
            synthesizer,
            recognizer,
            pacing: config.pacing.clone(),
            greeting_delay: config.voice.greeting_delay,
            response_timeout: config.voice.response_timeout,
            owner: config.owner.clone(),
            registry: SessionRegistry::new(),
        }
    }

    fn memory(&self) -> Arc<dyn MemoryStore> {
        self.pipeline.memory()
    }
}

/// Stream metadata from the carrier's start event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStart {
    pub stream_id: String,
    pub call_id: String,
    pub caller_phone: Option<String>,
}

/// One live call
pub struct ActiveCall {
    services: Arc<CallServices>,
    call_id: String,
    stream_id: String,
    session: Mutex<CallSession>,
    tasks: Mutex<CallTasks>,
    playback: PlaybackController,
    stt: Mutex<Option<SttConnection>>,
}

impl ActiveCall {
    /// Set up a call: resolve the caller, register it, connect STT and
    /// schedule the greeting
    pub async fn start(
        services: Arc<CallServices>,
        sink: Arc<dyn MediaSink>,
        start: StreamStart,
    ) -> Arc<Self> {
        let memory = services.memory();
        let identity = resolve_identity(
            &services.directory,
            memory.as_ref(),
            start.caller_phone.as_deref(),
        )
        .await;

        let prior = match identity.phone.as_deref() {
            Some(phone) => services.calls.latest_summary(phone).await.unwrap_or_else(|e| {
                tracing::warn!(call_id = %start.call_id, error = %e, "prior summary lookup failed");
                None
            }),
            None => None,
        };
        let identity = identity.with_history(prior);
        let touchpoints = services.steering.begin(&identity);
        let category = touchpoints.category();

        let session = CallSession::new(
            &start.call_id,
            &start.stream_id,
            identity.phone.clone(),
            identity,
            touchpoints,
        );

        let call = Arc::new(Self {
            playback: PlaybackController::new(Arc::clone(&services.synthesizer), sink),
            services: Arc::clone(&services),
            call_id: start.call_id.clone(),
            stream_id: start.stream_id.clone(),
            session: Mutex::new(session),
            tasks: Mutex::new(CallTasks::default()),
            stt: Mutex::new(None),
        });

        if let Some(previous) = services.registry.put(&start.stream_id, Arc::clone(&call)).await {
            tracing::warn!(stream_id = %start.stream_id, "stream restarted, replacing previous call");
            previous.stop().await;
        }

        tracing::info!(
            call_id = %call.call_id,
            stream_id = %call.stream_id,
            category = category.as_str(),
            "call started"
        );

        call.connect_stt().await;
        call.schedule_greeting().await;
        call
    }

    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Session state, for inspection
    pub async fn session(&self) -> tokio::sync::MutexGuard<'_, CallSession> {
        self.session.lock().await
    }

    async fn connect_stt(self: &Arc<Self>) {
        let Some(recognizer) = self.services.recognizer.clone() else {
            tracing::warn!(call_id = %self.call_id, "no speech recognizer configured");
            return;
        };

        let mut connection = match recognizer.connect(&self.call_id).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(call_id = %self.call_id, error = %e, "STT unavailable, call continues without it");
                return;
            }
        };

        if let Some(mut frames) = connection.take_frames() {
            let call = Arc::clone(self);
            self.tasks.lock().await.stt_pump.schedule(Duration::ZERO, async move {
                while let Some(frame) = frames.recv().await {
                    call.on_frame(frame).await;
                }
                tracing::debug!(call_id = %call.call_id, "STT frame stream ended");
            });
        }
        *self.stt.lock().await = Some(connection);
    }

    async fn schedule_greeting(self: &Arc<Self>) {
        let call = Arc::clone(self);
        let delay = self.services.greeting_delay;
        self.tasks.lock().await.greeting.schedule(delay, async move {
            let text = {
                let mut session = call.session.lock().await;
                if session.ended {
                    return;
                }
                let identity = session.identity.clone();
                let text = call.services.steering.greeting(&mut session.touchpoints, &identity);
                session.turns.push(ChatTurn::assistant(&text));
                text
            };
            call.say(&text).await;
        });
    }

    /// Forward caller audio to the recognizer
    pub async fn on_audio(&self, chunk: Vec<u8>) {
        let mut stt = self.stt.lock().await;
        let lost = stt.as_ref().is_some_and(|conn| !conn.send_audio(chunk));
        if lost {
            tracing::warn!(call_id = %self.call_id, "STT connection lost, call continues without transcription");
            if let Some(conn) = stt.take() {
                conn.close();
            }
        }
    }

    /// Handle one recognizer frame
    pub async fn on_frame(self: &Arc<Self>, frame: SttFrame) {
        match frame.event {
            Some(VoiceActivity::SpeechStarted) => {
                if self.playback.is_playing() {
                    self.barge_in().await;
                } else {
                    self.tasks.lock().await.cancel_for_barge_in();
                }
                return;
            }
            Some(VoiceActivity::UtteranceEnd) => {
                self.tasks.lock().await.debounce.cancel();
                Arc::clone(self).flush().await;
                return;
            }
            None => {}
        }

        if !frame.is_final_utterance() {
            return;
        }

        let speaker = frame.dominant_speaker();
        let words = frame.word_count();
        let text = frame.text.trim();

        let interval = {
            let mut session = self.session.lock().await;
            if session.ended {
                return;
            }
            if !session.speakers.register(speaker, words) {
                session.transcript.record(TranscriptRole::Bystander, speaker, text);
                tracing::debug!(call_id = %self.call_id, ?speaker, "bystander utterance logged, not dispatched");
                return;
            }

            session.transcript.record(TranscriptRole::Caller, speaker, text);
            session.last_speech = Some(Instant::now());
            session.turn_taker.push_final(text);

            (session.turn_taker.phase() == TurnPhase::Accumulating).then(|| {
                debounce_interval(
                    &self.services.pacing,
                    session.touchpoints.turn,
                    session.turn_taker.pending_words(),
                    session.turn_taker.last_reply_words(),
                )
            })
        };

        let mut tasks = self.tasks.lock().await;
        tasks.steering.cancel();
        if let Some(interval) = interval {
            let call = Arc::clone(self);
            tasks.debounce.schedule(interval, async move { call.flush().await });
        }
    }

    /// Caller talked over playback
    pub async fn barge_in(&self) {
        let was_playing = self.playback.cancel();
        if let Err(e) = self.playback.sink().clear().await {
            tracing::warn!(call_id = %self.call_id, error = %e, "failed to clear downstream audio");
        }
        self.tasks.lock().await.cancel_for_barge_in();
        tracing::debug!(call_id = %self.call_id, was_playing, "barge-in");
    }

    /// Dispatch the buffered utterance unless a dispatch is already in flight
    ///
    /// Boxed because dispatch re-arms the debounce timer with this future.
    fn flush(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let utterance = {
                let mut session = self.session.lock().await;
                if session.ended {
                    return;
                }
                session.turn_taker.take_for_dispatch()
            };
            let Some(utterance) = utterance else {
                return;
            };

            let call = Arc::clone(&self);
            self.tasks
                .lock()
                .await
                .dispatch
                .schedule(Duration::ZERO, async move { call.dispatch(utterance).await });
        })
    }

    async fn dispatch(self: Arc<Self>, utterance: String) {
        let services = Arc::clone(&self.services);
        tracing::debug!(call_id = %self.call_id, chars = utterance.len(), "dispatching caller turn");

        let (history, identity, touchpoints, accepted_sms) = {
            let mut session = self.session.lock().await;
            if session.touchpoints.caller_name.is_none()
                && let Some(name) = extract_caller_name(&utterance)
            {
                tracing::debug!(call_id = %self.call_id, name = %name, "caller introduced themselves");
                session.touchpoints.caller_name = Some(name);
            }
            let accepted = services.steering.accepts_sms_offer(&session.touchpoints, &utterance)
                && session.touchpoints.claim_sms_trigger();
            (
                session.turns.clone(),
                session.identity.clone(),
                session.touchpoints.clone(),
                accepted,
            )
        };

        if accepted_sms {
            self.send_caller_sms().await;
        }

        let request = TurnRequest {
            utterance: &utterance,
            history: &history,
            identity: &identity,
            touchpoints: Some(&touchpoints),
            mode: ReplyMode::Voice,
        };
        let reply = match tokio::time::timeout(services.response_timeout, services.pipeline.respond(request)).await {
            Ok(reply) => reply,
            Err(_) => {
                tracing::warn!(call_id = %self.call_id, timeout_ms = services.response_timeout.as_millis(), "agent turn timed out");
                TurnReply {
                    text: RECOVERY_LINE.to_string(),
                    intent: classify_intent(&utterance),
                    provider: None,
                }
            }
        };

        let goodbye = reply.intent == Intent::Goodbye;
        let utterance_words = utterance.split_whitespace().count();
        let reply_words = reply.text.split_whitespace().count();

        let (interjection, rearm) = {
            let mut session = self.session.lock().await;
            if session.ended {
                tracing::debug!(call_id = %self.call_id, "call ended during dispatch, discarding reply");
                return;
            }
            session.turns.push(ChatTurn::user(&utterance));
            session.turns.push(ChatTurn::assistant(&reply.text));

            let covered = services
                .steering
                .observe(&mut session.touchpoints, &utterance, &reply.text, reply.intent);
            let turn = session.touchpoints.advance_turn();
            tracing::debug!(
                call_id = %self.call_id,
                turn,
                intent = reply.intent.as_str(),
                provider = reply.provider.as_deref().unwrap_or("none"),
                covered = covered.len(),
                "agent turn complete"
            );

            let interjection = if goodbye {
                services.steering.goodbye_override(&mut session.touchpoints)
            } else {
                None
            };

            session.turn_taker.finish_dispatch(reply_words);
            let rearm = session.turn_taker.has_pending().then(|| {
                debounce_interval(
                    &services.pacing,
                    session.touchpoints.turn,
                    session.turn_taker.pending_words(),
                    session.turn_taker.last_reply_words(),
                )
            });
            (interjection, rearm)
        };

        if interjection.is_some() {
            self.send_caller_sms().await;
        }

        let delay = response_delay(
            &services.pacing,
            reply.intent == Intent::Question,
            utterance_words,
            reply_words,
        );

        let call = Arc::clone(&self);
        let mut tasks = self.tasks.lock().await;
        tasks.pacing.schedule(delay, async move {
            call.deliver(interjection, reply.text, goodbye).await;
        });
        if let Some(interval) = rearm {
            let call = Arc::clone(&self);
            tasks.debounce.schedule(interval, async move { call.flush().await });
        }
    }

    /// Speak a reply (after any goodbye interjection), then consider steering
    async fn deliver(self: Arc<Self>, interjection: Option<String>, reply: String, goodbye: bool) {
        if let Some(line) = interjection
            && !self.say(&line).await
        {
            return;
        }

        if self.say(&reply).await && !goodbye {
            self.schedule_injection().await;
        }
    }

    async fn schedule_injection(self: &Arc<Self>) {
        let call = Arc::clone(self);
        let delay = self.services.steering.injection_delay();
        self.tasks.lock().await.steering.schedule(delay, async move {
            call.inject().await;
        });
    }

    async fn inject(&self) {
        let injection = {
            let session = self.session.lock().await;
            if session.ended || session.turn_taker.phase() != TurnPhase::Idle {
                return;
            }
            self.services.steering.next_injection(&session.touchpoints)
        };
        let Some(injection) = injection else {
            return;
        };

        tracing::debug!(call_id = %self.call_id, touchpoint = injection.touchpoint.as_str(), "steering injection");
        if self.say(&injection.text).await {
            let mut session = self.session.lock().await;
            session.touchpoints.mark(injection.touchpoint);
            session
                .turns
                .push(ChatTurn::assistant(&injection.text));
        }
    }

    /// Log and speak a line; true if it played to the end
    async fn say(&self, text: &str) -> bool {
        self.session
            .lock()
            .await
            .transcript
            .record(TranscriptRole::Agent, None, text);

        match self.playback.speak(text).await {
            Ok(PlaybackOutcome::Completed) => true,
            Ok(PlaybackOutcome::Interrupted) => false,
            Err(e) => {
                tracing::warn!(call_id = %self.call_id, error = %e, "playback failed");
                false
            }
        }
    }

    /// Text the caller the scripted SMS; marks `SMS_SENT` only on success
    async fn send_caller_sms(&self) -> bool {
        let (phone, body) = {
            let session = self.session.lock().await;
            (
                session.caller_phone.clone(),
                self.services.steering.sms_body(&session.touchpoints),
            )
        };

        let Some(phone) = phone else {
            self.session.lock().await.transcript.record(
                TranscriptRole::System,
                None,
                "SMS skipped: caller number unknown",
            );
            return false;
        };

        let receipt = self.services.channel.send_text(&phone, &body).await;
        let mut session = self.session.lock().await;
        if receipt.success {
            session.touchpoints.mark(Touchpoint::SmsSent);
            session
                .transcript
                .record(TranscriptRole::System, None, "SMS sent to caller");
        } else {
            tracing::warn!(call_id = %self.call_id, "SMS to caller failed");
            session
                .transcript
                .record(TranscriptRole::System, None, "SMS to caller failed");
        }
        receipt.success
    }

    /// Tear the call down: persist, summarize, follow up, release resources
    ///
    /// Idempotent.
    pub async fn stop(self: &Arc<Self>) {
        {
            let mut session = self.session.lock().await;
            if session.ended {
                return;
            }
            session.ended = true;
        }

        self.playback.cancel();
        self.tasks.lock().await.cancel_all();
        if let Some(conn) = self.stt.lock().await.take() {
            conn.close();
        }
        if let Some(current) = self.services.registry.get(&self.stream_id).await
            && Arc::ptr_eq(&current, self)
        {
            self.services.registry.remove(&self.stream_id).await;
        }

        let (transcript, trivial, stats, summary, caller, phone, is_owner) = {
            let mut session = self.session.lock().await;
            let trivial = session.transcript.is_trivial();
            let stats = session.stats();
            let summary = session.summary();
            let caller = session.caller_label();
            (
                session.seal_transcript(),
                trivial,
                stats,
                summary,
                caller,
                session.caller_phone.clone(),
                session.identity.is_owner(),
            )
        };

        let services = &self.services;
        if !trivial && let Err(e) = services.calls.save_transcript(&transcript).await {
            tracing::warn!(call_id = %self.call_id, error = %e, "failed to persist transcript");
        }

        if stats.caller_turns > 0
            && let Some(phone) = phone.as_deref()
            && let Err(e) = services.calls.save_summary(phone, &self.call_id, &summary).await
        {
            tracing::warn!(call_id = %self.call_id, error = %e, "failed to persist call summary");
        }

        if !is_owner && stats.caller_turns > 0 {
            let channel = Arc::clone(&services.channel);
            let memory = services.memory();
            let owner = services.owner.clone();
            let followup = FollowUp {
                call_id: self.call_id.clone(),
                caller,
                summary,
            };
            tokio::spawn(async move {
                send_followup(channel.as_ref(), memory.as_ref(), &owner, &followup).await;
            });
        }

        tracing::info!(
            call_id = %self.call_id,
            stream_id = %self.stream_id,
            duration_secs = stats.duration.as_secs(),
            caller_turns = stats.caller_turns,
            agent_turns = stats.agent_turns,
            bystander_turns = stats.bystander_turns,
            speakers = stats.distinct_speakers,
            "call ended"
        );
    }
}
