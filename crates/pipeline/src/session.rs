//! Session controller
//!
//! One controller per connection, running as a single logical actor: inbound
//! audio and every stage completion arrive on one channel, so stage handlers
//! never race each other and no locking is needed. Provider calls run in
//! spawned tasks that post their results back onto the same channel, which
//! keeps segmentation live while a provider call is suspended — that is what
//! makes mid-generation interruption possible.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use voice_loop_config::PipelineConfig;
use voice_loop_core::{ChatMessage, History, MessageId, TARGET_FORMAT};
use voice_loop_providers::{
    Completion, PromptMessage, ProviderError, ProviderSet, Transcription,
};

use crate::events::SessionEvent;
use crate::gate::{GateRejection, TranscriptionGate};
use crate::pacing::{PlaybackClock, SynthJob, SynthesisQueue};
use crate::segmenter::{SegmenterEvent, SpeechSegmenter};
use crate::splitter::SentenceSplitter;
use crate::vad::SpeechScorer;

/// Inbound messages to a session's actor loop.
#[derive(Debug)]
pub enum SessionInput {
    /// Raw PCM audio from the client.
    Audio(Vec<u8>),
    /// A transcription finished.
    Transcribed(Result<Transcription, ProviderError>),
    /// Progress from the active reply task.
    Reply(ReplyEvent),
}

/// Events posted by a reply task. Every event carries the message-id the
/// reply was started under; the controller discards events whose id no
/// longer matches the session's current one.
#[derive(Debug)]
pub enum ReplyEvent {
    FirstToken {
        message_id: MessageId,
    },
    Sentence {
        message_id: MessageId,
        text: String,
    },
    Complete {
        message_id: MessageId,
    },
    Failed {
        message_id: MessageId,
        error: String,
    },
}

impl ReplyEvent {
    fn message_id(&self) -> &MessageId {
        match self {
            ReplyEvent::FirstToken { message_id }
            | ReplyEvent::Sentence { message_id, .. }
            | ReplyEvent::Complete { message_id }
            | ReplyEvent::Failed { message_id, .. } => message_id,
        }
    }
}

/// Handle to a spawned session.
pub struct SessionHandle {
    /// Feed audio (and, internally, stage completions).
    pub input: mpsc::Sender<SessionInput>,
    /// Ordered outbound events for the client.
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Spawn a session actor and its synthesis queue worker.
pub fn spawn_session(
    providers: ProviderSet,
    config: PipelineConfig,
    scorer: Box<dyn SpeechScorer>,
) -> SessionHandle {
    let (input_tx, input_rx) = mpsc::channel(64);
    let (events_tx, events_rx) = mpsc::channel(256);

    // The controller keeps only a weak handle to its own inbox: stage tasks
    // upgrade it for the duration of one provider call. Once the connection
    // drops its sender and no stage task is in flight, the actor loop ends.
    let controller =
        SessionController::new(providers, config, scorer, input_tx.downgrade(), events_tx);
    tokio::spawn(controller.run(input_rx));

    SessionHandle {
        input: input_tx,
        events: events_rx,
    }
}

struct SessionController {
    config: PipelineConfig,
    providers: ProviderSet,
    segmenter: SpeechSegmenter,
    gate: TranscriptionGate,
    queue: SynthesisQueue,
    playback: PlaybackClock,
    history: History,
    /// Id of the utterance the active reply belongs to.
    current_id: Option<MessageId>,
    current_id_tx: watch::Sender<Option<MessageId>>,
    reply_cancel: Option<CancellationToken>,
    /// Id claimed when a segment entered the transcription gate.
    pending_transcript_id: Option<MessageId>,
    last_processed_transcript: Option<String>,
    last_synced: Vec<ChatMessage>,
    language: Option<String>,
    awaiting_first_sentence: bool,
    input_tx: mpsc::WeakSender<SessionInput>,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionController {
    fn new(
        providers: ProviderSet,
        config: PipelineConfig,
        scorer: Box<dyn SpeechScorer>,
        input_tx: mpsc::WeakSender<SessionInput>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let playback = PlaybackClock::new();
        let (current_id_tx, current_id_rx) = watch::channel(None);

        let gate = TranscriptionGate::new(
            providers.transcriber.clone(),
            TARGET_FORMAT,
            config.stt.min_audio_ms,
        );
        let queue = SynthesisQueue::spawn(
            providers.synthesizer.clone(),
            providers.normalizer.clone(),
            config.pacing.clone(),
            TARGET_FORMAT,
            current_id_rx,
            playback.clone(),
            events.clone(),
        );
        let segmenter = SpeechSegmenter::new(config.vad.clone(), scorer);

        Self {
            config,
            providers,
            segmenter,
            gate,
            queue,
            playback,
            history: History::new(),
            current_id: None,
            current_id_tx,
            reply_cancel: None,
            pending_transcript_id: None,
            last_processed_transcript: None,
            last_synced: Vec::new(),
            language: None,
            awaiting_first_sentence: false,
            input_tx,
            events,
        }
    }

    async fn run(mut self, mut input: mpsc::Receiver<SessionInput>) {
        while let Some(message) = input.recv().await {
            match message {
                SessionInput::Audio(bytes) => self.on_audio(&bytes).await,
                SessionInput::Transcribed(result) => self.on_transcribed(result).await,
                SessionInput::Reply(event) => self.on_reply_event(event).await,
            }
        }

        // Disconnect: stop in-flight work and discard any speech tail.
        if let Some(token) = self.reply_cancel.take() {
            token.cancel();
        }
        if let Some(SegmenterEvent::SpeechEnded { duration_ms, .. }) = self.segmenter.force_end()
        {
            tracing::debug!(duration_ms, "discarding speech tail at disconnect");
        }
        tracing::info!("session closed");
    }

    async fn on_audio(&mut self, bytes: &[u8]) {
        for event in self.segmenter.push_bytes(bytes) {
            match event {
                SegmenterEvent::SpeechStarted { at_ms } => {
                    tracing::debug!(at_ms, "speech started");
                    self.emit(SessionEvent::SpeechStart).await;
                    self.interrupt();
                }
                SegmenterEvent::SpeechEnded { audio, duration_ms } => {
                    tracing::debug!(duration_ms, bytes = audio.len(), "speech ended");
                    self.emit(SessionEvent::SpeechEnd).await;
                    self.submit_segment(audio, duration_ms).await;
                }
            }
        }
    }

    /// The user started talking over us: cancel the reply stream, clear the
    /// synthesis queue, and forget outstanding playback. An in-flight
    /// transcription is allowed to finish.
    fn interrupt(&mut self) {
        if let Some(token) = self.reply_cancel.take() {
            token.cancel();
        }
        if self.current_id.take().is_some() {
            let _ = self.current_id_tx.send(None);
        }
        self.playback.clear();
    }

    async fn submit_segment(&mut self, audio: Vec<u8>, duration_ms: u64) {
        match self.gate.try_submit(audio) {
            Ok(done) => {
                let Some(input) = self.input_tx.upgrade() else {
                    return;
                };
                // The utterance claims its message-id at acceptance time.
                self.pending_transcript_id = Some(MessageId::new());
                self.emit(SessionEvent::SttStart { duration_ms }).await;

                tokio::spawn(async move {
                    if let Ok(result) = done.await {
                        let _ = input.send(SessionInput::Transcribed(result)).await;
                    }
                });
            }
            Err(GateRejection::Busy) => {
                tracing::warn!("transcription already in flight, segment dropped");
            }
            Err(GateRejection::TooShort) => {
                tracing::debug!(duration_ms, "segment below minimum content, dropped");
            }
        }
    }

    async fn on_transcribed(&mut self, result: Result<Transcription, ProviderError>) {
        let Some(id) = self.pending_transcript_id.take() else {
            return;
        };

        let transcription = match result {
            Ok(transcription) => transcription,
            Err(e) => {
                tracing::error!(error = %e, "transcription failed");
                self.emit(SessionEvent::SttError {
                    error: e.to_string(),
                })
                .await;
                return;
            }
        };

        let text = transcription.text.trim().to_string();
        if text.is_empty() {
            tracing::debug!("empty transcript, dropped");
            return;
        }

        if transcription.language.is_some() {
            self.language = transcription.language.clone();
        }

        self.emit(SessionEvent::Transcript {
            text: text.clone(),
            message_id: id.clone(),
            language: transcription.language,
            confidence: transcription.confidence,
        })
        .await;

        // Identical transcript finalized twice must not double up history or
        // the reply.
        if self.last_processed_transcript.as_deref() == Some(text.as_str()) {
            tracing::debug!("duplicate transcript, reply suppressed");
            return;
        }
        self.last_processed_transcript = Some(text.clone());

        self.history.apply_transcript(&text, id.clone());
        self.sync_history().await;
        self.start_reply(id).await;
    }

    async fn start_reply(&mut self, id: MessageId) {
        let Some(input) = self.input_tx.upgrade() else {
            return;
        };

        // Supersede whatever reply might still be winding down.
        if let Some(token) = self.reply_cancel.take() {
            token.cancel();
        }

        let cancel = CancellationToken::new();
        self.reply_cancel = Some(cancel.clone());
        self.current_id = Some(id.clone());
        let _ = self.current_id_tx.send(Some(id.clone()));
        self.awaiting_first_sentence = true;

        // Shape the prompt before the empty assistant entry joins history.
        let mut messages = vec![PromptMessage::system(
            self.config.reply.system_prompt.clone(),
        )];
        messages.extend(
            self.history
                .recent(self.config.reply.history_context)
                .iter()
                .map(PromptMessage::from),
        );

        self.history.push_assistant(id.clone());
        self.sync_history().await;

        self.emit(SessionEvent::LlmStart).await;

        tokio::spawn(run_reply(
            self.providers.completion.clone(),
            messages,
            self.config.reply.max_tokens,
            id,
            cancel,
            input,
        ));
    }

    async fn on_reply_event(&mut self, event: ReplyEvent) {
        if self.current_id.as_ref() != Some(event.message_id()) {
            tracing::debug!("stale reply event discarded");
            return;
        }

        match event {
            ReplyEvent::FirstToken { message_id } => {
                self.emit(SessionEvent::LlmFirstToken { message_id }).await;
            }
            ReplyEvent::Sentence { message_id, text } => {
                self.history.append_content(&message_id, &text);
                self.sync_history().await;

                self.emit(SessionEvent::LlmSentence {
                    text: text.clone(),
                    message_id: message_id.clone(),
                })
                .await;

                if self.awaiting_first_sentence {
                    self.awaiting_first_sentence = false;
                    self.emit(SessionEvent::LlmFirstSentence {
                        message_id: message_id.clone(),
                    })
                    .await;
                }

                let Some(cancel) = self.reply_cancel.as_ref().cloned() else {
                    return;
                };
                self.queue.enqueue(SynthJob {
                    text,
                    message_id,
                    language: self.language.clone(),
                    cancel,
                });
            }
            ReplyEvent::Complete { message_id } => {
                // Queued sentences keep draining; only the token stream is
                // finished.
                self.reply_cancel = None;
                self.emit(SessionEvent::ResponseComplete { message_id })
                    .await;
            }
            ReplyEvent::Failed { message_id, error } => {
                self.reply_cancel = None;
                tracing::error!(error = %error, message_id = %message_id, "reply generation failed");
                self.emit(SessionEvent::Error {
                    message: format!("reply generation failed: {error}"),
                })
                .await;
            }
        }
    }

    /// Transmit the history suffix that changed since the last sync.
    async fn sync_history(&mut self) {
        let (start_index, suffix) = self.history.delta_since(&self.last_synced);
        let messages = suffix.to_vec();
        self.last_synced = self.history.messages().to_vec();
        self.emit(SessionEvent::HistoryDelta {
            start_index,
            messages,
        })
        .await;
    }

    async fn emit(&self, event: SessionEvent) {
        // A closed receiver means the connection is going away; the actor
        // loop will end when the input channel drains.
        let _ = self.events.send(event).await;
    }
}

/// Consume one completion stream, splitting it into sentences. Lifecycle
/// markers are posted at most once each; cancellation stops consumption
/// without emitting anything further.
async fn run_reply(
    completion: Arc<dyn Completion>,
    messages: Vec<PromptMessage>,
    max_tokens: u32,
    id: MessageId,
    cancel: CancellationToken,
    input: mpsc::Sender<SessionInput>,
) {
    let mut stream = match completion.stream(&messages, max_tokens).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = input
                .send(SessionInput::Reply(ReplyEvent::Failed {
                    message_id: id,
                    error: e.to_string(),
                }))
                .await;
            return;
        }
    };

    let mut splitter = SentenceSplitter::new();
    let mut saw_token = false;

    loop {
        let delta = tokio::select! {
            _ = cancel.cancelled() => return,
            item = stream.next() => match item {
                None => break,
                Some(Err(e)) => {
                    let _ = input
                        .send(SessionInput::Reply(ReplyEvent::Failed {
                            message_id: id,
                            error: e.to_string(),
                        }))
                        .await;
                    return;
                }
                Some(Ok(delta)) => delta,
            },
        };

        if delta.is_empty() {
            continue;
        }
        if !saw_token {
            saw_token = true;
            let _ = input
                .send(SessionInput::Reply(ReplyEvent::FirstToken {
                    message_id: id.clone(),
                }))
                .await;
        }
        if let Some(sentence) = splitter.push(&delta) {
            let _ = input
                .send(SessionInput::Reply(ReplyEvent::Sentence {
                    message_id: id.clone(),
                    text: sentence,
                }))
                .await;
        }
    }

    if let Some(rest) = splitter.flush() {
        let _ = input
            .send(SessionInput::Reply(ReplyEvent::Sentence {
                message_id: id.clone(),
                text: rest,
            }))
            .await;
    }
    let _ = input
        .send(SessionInput::Reply(ReplyEvent::Complete { message_id: id }))
        .await;
}
