//! End-to-end session tests over loopback providers
//!
//! These drive a full session actor the way the WebSocket handler does:
//! raw PCM in, ordered events out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

use voice_loop_config::PipelineConfig;
use voice_loop_pipeline::{spawn_session, EnergyVad, SessionEvent, SessionHandle, SessionInput};
use voice_loop_providers::loopback::{FixedTranscriber, ScriptedCompletion, ToneSynthesizer};
use voice_loop_providers::{
    Completion, NoopNormalizer, PromptMessage, ProviderError, ProviderSet, TokenStream,
    Transcriber,
};
use voice_loop_core::{ChatMessage, Role};

/// One second of loud audio: alternating full-ish swing samples.
fn loud_second() -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32_000);
    for i in 0..16_000 {
        let value: i16 = if i % 2 == 0 { 16_000 } else { -16_000 };
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// One second of silence.
fn quiet_second() -> Vec<u8> {
    vec![0u8; 32_000]
}

fn providers(
    transcriber: Arc<dyn Transcriber>,
    completion: Arc<dyn Completion>,
) -> ProviderSet {
    ProviderSet {
        transcriber,
        completion,
        synthesizer: Arc::new(ToneSynthesizer::target_format()),
        normalizer: Arc::new(NoopNormalizer),
    }
}

fn spawn(providers: ProviderSet) -> SessionHandle {
    spawn_session(
        providers,
        PipelineConfig::default(),
        Box::new(EnergyVad::default()),
    )
}

async fn speak_utterance(session: &SessionHandle) {
    session
        .input
        .send(SessionInput::Audio(loud_second()))
        .await
        .unwrap();
    session
        .input
        .send(SessionInput::Audio(quiet_second()))
        .await
        .unwrap();
}

/// Receive events until `stop` matches, with a per-event timeout.
async fn collect_until(
    events: &mut mpsc::Receiver<SessionEvent>,
    mut stop: impl FnMut(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("session event channel closed");
        let done = stop(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Drain anything still arriving until the stream goes quiet.
async fn drain(events: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_millis(500), events.recv()).await {
        seen.push(event);
    }
    seen
}

/// A client-side mirror of history built purely from deltas.
#[derive(Default)]
struct MirroredHistory {
    messages: Vec<ChatMessage>,
}

impl MirroredHistory {
    fn apply(&mut self, start_index: usize, messages: &[ChatMessage]) {
        self.messages.truncate(start_index);
        self.messages.extend_from_slice(messages);
    }

    fn apply_all(&mut self, events: &[SessionEvent]) {
        for event in events {
            if let SessionEvent::HistoryDelta {
                start_index,
                messages,
            } = event
            {
                self.apply(*start_index, messages);
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_conversation_flow() {
    let reply = vec![
        "Well,".to_string(),
        " here is".to_string(),
        " an answer.".to_string(),
        " And more!".to_string(),
    ];
    let mut session = spawn(providers(
        Arc::new(FixedTranscriber::with_script(["what is rust"])),
        Arc::new(ScriptedCompletion::new(vec![reply.clone()])),
    ));

    speak_utterance(&session).await;

    let mut seen = collect_until(&mut session.events, |e| {
        matches!(e, SessionEvent::ResponseComplete { .. })
    })
    .await;
    // Let queued synthesis finish.
    seen.extend(drain(&mut session.events).await);

    // Lifecycle ordering.
    let index_of = |pred: fn(&SessionEvent) -> bool| {
        seen.iter().position(|e| pred(e)).expect("missing event")
    };
    let speech_start = index_of(|e| matches!(e, SessionEvent::SpeechStart));
    let speech_end = index_of(|e| matches!(e, SessionEvent::SpeechEnd));
    let stt_start = index_of(|e| matches!(e, SessionEvent::SttStart { .. }));
    let transcript = index_of(|e| matches!(e, SessionEvent::Transcript { .. }));
    let llm_start = index_of(|e| matches!(e, SessionEvent::LlmStart));
    let first_token = index_of(|e| matches!(e, SessionEvent::LlmFirstToken { .. }));
    let first_sentence = index_of(|e| matches!(e, SessionEvent::LlmFirstSentence { .. }));
    let audio_start = index_of(|e| matches!(e, SessionEvent::AudioStart { .. }));

    assert!(speech_start < speech_end);
    assert!(speech_end < stt_start);
    assert!(stt_start < transcript);
    assert!(transcript < llm_start);
    assert!(llm_start < first_token);
    assert!(first_token < first_sentence);
    assert!(first_sentence < audio_start);

    // Exactly-once lifecycle markers.
    let count = |pred: fn(&SessionEvent) -> bool| seen.iter().filter(|e| pred(e)).count();
    assert_eq!(count(|e| matches!(e, SessionEvent::LlmFirstToken { .. })), 1);
    assert_eq!(count(|e| matches!(e, SessionEvent::LlmFirstSentence { .. })), 1);
    assert_eq!(count(|e| matches!(e, SessionEvent::ResponseComplete { .. })), 1);

    // No-loss law: sentences concatenate to the full reply.
    let sentences: String = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::LlmSentence { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(sentences, reply.concat());

    // Every id-bearing event carries the same utterance id.
    let transcript_id = seen
        .iter()
        .find_map(|e| match e {
            SessionEvent::Transcript { message_id, .. } => Some(message_id.clone()),
            _ => None,
        })
        .unwrap();
    for event in &seen {
        if let SessionEvent::LlmSentence { message_id, .. }
        | SessionEvent::LlmFirstToken { message_id }
        | SessionEvent::LlmFirstSentence { message_id }
        | SessionEvent::ResponseComplete { message_id } = event
        {
            assert_eq!(message_id, &transcript_id);
        }
    }

    // Each synthesized sentence is framed tts_start .. audio_end.
    let tts_starts = seen.iter().filter(|e| matches!(e, SessionEvent::TtsStart)).count();
    let audio_ends = seen.iter().filter(|e| matches!(e, SessionEvent::AudioEnd)).count();
    assert_eq!(tts_starts, audio_ends);
    assert!(tts_starts >= 2, "expected multiple synthesized sentences");

    // Client history mirror: user turn then assistant turn with full text.
    let mut mirror = MirroredHistory::default();
    mirror.apply_all(&seen);
    assert_eq!(mirror.messages.len(), 2);
    assert_eq!(mirror.messages[0].role, Role::User);
    assert_eq!(mirror.messages[0].content, "what is rust");
    assert_eq!(mirror.messages[1].role, Role::Assistant);
    assert_eq!(mirror.messages[1].content, reply.concat());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_transcript_is_idempotent() {
    let mut session = spawn(providers(
        Arc::new(FixedTranscriber::with_script(["same words", "same words"])),
        Arc::new(ScriptedCompletion::new(vec![vec!["Reply one.".to_string()]])),
    ));

    speak_utterance(&session).await;
    let mut seen = collect_until(&mut session.events, |e| {
        matches!(e, SessionEvent::ResponseComplete { .. })
    })
    .await;
    seen.extend(drain(&mut session.events).await);

    // Same transcript again.
    speak_utterance(&session).await;
    let more = collect_until(&mut session.events, |e| {
        matches!(e, SessionEvent::Transcript { .. })
    })
    .await;
    let tail = drain(&mut session.events).await;

    // The duplicate surfaced as a transcript event but produced no new
    // reply and no new history entries.
    assert!(!more
        .iter()
        .chain(tail.iter())
        .any(|e| matches!(e, SessionEvent::LlmStart)));

    let mut mirror = MirroredHistory::default();
    mirror.apply_all(&seen);
    mirror.apply_all(&more);
    mirror.apply_all(&tail);
    assert_eq!(mirror.messages.len(), 2, "history grew on duplicate");
}

#[tokio::test(start_paused = true)]
async fn test_empty_transcript_is_dropped_silently() {
    let mut session = spawn(providers(
        Arc::new(FixedTranscriber::with_script(["   "])),
        Arc::new(ScriptedCompletion::new(Vec::<Vec<String>>::new())),
    ));

    speak_utterance(&session).await;
    let seen = collect_until(&mut session.events, |e| {
        matches!(e, SessionEvent::SttStart { .. })
    })
    .await;
    let tail = drain(&mut session.events).await;

    assert!(seen.iter().all(|e| !matches!(e, SessionEvent::Error { .. })));
    assert!(!tail.iter().any(|e| {
        matches!(
            e,
            SessionEvent::Transcript { .. } | SessionEvent::LlmStart | SessionEvent::Error { .. }
        )
    }));
}

/// Completion that emits one sentence, then waits for a release signal
/// before emitting the rest. Lets a test interleave an interruption at a
/// known point in the stream.
struct HoldableCompletion {
    release: Arc<Notify>,
}

#[async_trait]
impl Completion for HoldableCompletion {
    async fn stream(
        &self,
        _messages: &[PromptMessage],
        _max_tokens: u32,
    ) -> Result<TokenStream, ProviderError> {
        let (tx, rx) = mpsc::channel(8);
        let release = self.release.clone();
        tokio::spawn(async move {
            let _ = tx.send(Ok("First sentence.".to_string())).await;
            release.notified().await;
            let _ = tx.send(Ok(" Second sentence.".to_string())).await;
            let _ = tx.send(Ok(" Third sentence.".to_string())).await;
        });
        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

#[tokio::test(start_paused = true)]
async fn test_interruption_suppresses_superseded_reply() {
    let release = Arc::new(Notify::new());
    // Second utterance transcribes to empty text, so no new reply starts
    // and anything after speech_start must be silence from the old one.
    let mut session = spawn(providers(
        Arc::new(FixedTranscriber::with_script(["question one"])),
        Arc::new(HoldableCompletion {
            release: release.clone(),
        }),
    ));

    speak_utterance(&session).await;

    // First sentence flows all the way through synthesis.
    let seen = collect_until(&mut session.events, |e| {
        matches!(e, SessionEvent::AudioEnd)
    })
    .await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::LlmSentence { .. })));

    // User talks over the reply.
    session
        .input
        .send(SessionInput::Audio(loud_second()))
        .await
        .unwrap();
    collect_until(&mut session.events, |e| {
        matches!(e, SessionEvent::SpeechStart)
    })
    .await;

    // The held stream resumes, but the reply was cancelled.
    release.notify_waiters();
    let after = drain(&mut session.events).await;

    for event in &after {
        assert!(
            !matches!(
                event,
                SessionEvent::LlmSentence { .. }
                    | SessionEvent::LlmFirstToken { .. }
                    | SessionEvent::ResponseComplete { .. }
                    | SessionEvent::TtsStart
                    | SessionEvent::AudioStart { .. }
                    | SessionEvent::AudioChunk(_)
                    | SessionEvent::AudioEnd
            ),
            "superseded reply leaked event: {event:?}"
        );
    }
}

/// Transcriber failing on the first call and succeeding afterwards.
struct FlakyTranscriber {
    inner: FixedTranscriber,
    failed_once: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl Transcriber for FlakyTranscriber {
    async fn transcribe(
        &self,
        pcm: &[u8],
    ) -> Result<voice_loop_providers::Transcription, ProviderError> {
        if !self
            .failed_once
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(ProviderError::Transcription("rate limited".to_string()));
        }
        self.inner.transcribe(pcm).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_transcription_failure_is_survivable() {
    let mut session = spawn(providers(
        Arc::new(FlakyTranscriber {
            inner: FixedTranscriber::with_script(["recovered"]),
            failed_once: std::sync::atomic::AtomicBool::new(false),
        }),
        Arc::new(ScriptedCompletion::new(vec![vec!["Good.".to_string()]])),
    ));

    speak_utterance(&session).await;
    let seen = collect_until(&mut session.events, |e| {
        matches!(e, SessionEvent::SttError { .. })
    })
    .await;
    // Failure produced exactly one typed error and no history mutation.
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::HistoryDelta { .. })));

    // The conversation stays usable.
    speak_utterance(&session).await;
    let recovered = collect_until(&mut session.events, |e| {
        matches!(e, SessionEvent::ResponseComplete { .. })
    })
    .await;
    assert!(recovered.iter().any(|e| {
        matches!(e, SessionEvent::Transcript { text, .. } if text == "recovered")
    }));
}

/// Normalizer wired through the queue: an emoji-only sentence is skipped.
#[tokio::test(start_paused = true)]
async fn test_emoji_only_sentence_skips_synthesis() {
    let reply = vec!["🎉🎉".to_string(), " Real words.".to_string()];
    let mut session = spawn_session(
        ProviderSet {
            transcriber: Arc::new(FixedTranscriber::with_script(["hi"])),
            completion: Arc::new(ScriptedCompletion::new(vec![reply])),
            synthesizer: Arc::new(ToneSynthesizer::target_format()),
            normalizer: Arc::new(voice_loop_providers::SpeechNormalizer),
        },
        PipelineConfig::default(),
        Box::new(EnergyVad::default()),
    );

    speak_utterance(&session).await;
    let mut seen = collect_until(&mut session.events, |e| {
        matches!(e, SessionEvent::ResponseComplete { .. })
    })
    .await;
    seen.extend(drain(&mut session.events).await);

    // Two sentences emitted, but only the speakable one was synthesized.
    let sentences = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::LlmSentence { .. }))
        .count();
    assert_eq!(sentences, 2);
    let tts_starts = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::TtsStart))
        .count();
    assert_eq!(tts_starts, 1);
}
