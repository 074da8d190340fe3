//! Synthesis pacing queue
//!
//! Sentences queue strictly FIFO; one synthesis runs at a time. Before each
//! sentence starts, the queue checks how much already-sent audio the client
//! still has to play and defers while that backlog exceeds the ceiling: this
//! bounds memory and keeps the interruption point close to what the user is
//! actually hearing.
//!
//! Synthesis output carries its own WAV header. When the format already
//! matches the playback target, bytes are re-chunked into fixed quanta and
//! forwarded as they arrive (direct path). Otherwise the whole stream is
//! buffered, downmixed/resampled, then chunked (resample path).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use voice_loop_config::PacingConfig;
use voice_loop_core::{pcm16_to_f32, wav, MessageId, PcmFormat};
use voice_loop_providers::{ProviderError, Synthesizer, TextNormalizer};

use crate::events::SessionEvent;
use crate::resample::{downmix, Resampler};

/// One queued sentence.
#[derive(Debug)]
pub struct SynthJob {
    pub text: String,
    /// Utterance this sentence belongs to; stale jobs are skipped.
    pub message_id: MessageId,
    /// Language hint for normalization.
    pub language: Option<String>,
    /// Cancelled on interruption; stops an in-flight synthesis mid-stream.
    pub cancel: CancellationToken,
}

/// Estimate of when the client's playback buffer drains. Not authoritative
/// (the client is the real clock), used only for admission control.
#[derive(Clone, Default)]
pub struct PlaybackClock {
    end: Arc<Mutex<Option<Instant>>>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time until the last forwarded audio finishes playing.
    pub fn remaining(&self) -> Duration {
        match *self.end.lock() {
            Some(end) => end.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    /// Account for `amount` of audio just forwarded.
    pub fn extend(&self, amount: Duration) {
        let mut end = self.end.lock();
        let base = match *end {
            Some(t) if t > Instant::now() => t,
            _ => Instant::now(),
        };
        *end = Some(base + amount);
    }

    /// Forget any outstanding audio (the client was told to clear playback).
    pub fn clear(&self) {
        *self.end.lock() = None;
    }
}

/// Handle to a session's synthesis queue worker.
pub struct SynthesisQueue {
    tx: mpsc::UnboundedSender<SynthJob>,
}

impl SynthesisQueue {
    /// Spawn the worker for one session.
    pub fn spawn(
        synthesizer: Arc<dyn Synthesizer>,
        normalizer: Arc<dyn TextNormalizer>,
        config: PacingConfig,
        target: PcmFormat,
        current_id: watch::Receiver<Option<MessageId>>,
        playback: PlaybackClock,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_queue(
            rx,
            synthesizer,
            normalizer,
            config,
            target,
            current_id,
            playback,
            events,
        ));
        Self { tx }
    }

    /// Queue one sentence. Silently a no-op once the session is closing.
    pub fn enqueue(&self, job: SynthJob) {
        let _ = self.tx.send(job);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_queue(
    mut rx: mpsc::UnboundedReceiver<SynthJob>,
    synthesizer: Arc<dyn Synthesizer>,
    normalizer: Arc<dyn TextNormalizer>,
    config: PacingConfig,
    target: PcmFormat,
    current_id: watch::Receiver<Option<MessageId>>,
    playback: PlaybackClock,
    events: mpsc::Sender<SessionEvent>,
) {
    let quantum = target.bytes_for_ms(config.quantum_ms);
    let ceiling = Duration::from_millis(config.max_buffered_ms);
    let retry = Duration::from_millis(config.retry_interval_ms);

    'jobs: while let Some(job) = rx.recv().await {
        let stale = current_id.borrow().as_ref() != Some(&job.message_id);
        if stale || job.cancel.is_cancelled() {
            tracing::debug!(message_id = %job.message_id, "skipping stale synthesis job");
            continue;
        }

        // Admission control: don't synthesize further ahead than the client
        // can hear.
        while playback.remaining() > ceiling {
            tokio::select! {
                _ = tokio::time::sleep(retry) => {}
                _ = job.cancel.cancelled() => continue 'jobs,
            }
            if current_id.borrow().as_ref() != Some(&job.message_id) {
                continue 'jobs;
            }
        }

        let text = normalizer.normalize(&job.text, job.language.as_deref());
        if text.trim().is_empty() {
            tracing::debug!("normalized sentence empty, skipping synthesis");
            continue;
        }

        let started = Instant::now();
        if events.send(SessionEvent::TtsStart).await.is_err() {
            return;
        }

        match forward_sentence(&*synthesizer, &text, &job.cancel, target, quantum, &events).await
        {
            Ok(Forwarded::Complete { bytes }) => {
                let duration = Duration::from_millis(target.duration_ms(bytes));
                let synthesis_time_ms = started.elapsed().as_millis() as u64;
                if events
                    .send(SessionEvent::TtsComplete { synthesis_time_ms })
                    .await
                    .is_err()
                {
                    return;
                }
                if events.send(SessionEvent::AudioEnd).await.is_err() {
                    return;
                }
                playback.extend(duration);
            }
            Ok(Forwarded::Cancelled) => {
                tracing::debug!(message_id = %job.message_id, "synthesis cancelled mid-stream");
            }
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed, dropping sentence");
                if events
                    .send(SessionEvent::Error {
                        message: format!("speech synthesis failed: {e}"),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

enum Forwarded {
    Complete { bytes: usize },
    Cancelled,
}

async fn forward_sentence(
    synthesizer: &dyn Synthesizer,
    text: &str,
    cancel: &CancellationToken,
    target: PcmFormat,
    quantum: usize,
    events: &mpsc::Sender<SessionEvent>,
) -> Result<Forwarded, ProviderError> {
    let mut stream = synthesizer.synthesize(text).await?;

    let mut buffered: Vec<u8> = Vec::new();
    let mut info: Option<wav::WavInfo> = None;
    let mut direct = false;
    let mut pending: Vec<u8> = Vec::new();
    let mut sent = 0usize;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Ok(Forwarded::Cancelled),
            item = stream.next() => match item {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(chunk)) => chunk,
            },
        };

        match info {
            None => {
                buffered.extend_from_slice(&chunk);
                match wav::parse_header(&buffered) {
                    Ok(None) => {}
                    Ok(Some(parsed)) => {
                        direct = parsed.format == target;
                        if direct {
                            // Matching format: announce and start forwarding
                            // immediately, minimizing time to first audio.
                            if send(events, SessionEvent::AudioStart { format: target }).await {
                                return Ok(Forwarded::Cancelled);
                            }
                            pending.extend_from_slice(&buffered[parsed.data_offset..]);
                            buffered.clear();
                            match drain_quanta(&mut pending, quantum, cancel, events).await {
                                Some(n) => sent += n,
                                None => return Ok(Forwarded::Cancelled),
                            }
                        }
                        info = Some(parsed);
                    }
                    Err(e) => {
                        return Err(ProviderError::Synthesis(format!("bad wav stream: {e}")))
                    }
                }
            }
            Some(_) if direct => {
                pending.extend_from_slice(&chunk);
                match drain_quanta(&mut pending, quantum, cancel, events).await {
                    Some(n) => sent += n,
                    None => return Ok(Forwarded::Cancelled),
                }
            }
            Some(_) => buffered.extend_from_slice(&chunk),
        }
    }

    let Some(parsed) = info else {
        return Err(ProviderError::Synthesis(
            "stream ended before wav header completed".to_string(),
        ));
    };

    if direct {
        // Final partial quantum.
        if !pending.is_empty() {
            sent += pending.len();
            if send(events, SessionEvent::AudioChunk(std::mem::take(&mut pending))).await {
                return Ok(Forwarded::Cancelled);
            }
        }
        return Ok(Forwarded::Complete { bytes: sent });
    }

    // Resample path: whole stream is buffered, convert then forward.
    let body = &buffered[parsed.data_offset.min(buffered.len())..];
    let samples = pcm16_to_f32(body);
    let mono = downmix(&samples, parsed.format.channels as usize);
    let resampled =
        Resampler::new(parsed.format.sample_rate, target.sample_rate).resample(&mono);

    let mut out = Vec::with_capacity(resampled.len() * 2);
    for sample in resampled {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }

    if send(events, SessionEvent::AudioStart { format: target }).await {
        return Ok(Forwarded::Cancelled);
    }
    pending = out;
    match drain_quanta(&mut pending, quantum, cancel, events).await {
        Some(n) => sent += n,
        None => return Ok(Forwarded::Cancelled),
    }
    if !pending.is_empty() {
        sent += pending.len();
        if send(events, SessionEvent::AudioChunk(pending)).await {
            return Ok(Forwarded::Cancelled);
        }
    }

    Ok(Forwarded::Complete { bytes: sent })
}

/// Forward every complete quantum in `pending`. Returns bytes sent, or
/// `None` when cancelled or the session is gone.
async fn drain_quanta(
    pending: &mut Vec<u8>,
    quantum: usize,
    cancel: &CancellationToken,
    events: &mpsc::Sender<SessionEvent>,
) -> Option<usize> {
    let mut sent = 0;
    while pending.len() >= quantum {
        if cancel.is_cancelled() {
            return None;
        }
        let rest = pending.split_off(quantum);
        let chunk = std::mem::replace(pending, rest);
        sent += chunk.len();
        if send(events, SessionEvent::AudioChunk(chunk)).await {
            return None;
        }
    }
    Some(sent)
}

/// Send an event; returns true when the session is gone.
async fn send(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) -> bool {
    events.send(event).await.is_err()
}
