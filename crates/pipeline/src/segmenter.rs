//! Voice activity segmentation
//!
//! Two-state machine (Silent, Speaking) over per-frame speech scores. Time
//! derives from consumed samples rather than a wall clock, so the machine is
//! deterministic for any given frame sequence.

use voice_loop_config::VadConfig;
use voice_loop_core::{pcm16_to_f32, FrameBuffer};

use crate::vad::SpeechScorer;

/// Events the segmenter emits.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmenterEvent {
    /// Transition into speech. Downstream reacts by interrupting any
    /// in-flight reply.
    SpeechStarted {
        /// Stream time at the transition (ms)
        at_ms: u64,
    },
    /// A finalized speech segment.
    SpeechEnded {
        /// Raw PCM of the segment, including intra-segment silence
        audio: Vec<u8>,
        /// Voiced span of the segment (ms); the trailing silence gap that
        /// closed the segment is not counted
        duration_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Silent,
    Speaking { started_ms: u64, last_voiced_ms: u64 },
}

/// Speech segmenter for one audio stream.
pub struct SpeechSegmenter {
    scorer: Box<dyn SpeechScorer>,
    config: VadConfig,
    frames: FrameBuffer,
    state: State,
    segment: Vec<u8>,
    samples_seen: u64,
}

impl SpeechSegmenter {
    pub fn new(config: VadConfig, scorer: Box<dyn SpeechScorer>) -> Self {
        Self {
            frames: FrameBuffer::new(config.frame_samples),
            scorer,
            config,
            state: State::Silent,
            segment: Vec::new(),
            samples_seen: 0,
        }
    }

    /// Feed raw inbound bytes; processes every complete analysis frame now
    /// available and returns the events they produced.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<SegmenterEvent> {
        let mut events = Vec::new();
        for frame in self.frames.push(bytes) {
            events.extend(self.process_frame(&frame));
        }
        events
    }

    /// Process one fixed-size analysis frame.
    pub fn process_frame(&mut self, frame: &[u8]) -> Vec<SegmenterEvent> {
        self.samples_seen += (frame.len() / 2) as u64;
        let now = self.clock_ms();

        let samples = pcm16_to_f32(frame);
        // A scorer failure must never take the session down; the frame
        // counts as silence.
        let score = match self.scorer.score(&samples) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(error = %e, "vad scorer failed, treating frame as silent");
                0.0
            }
        };
        let voiced = score > self.config.threshold;

        let mut events = Vec::new();
        match self.state {
            State::Silent => {
                if voiced {
                    self.state = State::Speaking {
                        started_ms: now,
                        last_voiced_ms: now,
                    };
                    self.segment.clear();
                    self.segment.extend_from_slice(frame);
                    events.push(SegmenterEvent::SpeechStarted { at_ms: now });
                }
            }
            State::Speaking {
                started_ms,
                last_voiced_ms,
            } => {
                if voiced {
                    self.state = State::Speaking {
                        started_ms,
                        last_voiced_ms: now,
                    };
                    self.segment.extend_from_slice(frame);
                } else if now.saturating_sub(last_voiced_ms) > self.config.max_silence_ms {
                    self.state = State::Silent;
                    let audio = std::mem::take(&mut self.segment);
                    let duration_ms = last_voiced_ms - started_ms;
                    if duration_ms >= self.config.min_speech_ms {
                        events.push(SegmenterEvent::SpeechEnded { audio, duration_ms });
                    } else {
                        tracing::debug!(duration_ms, "segment below min speech duration, dropped");
                    }
                } else {
                    // Transient dip: stay in Speaking, keep the frame so the
                    // segment has no gaps.
                    self.segment.extend_from_slice(frame);
                }
            }
        }

        events
    }

    /// Finalize any in-progress segment without waiting for silence. Used on
    /// teardown; the same minimum-duration check applies.
    pub fn force_end(&mut self) -> Option<SegmenterEvent> {
        if let State::Speaking {
            started_ms,
            last_voiced_ms,
        } = self.state
        {
            self.state = State::Silent;
            let audio = std::mem::take(&mut self.segment);
            let duration_ms = last_voiced_ms - started_ms;
            if duration_ms >= self.config.min_speech_ms {
                return Some(SegmenterEvent::SpeechEnded { audio, duration_ms });
            }
        }
        None
    }

    /// Clear segment state, buffered bytes, and the scorer's recurrent state.
    pub fn reset(&mut self) {
        self.state = State::Silent;
        self.segment.clear();
        self.frames.clear();
        self.samples_seen = 0;
        self.scorer.reset();
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self.state, State::Speaking { .. })
    }

    /// Stream time so far, derived from consumed samples.
    pub fn clock_ms(&self) -> u64 {
        self.samples_seen * 1000 / self.config.sample_rate as u64
    }
}
