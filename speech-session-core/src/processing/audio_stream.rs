use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Outcome of a blocking [`AudioStream::read`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRead {
    Samples(Vec<f32>),
    TimedOut,
    /// The stream was closed and every buffered sample has been read.
    Closed,
}

struct StreamState {
    samples: VecDeque<f32>,
    capacity: usize,
    sample_rate: f64,
    closed: bool,
    dropped: u64,
}

struct Shared {
    state: Mutex<StreamState>,
    readable: Condvar,
}

/// Bounded mono sample queue between the capture port and the recognizer.
///
/// Clones share the same queue. The capture side writes, the recognition
/// side reads; overflow drops the oldest samples so a stalled recognizer
/// never blocks the audio thread.
#[derive(Clone)]
pub struct AudioStream {
    shared: Arc<Shared>,
}

impl AudioStream {
    pub fn with_capacity(capacity: usize, sample_rate: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StreamState {
                    samples: VecDeque::with_capacity(capacity),
                    capacity,
                    sample_rate,
                    closed: false,
                    dropped: 0,
                }),
                readable: Condvar::new(),
            }),
        }
    }

    /// Append mono samples. Ignored once the stream is closed.
    pub fn write(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }

        let capacity = state.capacity;
        let samples = if samples.len() > capacity {
            state.dropped += (samples.len() - capacity) as u64;
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let overflow = (state.samples.len() + samples.len()).saturating_sub(capacity);
        if overflow > 0 {
            state.samples.drain(..overflow);
            state.dropped += overflow as u64;
        }
        state.samples.extend(samples.iter().copied());
        drop(state);

        self.shared.readable.notify_all();
    }

    /// Append an interleaved capture buffer, downmixing to mono and
    /// recording the rate the device actually delivered.
    pub fn write_interleaved(&self, samples: &[f32], sample_rate: f64, channels: u16) {
        if sample_rate > 0.0 {
            self.shared.state.lock().sample_rate = sample_rate;
        }
        if channels > 1 {
            self.write(&downmix_to_mono(samples, channels as usize));
        } else {
            self.write(samples);
        }
    }

    /// Take up to `max` samples, waiting at most `timeout` for data.
    pub fn read(&self, max: usize, timeout: Duration) -> StreamRead {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if !state.samples.is_empty() {
                let take = max.min(state.samples.len());
                return StreamRead::Samples(state.samples.drain(..take).collect());
            }
            if state.closed {
                return StreamRead::Closed;
            }
            if self
                .shared
                .readable
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if state.samples.is_empty() && !state.closed {
                    return StreamRead::TimedOut;
                }
            }
        }
    }

    /// Mark the end of audio. Readers drain what is buffered, then see `Closed`.
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.readable.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_rate(&self) -> f64 {
        self.shared.state.lock().sample_rate
    }

    /// Samples discarded because the reader fell behind.
    pub fn dropped_samples(&self) -> u64 {
        self.shared.state.lock().dropped
    }
}

/// Average interleaved frames down to a single channel.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const NO_WAIT: Duration = Duration::from_millis(0);

    #[test]
    fn reads_in_write_order() {
        let stream = AudioStream::with_capacity(16, 16_000.0);
        stream.write(&[0.1, 0.2, 0.3]);
        stream.write(&[0.4]);

        assert_eq!(stream.read(2, NO_WAIT), StreamRead::Samples(vec![0.1, 0.2]));
        assert_eq!(stream.read(10, NO_WAIT), StreamRead::Samples(vec![0.3, 0.4]));
        assert_eq!(stream.read(10, NO_WAIT), StreamRead::TimedOut);
    }

    #[test]
    fn overflow_keeps_newest_samples() {
        let stream = AudioStream::with_capacity(4, 16_000.0);
        stream.write(&[1.0, 2.0, 3.0]);
        stream.write(&[4.0, 5.0, 6.0]);

        assert_eq!(stream.len(), 4);
        assert_eq!(stream.dropped_samples(), 2);
        assert_eq!(stream.read(4, NO_WAIT), StreamRead::Samples(vec![3.0, 4.0, 5.0, 6.0]));

        stream.write(&[7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(stream.read(8, NO_WAIT), StreamRead::Samples(vec![8.0, 9.0, 10.0, 11.0]));
    }

    #[test]
    fn close_drains_before_reporting_closed() {
        let stream = AudioStream::with_capacity(8, 16_000.0);
        stream.write(&[0.5]);
        stream.close();
        stream.write(&[0.9]);

        assert_eq!(stream.read(8, NO_WAIT), StreamRead::Samples(vec![0.5]));
        assert_eq!(stream.read(8, NO_WAIT), StreamRead::Closed);
    }

    #[test]
    fn close_wakes_a_blocked_reader() {
        let stream = AudioStream::with_capacity(8, 16_000.0);
        let reader = stream.clone();
        let handle = thread::spawn(move || reader.read(8, Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(20));
        stream.close();

        assert_eq!(handle.join().unwrap(), StreamRead::Closed);
    }

    #[test]
    fn interleaved_input_is_downmixed() {
        let stream = AudioStream::with_capacity(8, 16_000.0);
        stream.write_interleaved(&[1.0, 0.0, 0.5, 0.5], 48_000.0, 2);

        assert_eq!(stream.sample_rate(), 48_000.0);
        assert_eq!(stream.read(8, NO_WAIT), StreamRead::Samples(vec![0.5, 0.5]));
    }

    #[test]
    fn downmix_ignores_trailing_partial_frame() {
        assert_eq!(downmix_to_mono(&[0.25, 0.75, 1.0], 2), vec![0.5]);
        assert_eq!(downmix_to_mono(&[0.2, 0.4], 1), vec![0.2, 0.4]);
    }
}
