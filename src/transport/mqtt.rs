//! MQTT payload reassembly
//!
//! The MQTT client delivers a large publish as a run of fragments on its own
//! task. The callback only wraps each fragment as an owned [`Fragment`] and
//! sends it down a channel; [`MqttSource`] pulls them on the ingest side.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use super::ChunkSource;
use crate::error::TransportError;

/// One piece of a published payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Empty for continuation fragments when the client does not repeat it
    pub topic: String,
    pub payload: Vec<u8>,
    /// Offset of `payload` within the whole message
    pub index: usize,
    /// Length of the whole message
    pub total: usize,
}

impl Fragment {
    /// This fragment completes its message
    pub fn is_last(&self) -> bool {
        self.index + self.payload.len() >= self.total
    }
}

/// Reassembles one message from a channel of [`Fragment`]s
pub struct MqttSource {
    rx: Receiver<Fragment>,
    topics: Vec<String>,
    timeout: Duration,
    total: Option<usize>,
    /// Message offset the next fragment must start at
    expected: usize,
    /// Fragment bytes not yet handed out
    pending: Vec<u8>,
    done: bool,
}

impl MqttSource {
    /// Accept messages on `topics`; fragments on any other topic are dropped
    pub fn new(rx: Receiver<Fragment>, topics: Vec<String>, timeout: Duration) -> Self {
        Self {
            rx,
            topics,
            timeout,
            total: None,
            expected: 0,
            pending: Vec::new(),
            done: false,
        }
    }

    /// Whether `fragment` may start the message
    ///
    /// Continuations of a message already in flight, or of one on a topic
    /// we do not take, are never a start.
    fn accepts(&self, fragment: &Fragment) -> bool {
        fragment.index == 0 && self.topics.iter().any(|t| *t == fragment.topic)
    }

    fn receive(&mut self) -> Result<Fragment, TransportError> {
        loop {
            let fragment = self.rx.recv_timeout(self.timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => TransportError::Timeout,
                RecvTimeoutError::Disconnected => TransportError::Disconnected,
            })?;
            if self.expected == 0 && !self.accepts(&fragment) {
                log::debug!(
                    "Ignoring fragment at offset {} on topic {:?}",
                    fragment.index,
                    fragment.topic
                );
                continue;
            }
            if fragment.index != self.expected {
                log::error!(
                    "Fragment at offset {} but {} bytes received",
                    fragment.index,
                    self.expected
                );
                return Err(TransportError::Desync {
                    expected: self.expected,
                    got: fragment.index,
                });
            }
            return Ok(fragment);
        }
    }
}

impl ChunkSource for MqttSource {
    fn total_len(&self) -> Option<usize> {
        self.total
    }

    fn next_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        while self.pending.is_empty() {
            if self.done {
                return Ok(None);
            }
            let fragment = self.receive()?;
            if self.total.is_none() {
                log::info!("Receiving {} bytes on {}", fragment.total, fragment.topic);
                self.total = Some(fragment.total);
            }
            self.expected += fragment.payload.len();
            self.done = fragment.is_last();
            self.pending = fragment.payload;
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MQTT_TOPIC_FULL;
    use std::sync::mpsc::{self, Sender};

    fn fragments(topic: &str, message: &[u8], size: usize) -> Vec<Fragment> {
        message
            .chunks(size)
            .enumerate()
            .map(|(i, piece)| Fragment {
                topic: if i == 0 { topic.to_string() } else { String::new() },
                payload: piece.to_vec(),
                index: i * size,
                total: message.len(),
            })
            .collect()
    }

    fn source() -> (Sender<Fragment>, MqttSource) {
        let (tx, rx) = mpsc::channel();
        let source = MqttSource::new(
            rx,
            vec![MQTT_TOPIC_FULL.to_string()],
            Duration::from_millis(50),
        );
        (tx, source)
    }

    fn drain(source: &mut MqttSource) -> Result<Vec<u8>, TransportError> {
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        while let Some(n) = source.next_chunk(&mut buf)? {
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    #[test]
    fn fragments_reassemble_in_order() {
        let (tx, mut source) = source();
        let message: Vec<u8> = (0..40).collect();
        tx.send(Fragment {
            topic: "other/topic".to_string(),
            payload: vec![0xAA; 3],
            index: 0,
            total: 3,
        })
        .unwrap();
        for fragment in fragments(MQTT_TOPIC_FULL, &message, 16) {
            tx.send(fragment).unwrap();
        }
        assert_eq!(drain(&mut source), Ok(message));
        assert_eq!(source.total_len(), Some(40));
    }

    #[test]
    fn stray_continuations_before_the_start_are_skipped() {
        let (tx, mut source) = source();
        // tail of a message that was in flight when we subscribed
        tx.send(Fragment {
            topic: String::new(),
            payload: vec![0xAA; 4],
            index: 12,
            total: 16,
        })
        .unwrap();
        // a message on another topic, with its continuation
        for fragment in fragments("other/topic", &[0xBB; 20], 10) {
            tx.send(fragment).unwrap();
        }
        let message: Vec<u8> = (0..25).collect();
        for fragment in fragments(MQTT_TOPIC_FULL, &message, 10) {
            tx.send(fragment).unwrap();
        }
        assert_eq!(drain(&mut source), Ok(message));
    }

    #[test]
    fn gap_in_offsets_is_a_desync() {
        let (tx, mut source) = source();
        let mut pieces = fragments(MQTT_TOPIC_FULL, &[1u8; 30], 10);
        pieces.remove(1);
        for fragment in pieces {
            tx.send(fragment).unwrap();
        }
        assert_eq!(
            drain(&mut source),
            Err(TransportError::Desync {
                expected: 10,
                got: 20
            })
        );
    }

    #[test]
    fn missing_tail_times_out_and_dropped_sender_disconnects() {
        let (tx, mut source) = source();
        let mut pieces = fragments(MQTT_TOPIC_FULL, &[1u8; 30], 10);
        pieces.pop();
        for fragment in pieces {
            tx.send(fragment).unwrap();
        }
        assert_eq!(drain(&mut source), Err(TransportError::Timeout));

        drop(tx);
        let mut buf = [0u8; 4];
        assert_eq!(source.next_chunk(&mut buf), Err(TransportError::Disconnected));
    }
}
