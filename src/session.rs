//! One wake cycle's worth of ingestion

use crate::dispatch::{Panel, RefreshDispatcher, RefreshState};
use crate::error::Error;
use crate::transport::{ChunkSource, CHUNK_LEN};

/// How a stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Always valid: the header's value, or the configured default
    pub sleep_minutes: u8,
    /// The panel was refreshed
    pub rendered: bool,
    /// The error that ended the stream early, if any
    pub error: Option<Error>,
}

/// Pull `source` dry through `dispatcher` and report what happened
///
/// Never fails: every error is folded into the [`Outcome`] so the caller
/// can still go to sleep for the right amount of time.
pub fn ingest<S, P>(source: &mut S, dispatcher: &mut RefreshDispatcher<P>) -> Outcome
where
    S: ChunkSource + ?Sized,
    P: Panel,
{
    dispatcher.begin();
    if let Some(len) = source.total_len() {
        log::info!("Stream of {} bytes", len);
    }

    let (rendered, error) = match pump(source, dispatcher) {
        Ok(rendered) => (rendered, None),
        Err(e) => {
            // transport errors leave the dispatcher mid-stream
            dispatcher.abort();
            (false, Some(e))
        }
    };

    let outcome = Outcome {
        sleep_minutes: dispatcher.sleep_minutes(),
        rendered,
        error,
    };
    log::info!(
        "Stream done: rendered {}, sleep {} min",
        outcome.rendered,
        outcome.sleep_minutes
    );
    outcome
}

fn pump<S, P>(source: &mut S, dispatcher: &mut RefreshDispatcher<P>) -> Result<bool, Error>
where
    S: ChunkSource + ?Sized,
    P: Panel,
{
    let mut buf = [0u8; CHUNK_LEN];
    while let Some(n) = source.next_chunk(&mut buf)? {
        dispatcher.feed(&buf[..n])?;
        if dispatcher.state() == RefreshState::NoopDone {
            break;
        }
    }
    dispatcher.finish()
}
