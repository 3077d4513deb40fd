use crate::CancelToken;
use std::fmt;
use std::io::Write;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

/// Capacity of the progress-event channel. The buffer decouples the transfer
/// from a slow status consumer without letting events pile up unboundedly.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 100;

/// One status update emitted during a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// What the event is about (a reference, a digest prefix).
    pub item: String,
    /// What is happening to it ("Preparing", "Pushing", "Pushed").
    pub action: String,
    pub current: u64,
    pub total: u64,
}

impl ProgressEvent {
    pub fn status(item: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            action: action.into(),
            current: 0,
            total: 0,
        }
    }

    pub fn transfer(
        item: impl Into<String>,
        action: impl Into<String>,
        current: u64,
        total: u64,
    ) -> Self {
        Self {
            item: item.into(),
            action: action.into(),
            current,
            total,
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total > 0 {
            write!(
                f,
                "{}: {} {}/{}",
                self.item, self.action, self.current, self.total
            )
        } else {
            write!(f, "{}: {}", self.item, self.action)
        }
    }
}

/// Consumer side of progress reporting, handed to a transport.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A [`ProgressSink`] backed by a bounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: SyncSender<ProgressEvent>,
}

impl ProgressSink for ChannelSink {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver means the consumer is gone; the transfer itself
        // must not fail because nobody is watching.
        let _ = self.tx.send(event);
    }
}

/// Create a bounded progress channel of [`PROGRESS_CHANNEL_CAPACITY`].
pub fn progress_channel() -> (ChannelSink, Receiver<ProgressEvent>) {
    let (tx, rx) = sync_channel(PROGRESS_CHANNEL_CAPACITY);
    (ChannelSink { tx }, rx)
}

/// Run `transfer` with a progress sink whose events are drained by a
/// dedicated worker writing formatted status lines to `out`.
///
/// The worker keeps draining until the channel closes (every sink clone
/// dropped), and the call joins the worker before returning. That ordering is
/// the contract: no event emitted before the transfer returned is ever
/// dropped, and no thread outlives this call. A failed write trips `cancel`
/// so the producing transfer can stop early, mirroring a disconnected client.
pub fn stream_progress<T, E, F>(
    out: &mut (dyn Write + Send),
    cancel: &CancelToken,
    transfer: F,
) -> Result<T, E>
where
    F: FnOnce(&ChannelSink) -> Result<T, E>,
{
    let (sink, rx) = progress_channel();

    std::thread::scope(|scope| {
        let worker = scope.spawn(move || {
            for event in rx {
                if writeln!(out, "{event}").is_err() {
                    cancel.cancel();
                    // Keep draining so the producer never blocks on a full
                    // channel after the consumer died.
                }
            }
            let _ = out.flush();
        });

        let result = transfer(&sink);

        // Close the channel, then wait for the drain.
        drop(sink);
        let _ = worker.join();

        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    #[test]
    fn event_formats_with_and_without_totals() {
        let plain = ProgressEvent::status("app:v1", "Preparing");
        assert_eq!(plain.to_string(), "app:v1: Preparing");
        let counted = ProgressEvent::transfer("app:v1", "Pushing", 3, 9);
        assert_eq!(counted.to_string(), "app:v1: Pushing 3/9");
    }

    #[test]
    fn all_events_are_drained_before_return() {
        let mut out = Vec::new();
        let cancel = CancelToken::new();
        let n = 250; // more than the channel capacity
        stream_progress::<_, (), _>(&mut out, &cancel, |sink| {
            for i in 0..n {
                sink.report(ProgressEvent::transfer("bundle", "Pushing", i, n));
            }
            Ok(())
        })
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), n as usize);
        assert!(text.lines().last().unwrap().contains("249/250"));
    }

    /// A writer that sleeps on every write, standing in for a slow client.
    struct SlowWriter {
        inner: Vec<u8>,
    }

    impl Write for SlowWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(1));
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn slow_consumer_still_sees_every_event() {
        let mut out = SlowWriter { inner: Vec::new() };
        let cancel = CancelToken::new();
        stream_progress::<_, (), _>(&mut out, &cancel, |sink| {
            for i in 0..50 {
                sink.report(ProgressEvent::transfer("bundle", "Pushing", i, 50));
            }
            Ok(())
        })
        .unwrap();
        let text = String::from_utf8(out.inner).unwrap();
        assert_eq!(text.lines().count(), 50);
    }

    /// A writer that fails after the first line.
    struct FailingWriter {
        writes: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            if self.writes > 1 {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            } else {
                Ok(buf.len())
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_trips_the_cancel_token() {
        let mut out = FailingWriter { writes: 0 };
        let cancel = CancelToken::new();
        stream_progress::<_, (), _>(&mut out, &cancel, |sink| {
            for i in 0..10 {
                sink.report(ProgressEvent::transfer("bundle", "Pushing", i, 10));
            }
            Ok(())
        })
        .unwrap();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn transfer_error_propagates_after_drain() {
        let mut out = Vec::new();
        let cancel = CancelToken::new();
        let res: Result<(), &str> = stream_progress(&mut out, &cancel, |sink| {
            sink.report(ProgressEvent::status("bundle", "Preparing"));
            Err("boom")
        });
        assert_eq!(res, Err("boom"));
        // The event emitted before the failure was still written.
        assert!(String::from_utf8(out).unwrap().contains("Preparing"));
    }
}
