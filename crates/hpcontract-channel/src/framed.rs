use std::os::fd::{OwnedFd, RawFd};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use hpcontract_transport::MessageFd;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec::{ensure_within_limit, MAX_MESSAGE_SIZE};
use crate::error::{ChannelError, Result};

/// A message channel over one boundary-preserving descriptor.
///
/// Reads are delivered through a single continuous subscription attached by
/// [`consume`](Self::consume); writes are capped at [`MAX_MESSAGE_SIZE`] and
/// issued as one syscall each.
pub struct FramedChannel {
    name: &'static str,
    fd: Arc<MessageFd>,
    consumed: AtomicBool,
    subscription: Mutex<Option<JoinHandle<()>>>,
}

impl FramedChannel {
    /// Wrap an owned descriptor. Must be called inside a tokio runtime.
    pub fn new(name: &'static str, fd: OwnedFd) -> Result<Self> {
        let fd = MessageFd::new(fd, MAX_MESSAGE_SIZE)?;
        Ok(Self {
            name,
            fd: Arc::new(fd),
            consumed: AtomicBool::new(false),
            subscription: Mutex::new(None),
        })
    }

    /// Attach the read subscription.
    ///
    /// Every read event is handed to `on_message` in arrival order. Read
    /// errors are logged and the subscription keeps running; it ends when
    /// the host closes its end or [`close`](Self::close) is called.
    pub fn consume<F>(&self, on_message: F) -> Result<()>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        if self.consumed.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::AlreadyConsumed);
        }

        let name = self.name;
        let handle = tokio::spawn(pump(name, messages(Arc::clone(&self.fd)), on_message));

        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!(channel = name, fd = self.fd.raw_fd(), "channel consuming");
        Ok(())
    }

    /// Send one message. Completion means the write reached the descriptor.
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        ensure_within_limit(payload.len())?;
        self.fd.send(payload).await?;
        Ok(())
    }

    /// Stop the read subscription. Safe to call any number of times, and
    /// before `consume` was ever called.
    pub fn close(&self) {
        let handle = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!(channel = self.name, "channel closed");
        }
    }

    /// Whether a read subscription has ever been attached.
    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.raw_fd()
    }
}

/// Inbound messages read from `fd`, one per read event, ending when the
/// host closes its end.
///
/// One scratch buffer is reused for every read; each yielded message owns
/// only its own bytes.
fn messages(fd: Arc<MessageFd>) -> impl Stream<Item = Result<Bytes>> {
    let scratch = vec![0u8; fd.max_message_size()];
    stream::unfold((fd, scratch), |(fd, mut scratch)| async move {
        match fd.recv_into(&mut scratch).await {
            Ok(Some(n)) => {
                let message = Bytes::copy_from_slice(&scratch[..n]);
                Some((Ok(message), (fd, scratch)))
            }
            Ok(None) => None,
            Err(err) => Some((Err(ChannelError::from(err)), (fd, scratch))),
        }
    })
}

/// Hand every message from `source` to `on_message`. Read errors are
/// logged and skipped.
async fn pump<S, F>(name: &'static str, source: S, mut on_message: F)
where
    S: Stream<Item = Result<Bytes>>,
    F: FnMut(Bytes),
{
    let mut source = pin!(source);
    while let Some(read) = source.next().await {
        match read {
            Ok(message) => on_message(message),
            Err(err) => warn!(channel = name, error = %err, "channel read error"),
        }
    }
    debug!(channel = name, "host closed channel");
}

impl Drop for FramedChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FramedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedChannel")
            .field("name", &self.name)
            .field("fd", &self.fd.raw_fd())
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hpcontract_transport::seqpacket_pair;
    use tokio::sync::mpsc;

    use super::*;

    fn channel_pair() -> (FramedChannel, MessageFd) {
        let (ours, host) = seqpacket_pair().unwrap();
        let channel = FramedChannel::new("test", ours).unwrap();
        let host = MessageFd::new(host, MAX_MESSAGE_SIZE * 2).unwrap();
        (channel, host)
    }

    #[tokio::test]
    async fn consume_delivers_messages_in_order() {
        let (channel, host) = channel_pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel
            .consume(move |msg| {
                let _ = tx.send(msg);
            })
            .unwrap();

        for payload in [&b"one"[..], b"two", b"three"] {
            host.send(payload).await.unwrap();
        }

        assert_eq!(rx.recv().await.unwrap().as_ref(), b"one");
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"two");
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"three");
    }

    #[tokio::test]
    async fn read_error_does_not_stop_delivery() {
        let reads = stream::iter([
            Ok(Bytes::from_static(b"before")),
            Err(ChannelError::Transport(hpcontract_transport::TransportError::Io(
                std::io::Error::from(std::io::ErrorKind::ConnectionReset),
            ))),
            Ok(Bytes::from_static(b"after")),
        ]);
        let mut delivered = Vec::new();

        pump("test", reads, |msg| delivered.push(msg)).await;

        assert_eq!(delivered, [&b"before"[..], b"after"]);
    }

    #[tokio::test]
    async fn delivered_messages_are_sized_to_content() {
        let (channel, host) = channel_pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel
            .consume(move |msg| {
                let _ = tx.send(msg);
            })
            .unwrap();

        host.send(b"hi").await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(Vec::from(msg).capacity(), 2);
    }

    #[tokio::test]
    async fn second_consume_fails() {
        let (channel, _host) = channel_pair();
        channel.consume(|_| {}).unwrap();

        let err = channel.consume(|_| {}).unwrap_err();
        assert!(matches!(err, ChannelError::AlreadyConsumed));
        assert!(channel.is_consumed());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (channel, _host) = channel_pair();
        channel.close();

        channel.consume(|_| {}).unwrap();
        channel.close();
        channel.close();
    }

    #[tokio::test]
    async fn close_stops_delivery() {
        let (channel, host) = channel_pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel
            .consume(move |msg| {
                let _ = tx.send(msg);
            })
            .unwrap();

        host.send(b"before").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"before");

        channel.close();
        host.send(b"after").await.unwrap();

        // The aborted subscription drops its sender, closing the receiver.
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn send_accepts_exactly_max_size() {
        let (channel, host) = channel_pair();
        let payload = vec![0x42; MAX_MESSAGE_SIZE];

        channel.send(&payload).await.unwrap();

        let received = host.recv().await.unwrap().unwrap();
        assert_eq!(received.len(), MAX_MESSAGE_SIZE);
    }

    #[tokio::test]
    async fn send_rejects_oversized_payload() {
        let (channel, host) = channel_pair();
        let payload = vec![0x42; 129 * 1024];

        let err = channel.send(&payload).await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::MessageTooLarge {
                max: MAX_MESSAGE_SIZE,
                ..
            }
        ));

        // Channel state is intact after the rejection.
        channel.send(b"small").await.unwrap();
        assert_eq!(host.recv().await.unwrap().unwrap().as_ref(), b"small");
    }
}
