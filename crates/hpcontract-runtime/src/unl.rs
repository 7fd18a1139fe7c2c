use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use hpcontract_channel::{Message, NplChannel, PeerMessage};
use tracing::debug;

use crate::args::UnlStats;
use crate::error::{BoxError, ContractError, Result};
use crate::tasks::PendingTasks;

/// A node in the unique node list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlNode {
    pub public_key: String,
    /// Ledger sequence number from which the node is active.
    pub active_on: u64,
}

/// The UNL as seen by this execution, plus the NPL channel to reach it.
///
/// In readonly mode the collection is empty and has no channel: `on_message`
/// and `send` fail with [`ContractError::ChannelUnavailable`].
#[derive(Debug, Clone)]
pub struct UnlCollection {
    nodes: Arc<BTreeMap<String, UnlNode>>,
    channel: Option<Arc<NplChannel>>,
    pending: PendingTasks,
}

impl UnlCollection {
    pub fn read_only(pending: PendingTasks) -> Self {
        Self {
            nodes: Arc::default(),
            channel: None,
            pending,
        }
    }

    pub fn new(
        unl: &BTreeMap<String, UnlStats>,
        channel: Arc<NplChannel>,
        pending: PendingTasks,
    ) -> Self {
        let nodes = unl
            .iter()
            .map(|(public_key, stats)| {
                let node = UnlNode {
                    public_key: public_key.clone(),
                    active_on: stats.active_on,
                };
                (public_key.clone(), node)
            })
            .collect();
        Self {
            nodes: Arc::new(nodes),
            channel: Some(channel),
            pending,
        }
    }

    pub fn find(&self, public_key: &str) -> Option<&UnlNode> {
        self.nodes.get(public_key)
    }

    pub fn list(&self) -> impl Iterator<Item = &UnlNode> {
        self.nodes.values()
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// Register the NPL message handler.
    ///
    /// Every message from a UNL member runs `handler` as a pending task, so
    /// the execution does not end until all of them have settled. Messages
    /// from senders outside the UNL are dropped. Only one handler may be
    /// registered per execution.
    pub fn on_message<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(UnlNode, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        let channel = self.npl()?;
        let handler = Arc::new(handler);
        let nodes = Arc::clone(&self.nodes);
        let pending = self.pending.clone();

        channel.consume(move |message: PeerMessage| {
            let Some(node) = nodes.get(&message.sender).cloned() else {
                debug!(sender = %message.sender, "dropping npl message from unknown sender");
                return;
            };
            let handler = Arc::clone(&handler);
            pending.spawn(async move { handler(node, message.payload).await });
        })?;
        Ok(())
    }

    /// Broadcast a message to every UNL node.
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        let channel = self.npl()?;
        let payload = message.into().to_bytes()?;
        channel.send(&payload).await?;
        Ok(())
    }

    fn npl(&self) -> Result<&Arc<NplChannel>> {
        self.channel
            .as_ref()
            .ok_or(ContractError::ChannelUnavailable("npl"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hpcontract_channel::MAX_MESSAGE_SIZE;
    use hpcontract_transport::{seqpacket_pair, MessageFd};
    use tokio::sync::mpsc;

    use super::*;

    fn unl_map() -> BTreeMap<String, UnlStats> {
        BTreeMap::from([
            ("alice".to_string(), UnlStats { active_on: 3 }),
            ("bob".to_string(), UnlStats { active_on: 0 }),
        ])
    }

    fn consensus_unl(pending: PendingTasks) -> (UnlCollection, MessageFd) {
        let (ours, host) = seqpacket_pair().expect("seqpacket pair should open");
        let channel = NplChannel::new(ours).expect("npl channel should open");
        let host = MessageFd::new(host, MAX_MESSAGE_SIZE).expect("host end should register");
        (UnlCollection::new(&unl_map(), Arc::new(channel), pending), host)
    }

    #[tokio::test]
    async fn lists_members_in_key_order() {
        let (unl, _host) = consensus_unl(PendingTasks::new());

        assert_eq!(unl.count(), 2);
        assert_eq!(
            unl.find("alice"),
            Some(&UnlNode {
                public_key: "alice".to_string(),
                active_on: 3,
            })
        );
        let keys: Vec<_> = unl.list().map(|node| node.public_key.as_str()).collect();
        assert_eq!(keys, ["alice", "bob"]);
    }

    #[tokio::test]
    async fn readonly_has_no_channel() {
        let unl = UnlCollection::read_only(PendingTasks::new());
        assert_eq!(unl.count(), 0);

        let err = unl.send("hello").await.unwrap_err();
        assert!(matches!(err, ContractError::ChannelUnavailable("npl")));

        let err = unl
            .on_message(|_, _| async { Ok::<(), BoxError>(()) })
            .unwrap_err();
        assert!(matches!(err, ContractError::ChannelUnavailable("npl")));
    }

    #[tokio::test]
    async fn known_senders_run_as_pending_tasks() {
        let pending = PendingTasks::new();
        let (unl, host) = consensus_unl(pending.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        unl.on_message(move |node, payload| {
            let tx = tx.clone();
            async move {
                tx.send((node.public_key, payload))?;
                Ok::<(), BoxError>(())
            }
        })
        .unwrap();

        for buf in [&b"carol"[..], b"ignored", b"alice", b"hello"] {
            host.send(buf).await.unwrap();
        }

        let (sender, payload) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("handler should run")
            .expect("handler channel should stay open");
        assert_eq!(sender, "alice");
        assert_eq!(payload.as_ref(), b"hello");

        let report = pending.drain().await;
        assert_eq!(report.completed, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_broadcasts_plain_encoding() {
        let (unl, host) = consensus_unl(PendingTasks::new());

        unl.send(serde_json::json!({"round": 1})).await.unwrap();
        unl.send("text").await.unwrap();

        assert_eq!(host.recv().await.unwrap().unwrap().as_ref(), br#"{"round":1}"#);
        assert_eq!(host.recv().await.unwrap().unwrap().as_ref(), b"text");
    }
}
