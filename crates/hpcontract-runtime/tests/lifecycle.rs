use std::fs::File;
use std::io::Read;
use std::os::fd::IntoRawFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hpcontract_channel::MAX_MESSAGE_SIZE;
use hpcontract_runtime::{
    BoxError, ContractConfig, ContractContext, ContractError, HotPocketContract, InitError,
    LifecycleState,
};
use hpcontract_transport::{seqpacket_pair, MessageFd};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

const INPUT: &[u8] = b"0123456789abcdefghij";

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "hpcontract-lifecycle-{name}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

/// The host's ends of every descriptor handed to the contract.
struct Host {
    control: MessageFd,
    user: UnixStream,
    npl: Option<MessageFd>,
    input_path: PathBuf,
    blob: serde_json::Value,
}

impl Host {
    fn new(name: &str, readonly: bool) -> Self {
        let input_path = temp_path(name);
        std::fs::write(&input_path, INPUT).expect("input file should be written");
        let user_in_fd = File::open(&input_path)
            .expect("input file should open")
            .into_raw_fd();

        let (control_ours, control_host) = seqpacket_pair().expect("control pair should open");
        let control = MessageFd::new(control_host, MAX_MESSAGE_SIZE)
            .expect("control host end should register");

        let (user_ours, user) = UnixStream::pair().expect("user stream pair should open");

        let mut blob = json!({
            "contract_id": "3c349abe-4d70-4f50-9fa6-018f1f2530ab",
            "public_key": "ed0000",
            "private_key": "secret",
            "readonly": readonly,
            "timestamp": 1_700_000_000_000u64,
            "control_fd": control_ours.into_raw_fd(),
            "user_in_fd": user_in_fd,
            "users": { "U1": [user_ours.into_raw_fd(), [0, 10]] },
            "unl": {
                "alice": { "active_on": 1 },
                "bob": { "active_on": 1 }
            }
        });

        let npl = if readonly {
            None
        } else {
            let (npl_ours, npl_host) = seqpacket_pair().expect("npl pair should open");
            blob["npl_fd"] = json!(npl_ours.into_raw_fd());
            blob["lcl_seq_no"] = json!(42);
            blob["lcl_hash"] = json!("abcd");
            Some(MessageFd::new(npl_host, MAX_MESSAGE_SIZE).expect("npl host end should register"))
        };

        Self {
            control,
            user,
            npl,
            input_path,
            blob,
        }
    }

    fn blob(&self) -> String {
        self.blob.to_string()
    }

    fn user_output(mut self) -> Vec<u8> {
        let mut wire = Vec::new();
        self.user
            .read_to_end(&mut wire)
            .expect("user output should be readable");
        wire
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.input_path);
    }
}

#[tokio::test]
async fn echoes_declared_input_range() {
    let host = Host::new("echo", true);
    let contract = HotPocketContract::new();

    unsafe {
        contract
            .init_with_args(&host.blob(), |ctx: ContractContext| async move {
                for user in ctx.users().list() {
                    for range in user.inputs() {
                        let input = ctx.users().read(*range).await?;
                        user.send(input).await?;
                    }
                }
                Ok::<(), BoxError>(())
            })
            .await
    }
    .expect("contract should run");

    assert_eq!(contract.state(), LifecycleState::Terminated);
    let mut expected = vec![0, 0, 0, 10];
    expected.extend_from_slice(&INPUT[..10]);
    assert_eq!(host.user_output(), expected);
}

#[tokio::test]
async fn readonly_context_has_no_peer_channel() {
    let host = Host::new("readonly", true);
    let contract = HotPocketContract::new();
    let (tx, rx) = oneshot::channel();

    unsafe {
        contract
            .init_with_args(&host.blob(), |ctx: ContractContext| async move {
                let send = ctx.unl().send("hello").await;
                let register = ctx.unl().on_message(|_, _| async { Ok::<(), BoxError>(()) });
                let peers = ctx
                    .update_peers(vec!["10.0.0.5:22860".to_string()], Vec::new())
                    .await;
                let _ = tx.send((
                    ctx.readonly(),
                    ctx.ledger().is_none(),
                    ctx.unl().count(),
                    matches!(send, Err(ContractError::ChannelUnavailable(_))),
                    matches!(register, Err(ContractError::ChannelUnavailable(_))),
                    matches!(peers, Err(ContractError::ChannelUnavailable(_))),
                ));
                Ok::<(), BoxError>(())
            })
            .await
    }
    .expect("contract should run");

    let observed = rx.await.expect("contract should report");
    assert_eq!(observed, (true, true, 0, true, true, true));
}

#[tokio::test]
async fn termination_waits_for_every_peer_handler() {
    let mut host = Host::new("drain", false);
    let npl = host.npl.take().expect("consensus host has npl");

    let done = Arc::new(AtomicUsize::new(0));
    let done_at_shutdown = Arc::new(AtomicUsize::new(usize::MAX));
    let hook_done = Arc::clone(&done);
    let hook_seen = Arc::clone(&done_at_shutdown);
    let contract = HotPocketContract::with_config(ContractConfig {
        force_terminate: true,
        ..ContractConfig::default()
    })
    .with_shutdown_hook(move || {
        hook_seen.store(hook_done.load(Ordering::SeqCst), Ordering::SeqCst);
    });

    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let sender = tokio::spawn(async move {
        ready_rx.await.expect("contract should signal readiness");
        for buf in [&b"alice"[..], b"80", b"bob", b"fail"] {
            npl.send(buf).await.expect("npl send should succeed");
        }
        npl
    });

    let handler_done = Arc::clone(&done);
    unsafe {
        contract
            .init_with_args(&host.blob(), move |ctx: ContractContext| async move {
                let (started_tx, mut started_rx) = mpsc::unbounded_channel();
                ctx.unl().on_message(move |node, payload| {
                    let started_tx = started_tx.clone();
                    let done = Arc::clone(&handler_done);
                    async move {
                        let _ = started_tx.send(node.public_key);
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        if payload.as_ref() == b"fail" {
                            done.fetch_add(1, Ordering::SeqCst);
                            return Err::<(), BoxError>("peer handler failed".into());
                        }
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        done.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })?;
                let _ = ready_tx.send(());

                started_rx.recv().await;
                started_rx.recv().await;
                Ok::<(), BoxError>(())
            })
            .await
    }
    .expect("contract should run");

    assert_eq!(contract.state(), LifecycleState::Terminated);
    assert_eq!(done.load(Ordering::SeqCst), 2);
    assert_eq!(done_at_shutdown.load(Ordering::SeqCst), 2);
    let _npl = sender.await.expect("sender task should finish");
}

#[tokio::test]
async fn update_peers_reaches_control_channel() {
    let host = Host::new("peers", false);
    let contract = HotPocketContract::new();

    unsafe {
        contract
            .init_with_args(&host.blob(), |ctx: ContractContext| async move {
                ctx.update_peers(
                    vec!["10.0.0.5:22860".to_string()],
                    vec!["10.0.0.6:22860".to_string()],
                )
                .await?;
                Ok::<(), BoxError>(())
            })
            .await
    }
    .expect("contract should run");

    let buf = host
        .control
        .recv()
        .await
        .expect("control read should succeed")
        .expect("control message should arrive");
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&buf).expect("control message is json"),
        json!({
            "type": "peer_changeset",
            "add": ["10.0.0.5:22860"],
            "remove": ["10.0.0.6:22860"]
        })
    );
}

async fn panicking_contract(_ctx: ContractContext) -> Result<(), BoxError> {
    panic!("contract blew up")
}

async fn failing_contract(_ctx: ContractContext) -> Result<(), BoxError> {
    Err("contract failed".into())
}

#[tokio::test]
async fn contract_failures_are_suppressed() {
    let host = Host::new("panic", true);
    let contract = HotPocketContract::new();
    unsafe { contract.init_with_args(&host.blob(), panicking_contract).await }
        .expect("panics inside the contract do not fail init");
    assert_eq!(contract.state(), LifecycleState::Terminated);

    let host = Host::new("error", true);
    let contract = HotPocketContract::new();
    unsafe { contract.init_with_args(&host.blob(), failing_contract).await }
        .expect("errors from the contract do not fail init");
    assert_eq!(contract.state(), LifecycleState::Terminated);
}

#[tokio::test]
async fn second_init_is_rejected() {
    let host = Host::new("twice", true);
    let contract = HotPocketContract::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let first = Arc::clone(&runs);
    unsafe {
        contract
            .init_with_args(&host.blob(), move |_ctx: ContractContext| async move {
                first.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            })
            .await
    }
    .expect("first init should run");

    let second = Arc::clone(&runs);
    let err = unsafe {
        contract
            .init_with_args(&host.blob(), move |_ctx: ContractContext| async move {
                second.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            })
            .await
    }
    .unwrap_err();

    assert!(matches!(err, InitError::AlreadyInitialized));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unopened_descriptor_fails_init_without_running_contract() {
    let mut host = Host::new("badfd", true);
    host.blob["control_fd"] = json!(-1);
    let ran = Arc::new(AtomicBool::new(false));
    let contract = HotPocketContract::new();

    let flag = Arc::clone(&ran);
    let err = unsafe {
        contract
            .init_with_args(&host.blob(), move |_ctx: ContractContext| async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            })
            .await
    }
    .unwrap_err();

    assert!(matches!(err, InitError::Transport(_)));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(contract.state(), LifecycleState::Terminated);
}
