use std::future::Future;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use hpcontract_channel::{
    ClientProtocol, ControlChannel, NplChannel, UserChannel, UserInputReader,
};
use hpcontract_transport::adopt_fd;
use tracing::{debug, error, info, warn};

use crate::args::{ExecutionMode, HotPocketArgs};
use crate::context::ContractContext;
use crate::error::{BoxError, InitError};
use crate::patch_config::{PatchConfig, PATCH_CONFIG_PATH};
use crate::tasks::PendingTasks;
use crate::unl::UnlCollection;
use crate::users::{User, UsersCollection};

/// Where a [`HotPocketContract`] is in its single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    ArgsParsed,
    Executing,
    Draining,
    Terminated,
}

/// Called once the execution has fully shut down, when forced termination
/// is enabled.
pub trait ShutdownHook: Send + Sync {
    fn terminate(&self);
}

impl<F> ShutdownHook for F
where
    F: Fn() + Send + Sync,
{
    fn terminate(&self) {
        self()
    }
}

/// Sends `SIGINT` to the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfInterrupt;

impl ShutdownHook for SelfInterrupt {
    fn terminate(&self) {
        // SAFETY: getpid and kill take no pointers.
        let rc = unsafe { libc::kill(libc::getpid(), libc::SIGINT) };
        if rc != 0 {
            warn!(
                error = %std::io::Error::last_os_error(),
                "failed to interrupt own process"
            );
        }
    }
}

/// Settings fixed for the whole execution.
#[derive(Debug, Clone)]
pub struct ContractConfig {
    /// Serialization used for user output.
    pub protocol: ClientProtocol,
    /// Run the shutdown hook after the channels are closed.
    pub force_terminate: bool,
    /// Patch config file exposed through the context.
    pub patch_config: PathBuf,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            protocol: ClientProtocol::default(),
            force_terminate: false,
            patch_config: PathBuf::from(PATCH_CONFIG_PATH),
        }
    }
}

/// Runs a contract entry point for one host-driven execution.
pub struct HotPocketContract {
    config: ContractConfig,
    shutdown_hook: Arc<dyn ShutdownHook>,
    state: Mutex<LifecycleState>,
    initialized: AtomicBool,
}

impl Default for HotPocketContract {
    fn default() -> Self {
        Self::new()
    }
}

impl HotPocketContract {
    pub fn new() -> Self {
        Self::with_config(ContractConfig::default())
    }

    pub fn with_config(config: ContractConfig) -> Self {
        Self {
            config,
            shutdown_hook: Arc::new(SelfInterrupt),
            state: Mutex::new(LifecycleState::Uninitialized),
            initialized: AtomicBool::new(false),
        }
    }

    /// Replace the hook run on forced termination. Defaults to [`SelfInterrupt`].
    pub fn with_shutdown_hook(mut self, hook: impl ShutdownHook + 'static) -> Self {
        self.shutdown_hook = Arc::new(hook);
        self
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the host's arguments from stdin and run `contract` to completion.
    ///
    /// Returns once every pending task has settled and the channels are
    /// closed. Errors and panics inside `contract` are logged, never
    /// returned. An `Err` means the contract was not started.
    pub async fn init<F, Fut>(&self, contract: F) -> Result<(), InitError>
    where
        F: FnOnce(ContractContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let stdin = std::io::stdin();
        let interactive = stdin.is_terminal();
        // SAFETY: the host hands every descriptor named in the args to this
        // process and nothing else in it owns them.
        unsafe { self.init_from(stdin, interactive, contract).await }
    }

    /// Read the argument blob from `input` and run `contract`.
    ///
    /// # Safety
    ///
    /// Same as [`init_with_args`](Self::init_with_args).
    async unsafe fn init_from<R, F, Fut>(
        &self,
        mut input: R,
        interactive: bool,
        contract: F,
    ) -> Result<(), InitError>
    where
        R: Read + Send + 'static,
        F: FnOnce(ContractContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        if self.initialized.load(Ordering::Acquire) {
            return Err(InitError::AlreadyInitialized);
        }

        if interactive {
            error!("HotPocket smart contracts must be executed via HotPocket");
            return Err(InitError::Interactive);
        }

        let raw = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut raw = String::new();
            input.read_to_string(&mut raw)?;
            Ok(raw)
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|read| read)
        .map_err(|err| {
            error!(error = %err, "failed reading hotpocket args");
            InitError::ReadArgs(err)
        })?;

        // SAFETY: forwarded from the caller.
        unsafe { self.init_with_args(&raw, contract).await }
    }

    /// Run `contract` with an argument blob obtained elsewhere.
    ///
    /// # Safety
    ///
    /// Every descriptor number in `raw` must be open and owned by nobody
    /// else in this process. They are closed when the execution ends.
    pub async unsafe fn init_with_args<F, Fut>(&self, raw: &str, contract: F) -> Result<(), InitError>
    where
        F: FnOnce(ContractContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let args = HotPocketArgs::parse(raw).map_err(|err| {
            error!(error = %err, "failed parsing hotpocket args");
            err
        })?;
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(InitError::AlreadyInitialized);
        }
        self.set_state(LifecycleState::ArgsParsed);

        let pending = PendingTasks::new();
        // SAFETY: forwarded from the caller.
        let opened = unsafe { open_channels(args, &self.config, &pending) };
        let Channels {
            context,
            control,
            npl,
        } = match opened {
            Ok(channels) => channels,
            Err(err) => {
                error!(error = %err, "failed opening channels");
                self.set_state(LifecycleState::Terminated);
                return Err(err);
            }
        };

        self.set_state(LifecycleState::Executing);
        let entry = tokio::spawn(async move { contract(context).await });
        match entry.await {
            Ok(Ok(())) => debug!("contract entry point returned"),
            Ok(Err(err)) => error!(error = %err, "contract entry point failed"),
            Err(err) => error!(error = %err, "contract entry point panicked"),
        }

        self.set_state(LifecycleState::Draining);
        let report = pending.drain().await;
        debug!(
            completed = report.completed,
            failed = report.failed,
            "pending tasks drained"
        );

        if let Some(npl) = npl {
            npl.close();
        }
        control.close();
        self.set_state(LifecycleState::Terminated);
        info!("contract execution finished");

        if self.config.force_terminate {
            self.shutdown_hook.terminate();
        }
        Ok(())
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        debug!(?from, state = ?next, "lifecycle transition");
        *state = next;
    }
}

impl std::fmt::Debug for HotPocketContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotPocketContract")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct Channels {
    context: ContractContext,
    control: Arc<ControlChannel>,
    npl: Option<Arc<NplChannel>>,
}

/// Take ownership of every descriptor in `args` and build the context.
///
/// # Safety
///
/// See [`HotPocketContract::init_with_args`].
unsafe fn open_channels(
    args: HotPocketArgs,
    config: &ContractConfig,
    pending: &PendingTasks,
) -> Result<Channels, InitError> {
    let control = Arc::new(ControlChannel::new(unsafe { adopt_fd(args.control_fd)? })?);
    let reader = UserInputReader::new(unsafe { adopt_fd(args.user_in_fd)? });

    let mut users = Vec::with_capacity(args.users.len());
    for (public_key, user) in &args.users {
        let fd = unsafe { adopt_fd(user.output_fd)? };
        let channel = UserChannel::new(fd, config.protocol);
        users.push(User::new(public_key.clone(), user.inputs.clone(), channel));
    }
    let users = UsersCollection::new(reader, users);

    let (unl, npl) = match &args.mode {
        ExecutionMode::ReadOnly => (UnlCollection::read_only(pending.clone()), None),
        ExecutionMode::Consensus { npl_fd, unl, .. } => {
            let npl = Arc::new(NplChannel::new(unsafe { adopt_fd(*npl_fd)? })?);
            let unl = UnlCollection::new(unl, Arc::clone(&npl), pending.clone());
            (unl, Some(npl))
        }
    };
    debug!(
        users = users.count(),
        unl = unl.count(),
        readonly = args.mode.is_readonly(),
        "channels opened"
    );

    let context = ContractContext::new(args, users, unl, Arc::clone(&control))
        .with_patch_config(PatchConfig::new(config.patch_config.clone()));
    Ok(Channels {
        context,
        control,
        npl,
    })
}
