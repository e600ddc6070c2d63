//! Process wiring and shutdown.
//!
//! The orchestrator logs in, opens the push subscription and schedules the
//! timer before anything is spawned, so every StartupFatal condition is
//! reported before the first backup can run. Once running, only two things
//! end it: the shutdown token, or the renewal loop giving up.
//!
//! ```text
//!  PushSource ─┐
//!              ├─► merger ─► BackupPipeline ─► RemoteStorage
//! TimerSource ─┘                  │
//!                                 └── reads CredentialHandle ◄── RenewalLoop
//!
//! RetentionSweeper ─► RemoteStorage          (own interval)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::adapters::{DriveStorage, TungsteniteSubscriber, VaultClient, WebhookNotifier};
use crate::config::AppConfig;
use crate::credential::{credential_slot, Credential};
use crate::error::{VaultBackupError, VaultBackupResult};
use crate::merger::merge_channel;
use crate::pipeline::BackupPipeline;
use crate::renewal::RenewalLoop;
use crate::retention::RetentionSweeper;
use crate::sources::{PushSource, ReconnectPolicy, TimerSource};
use crate::status::{start_status_server_on, StatusTracker};
use crate::traits::{
    EventSubscriber, NoopNotifier, Notifier, RemoteStorage, RoleCredentials, SecretStore,
};
use crate::trigger::DeployTargets;

/// Time the sources, pipeline and sweeper get to stop after cancellation.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The external systems the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SecretStore>,
    pub storage: Arc<dyn RemoteStorage>,
    pub subscriber: Arc<dyn EventSubscriber>,
    pub notifier: Arc<dyn Notifier>,
}

/// Values the orchestrator needs from configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub role: RoleCredentials,
    pub snapshot_folder: PathBuf,
    pub targets: DeployTargets,
    pub scheduled_interval: Duration,
    pub sweep_interval: Duration,
    pub retention_days: u32,
    pub max_concurrent_deletes: usize,
    pub queue_capacity: usize,
    pub reconnect: ReconnectPolicy,
    pub status_bind: Option<SocketAddr>,
    pub shutdown_grace: Duration,
}

impl Settings {
    /// Settings from a loaded and initialized config.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            role: RoleCredentials::new(
                config.vault.app_role_id.clone(),
                config.vault.app_secret_id.clone().unwrap_or_default(),
            ),
            snapshot_folder: config.vault.snapshot_folder.clone(),
            targets: DeployTargets::new(
                config.storage.on_event_deploy_folder_id.clone(),
                config.storage.scheduled_deploy_folder_id.clone(),
            ),
            scheduled_interval: config.vault.scheduled_snapshot_interval,
            sweep_interval: config.storage.retention_sweep_interval,
            retention_days: config.storage.backup_file_retention_days,
            max_concurrent_deletes: config.storage.max_concurrent_deletes,
            queue_capacity: config.pipeline.queue_capacity,
            reconnect: ReconnectPolicy {
                max_attempts: config.push.max_reconnect_attempts,
                max_backoff: config.max_backoff(),
            },
            status_bind: config.status.bind,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Starts every component and owns shutdown.
pub struct Orchestrator {
    settings: Settings,
    collaborators: Collaborators,
    status: StatusTracker,
    status_addr: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

impl Orchestrator {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
            status: StatusTracker::new(),
            status_addr: None,
        }
    }

    /// Tracker shared with the components, readable while running.
    pub fn status(&self) -> StatusTracker {
        self.status.clone()
    }

    /// Report the bound status address once the server is listening.
    pub fn on_status_bound(mut self, tx: tokio::sync::oneshot::Sender<SocketAddr>) -> Self {
        self.status_addr = Some(tx);
        self
    }

    /// Log in, then run until `shutdown` fires or renewal fails.
    pub async fn run(self, shutdown: CancellationToken) -> VaultBackupResult<()> {
        let credential = match self.login().await {
            Ok(credential) => credential,
            Err(e) => return Err(self.fail(e).await),
        };
        self.run_with_credential(credential, shutdown).await
    }

    /// The initial AppRole login.
    pub async fn login(&self) -> VaultBackupResult<Credential> {
        let credential = self
            .collaborators
            .store
            .login(&self.settings.role)
            .await
            .map_err(VaultBackupError::InitialLogin)?;
        tracing::info!(
            lease_secs = credential.lease_duration().as_secs(),
            renewable = credential.is_renewable(),
            "initial login succeeded"
        );
        Ok(credential)
    }

    /// Run with an already obtained initial credential.
    ///
    /// Returns `Ok(())` after a clean shutdown and the fatal error otherwise.
    pub async fn run_with_credential(
        mut self,
        credential: Credential,
        shutdown: CancellationToken,
    ) -> VaultBackupResult<()> {
        let root = shutdown.child_token();
        match self.start(credential, &root).await {
            Ok(running) => {
                let result = running.wait(&shutdown, &root).await;
                match result {
                    Ok(()) => Ok(()),
                    Err(e) => Err(self.fail(e).await),
                }
            }
            Err(e) => {
                root.cancel();
                Err(self.fail(e).await)
            }
        }
    }

    async fn start(
        &mut self,
        credential: Credential,
        root: &CancellationToken,
    ) -> VaultBackupResult<Running> {
        let settings = &self.settings;
        let parts = &self.collaborators;

        let (installer, credentials) = credential_slot(credential);
        self.status.attach_credentials(credentials.clone()).await;

        let (sender, receiver) = merge_channel(settings.queue_capacity);
        self.status.attach_merger(sender.stats()).await;

        if settings.sweep_interval.is_zero() {
            return Err(VaultBackupError::Scheduler(
                "retention sweep interval must be greater than zero".to_string(),
            ));
        }
        let timer = TimerSource::new(settings.scheduled_interval, sender.clone())?;
        let push = PushSource::connect(
            parts.subscriber.clone(),
            credentials.clone(),
            sender,
            settings.reconnect,
        )
        .await
        .map_err(VaultBackupError::PushSubscription)?;

        let renewal = RenewalLoop::new(parts.store.clone(), settings.role.clone(), installer);
        self.status.attach_renewal(renewal.state()).await;

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        if let Some(bind) = settings.status_bind {
            let (handle, addr) = start_status_server_on(bind, self.status.clone(), root.clone())
                .await
                .map_err(VaultBackupError::StatusServer)?;
            if let Some(tx) = self.status_addr.take() {
                let _ = tx.send(addr);
            }
            tasks.push(("status", handle));
        }

        let renewal_task = tokio::spawn(
            renewal
                .run(root.clone())
                .instrument(tracing::info_span!("renewal")),
        );

        let cancel = root.clone();
        tasks.push((
            "push_source",
            tokio::spawn(
                async move {
                    if let Err(e) = push.run(cancel).await {
                        tracing::error!(
                            error = %e,
                            code = e.error_code(),
                            category = %e.category(),
                            "push source terminated, scheduled backups continue"
                        );
                    }
                }
                .instrument(tracing::info_span!("push_source")),
            ),
        ));

        tasks.push((
            "timer_source",
            tokio::spawn(
                timer
                    .run(root.clone())
                    .instrument(tracing::info_span!("timer_source")),
            ),
        ));

        let pipeline = BackupPipeline::new(
            parts.store.clone(),
            parts.storage.clone(),
            credentials,
            settings.targets.clone(),
            settings.snapshot_folder.clone(),
        )
        .with_notifier(parts.notifier.clone())
        .with_status(self.status.clone());
        let cancel = root.clone();
        tasks.push((
            "pipeline",
            tokio::spawn(
                async move { pipeline.run(receiver, cancel).await }
                    .instrument(tracing::info_span!("pipeline")),
            ),
        ));

        let sweeper = RetentionSweeper::new(parts.storage.clone(), settings.retention_days)
            .with_max_concurrent(settings.max_concurrent_deletes)
            .with_status(self.status.clone());
        let interval = settings.sweep_interval;
        let cancel = root.clone();
        tasks.push((
            "retention",
            tokio::spawn(
                async move {
                    if let Err(e) = sweeper.run(interval, cancel).await {
                        tracing::error!(error = %e, "retention sweeper stopped");
                    }
                }
                .instrument(tracing::info_span!("retention")),
            ),
        ));

        tracing::info!(
            scheduled = %humantime::format_duration(settings.scheduled_interval),
            sweep = %humantime::format_duration(settings.sweep_interval),
            retention_days = settings.retention_days,
            "orchestrator started"
        );

        Ok(Running {
            renewal: renewal_task,
            tasks,
            grace: settings.shutdown_grace,
        })
    }

    async fn fail(&self, error: VaultBackupError) -> VaultBackupError {
        report_fatal(self.collaborators.notifier.as_ref(), error).await
    }
}

/// Log a fatal error and notify the operator.
async fn report_fatal(notifier: &dyn Notifier, error: VaultBackupError) -> VaultBackupError {
    tracing::error!(
        error = %error,
        code = error.error_code(),
        category = %error.category(),
        "orchestrator stopping"
    );
    let subject = format!("vault-backup stopped: {}", error.error_code());
    if let Err(e) = notifier.notify(&subject, &error.to_string()).await {
        tracing::warn!(error = %e, "unable to send failure notification");
    }
    error
}

/// Spawned components of a started orchestrator.
struct Running {
    renewal: JoinHandle<VaultBackupResult<()>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    grace: Duration,
}

impl Running {
    async fn wait(
        mut self,
        shutdown: &CancellationToken,
        root: &CancellationToken,
    ) -> VaultBackupResult<()> {
        let finished = tokio::select! {
            _ = shutdown.cancelled() => None,
            joined = &mut self.renewal => Some(joined),
        };

        if finished.is_none() {
            tracing::info!("shutdown requested");
        }
        root.cancel();

        let joined = match finished {
            Some(joined) => joined,
            None => (&mut self.renewal).await,
        };
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(VaultBackupError::RenewalAborted(e.to_string())),
        };

        drain(self.tasks, self.grace).await;
        tracing::info!("orchestrator stopped");
        result
    }
}

/// Await every task until `grace` runs out, then abort the rest.
async fn drain(tasks: Vec<(&'static str, JoinHandle<()>)>, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    for (name, mut handle) in tasks {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => tracing::debug!(task = name, "task stopped"),
            Ok(Err(e)) => tracing::error!(task = name, error = %e, "task failed"),
            Err(_) => {
                tracing::warn!(task = name, "task did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}

/// Build the production collaborators from `config` and run.
///
/// The storage access token comes from the environment when set and is
/// otherwise read from the configured KV secret with the initial credential.
pub async fn run_from_config(config: AppConfig, shutdown: CancellationToken) -> VaultBackupResult<()> {
    let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(NoopNotifier),
    };
    let vault = VaultClient::new(config.vault.address.clone());
    let subscriber = TungsteniteSubscriber::new(
        config.vault.events_base_url(),
        config.vault.listened_event_type.clone(),
    );
    let settings = Settings::from_config(&config);

    let credential = match vault.login(&settings.role).await {
        Ok(credential) => credential,
        Err(e) => {
            return Err(report_fatal(notifier.as_ref(), VaultBackupError::InitialLogin(e)).await)
        }
    };
    tracing::info!(
        lease_secs = credential.lease_duration().as_secs(),
        renewable = credential.is_renewable(),
        "initial login succeeded"
    );

    let token = match storage_token(&config, &vault, &credential).await {
        Ok(token) => token,
        Err(e) => return Err(report_fatal(notifier.as_ref(), e).await),
    };
    let storage = DriveStorage::new(
        config.storage.api_base_url.clone(),
        config.storage.upload_base_url.clone(),
        token,
    )
    .with_parents([
        config.storage.on_event_deploy_folder_id.clone(),
        config.storage.scheduled_deploy_folder_id.clone(),
    ]);

    Orchestrator::new(
        settings,
        Collaborators {
            store: Arc::new(vault),
            storage: Arc::new(storage),
            subscriber: Arc::new(subscriber),
            notifier,
        },
    )
    .run_with_credential(credential, shutdown)
    .await
}

async fn storage_token(
    config: &AppConfig,
    vault: &VaultClient,
    credential: &Credential,
) -> VaultBackupResult<String> {
    if let Some(token) = &config.storage.access_token {
        return Ok(token.clone());
    }
    match &config.storage.token_secret {
        Some(secret) => {
            let token = vault
                .read_kv_string(credential, &secret.mount, &secret.path, &secret.key)
                .await
                .map_err(VaultBackupError::StorageCredential)?;
            tracing::info!(mount = %secret.mount, path = %secret.path, "storage token read from secret store");
            Ok(token)
        }
        None => Err(VaultBackupError::Config(
            crate::config::ConfigError::Missing("storage.access_token"),
        )),
    }
}
