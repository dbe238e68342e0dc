//! The engine: wires sinks, host keys, the event bus and the services
//! together and owns their lifecycle.
//!
//! Startup order: shared SQLite pool (when configured) → schema bootstrap →
//! sinks → host keys → dispatcher → services. Shutdown order is the
//! reverse: services stop producing, the engine drops the last bus sender,
//! the dispatcher drains and closes the sinks, then the pool is closed.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{self, Dispatcher};
use crate::config::{normalize_bind, SinkTarget, SshConfig};
use crate::errors::{ConfigError, EngineError, StoreError};
use crate::form;
use crate::keys::HostKeyStore;
use crate::monitor;
use crate::server::SshServer;
use crate::sink::{ConsoleSink, FileSink, Sink, SqliteSink};
use crate::store::{self, EventStore};

/// Everything the engine needs to start, assembled by the CLI layer.
#[derive(Debug)]
pub struct EngineOptions {
    pub ssh: SshConfig,
    pub sinks: Vec<SinkTarget>,
    /// Bind address for the read-only monitor API, when enabled.
    pub monitor_bind: Option<String>,
    /// Bind address for the fake login form, when enabled.
    pub form_bind: Option<String>,
}

/// Run the honeypot until `shutdown` is cancelled and everything drains.
///
/// A later `force` cancellation aborts in-flight SSH sessions. Only fatal
/// resource-acquisition errors are returned; per-session and per-sink
/// failures stay inside their components.
pub async fn run(
    opts: EngineOptions,
    shutdown: CancellationToken,
    force: CancellationToken,
) -> Result<(), EngineError> {
    let pool = open_shared_pool(&opts).await?;

    let mut sinks = Vec::with_capacity(opts.sinks.len());
    for target in &opts.sinks {
        let sink = match target {
            SinkTarget::Console => Sink::Console(ConsoleSink),
            SinkTarget::File(path) => Sink::File(FileSink::open(path).await?),
            SinkTarget::Sqlite(_) => {
                let pool = pool.as_ref().ok_or_else(|| {
                    ConfigError::Unsatisfied("sqlite sink configured without a database".into())
                })?;
                Sink::Sqlite(SqliteSink::new(pool.clone()))
            }
        };
        sinks.push(sink);
    }

    let keys = install_host_keys(&opts.ssh)?;

    let (tx, rx) = bus::channel();
    let dispatcher = Dispatcher::new(sinks).spawn(rx);

    let mut services: JoinSet<Result<(), EngineError>> = JoinSet::new();

    let ssh = SshServer::new(&opts.ssh, keys, tx.clone());
    let ssh_bind = opts.ssh.bind_addr();
    let ssh_shutdown = shutdown.clone();
    let ssh_force = force.clone();
    services.spawn(async move { ssh.serve(&ssh_bind, ssh_shutdown, ssh_force).await });

    if let Some(bind) = &opts.form_bind {
        services.spawn(form::serve(
            normalize_bind(bind),
            tx.clone(),
            shutdown.clone(),
        ));
    }

    if let (Some(bind), Some(pool)) = (&opts.monitor_bind, &pool) {
        services.spawn(monitor::serve(
            normalize_bind(bind),
            EventStore::new(pool.clone()),
            shutdown.clone(),
        ));
    }

    // The services hold the remaining senders; dropping ours lets the bus
    // close once they all stop.
    drop(tx);

    let mut failure = None;
    while let Some(joined) = services.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(error = %err, "service failed, shutting down");
                shutdown.cancel();
                failure.get_or_insert(err);
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => warn!(error = %err, "service task panicked"),
        }
    }

    info!("draining event dispatcher");
    if dispatcher.await.is_err() {
        warn!("event dispatcher ended abnormally");
    }

    if let Some(pool) = pool {
        pool.close().await;
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Open the engine-owned SQLite pool when any sink (or the monitor) needs
/// it, and bootstrap the schema.
async fn open_shared_pool(opts: &EngineOptions) -> Result<Option<SqlitePool>, EngineError> {
    let path = opts.sinks.iter().find_map(SinkTarget::sqlite_path);

    let Some(path) = path else {
        if opts.monitor_bind.is_some() {
            return Err(ConfigError::Unsatisfied(
                "the monitor requires a sqlite:// sink to read from".into(),
            )
            .into());
        }
        return Ok(None);
    };

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .map_err(StoreError::from)?;
    store::ensure_schema(&pool).await?;
    info!(path = %path.display(), "event database ready");

    Ok(Some(pool))
}

/// Load or generate one host key per configured algorithm.
///
/// A failing algorithm is logged and skipped; ending up with zero keys is
/// fatal because the SSH honeypot could not complete any handshake.
fn install_host_keys(config: &SshConfig) -> Result<Vec<russh::keys::ssh_key::PrivateKey>, EngineError> {
    let store = HostKeyStore::new(&config.homedir)?;
    let algorithms = config.host_key_algorithms()?;

    let mut keys = Vec::with_capacity(algorithms.len());
    for algorithm in algorithms {
        match store.load_or_create(algorithm) {
            Ok(key) => keys.push(key),
            Err(err) => {
                warn!(algorithm = algorithm.name(), error = %err, "skipping host key");
            }
        }
    }

    if keys.is_empty() {
        return Err(EngineError::NoHostKeys);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn monitor_without_sqlite_sink_is_a_config_error() {
        let opts = EngineOptions {
            ssh: SshConfig::default(),
            sinks: vec![SinkTarget::Console],
            monitor_bind: Some("127.0.0.1:0".into()),
            form_bind: None,
        };
        let err = open_shared_pool(&opts).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::Unsatisfied(_))
        ));
    }

    #[tokio::test]
    async fn no_pool_without_sqlite_targets() {
        let opts = EngineOptions {
            ssh: SshConfig::default(),
            sinks: vec![SinkTarget::Console],
            monitor_bind: None,
            form_bind: None,
        };
        assert!(open_shared_pool(&opts).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn host_keys_installed_into_fresh_home() {
        let home = tempfile::tempdir().unwrap();
        let config = SshConfig {
            homedir: home.path().to_str().unwrap().to_string(),
            ciphers: vec!["ssh-ed25519".into()],
            ..Default::default()
        };
        let keys = install_host_keys(&config).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(home.path().join(".ssh/id_ed25519").exists());
    }

    #[tokio::test]
    async fn unknown_cipher_surfaces_as_config_error() {
        let home = tempfile::tempdir().unwrap();
        let config = SshConfig {
            homedir: home.path().to_str().unwrap().to_string(),
            ciphers: vec!["ssh-dss".into()],
            ..Default::default()
        };
        assert!(matches!(
            install_host_keys(&config),
            Err(EngineError::Config(ConfigError::UnknownCipher(_)))
        ));
    }
}
