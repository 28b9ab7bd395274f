//! Access log: one JSON object per request, appended by a single writer.
//!
//! Before [`AccessLog::start`] (and after [`AccessLog::stop`]) records are
//! written synchronously by the caller; while the worker runs they are
//! queued on a bounded channel and written in order through `tokio::fs`.
//! `SIGUSR1` makes the worker close and reopen the file so external
//! rotation works.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const ACCESS_LOG_QUEUE: usize = 1000;

#[derive(Debug, Error)]
pub enum AccessLogError {
    #[error("Could not open access log {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Access log is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AccessRecord {
    pub epoch: i64,
    pub timestamp: String,
    pub username: String,
    pub nodename: String,
    pub ip: String,
    pub xff: String,
    pub method: String,
    pub host: String,
    pub path: String,
    pub args: String,
    pub template: String,
    #[serde(rename = "staticfile")]
    pub static_file: String,
}

enum LogMsg {
    Line(String),
    Reopen,
}

#[derive(Default)]
struct Inner {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
    sender: Mutex<Option<mpsc::Sender<LogMsg>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    signals: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn open_sync(path: &Path) -> Result<File, AccessLogError> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path).map_err(|source| AccessLogError::Open {
        path: path.display().to_string(),
        source,
    })
}

async fn open_async(path: &Path) -> Result<tokio::fs::File, AccessLogError> {
    let mut options = tokio::fs::OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    options.mode(0o600);

    options.open(path).await.map_err(|source| AccessLogError::Open {
        path: path.display().to_string(),
        source,
    })
}

/// Writer task state: owns the file for as long as the worker runs.
struct Worker {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl Worker {
    async fn reopen(&mut self) {
        if let Some(mut file) = self.file.take() {
            file.flush().await.ok();
        }
        match open_async(&self.path).await {
            Ok(file) => self.file = Some(file),
            Err(e) => error!("{}", e),
        }
    }

    async fn write(&mut self, line: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        if let Err(e) = file.write_all(&buf).await {
            error!("Access log write failed: {}", e);
            self.reopen().await;
            return;
        }
        if let Err(e) = file.flush().await {
            error!("Access log flush failed: {}", e);
            self.reopen().await;
        }
    }

    async fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            file.flush().await.ok();
        }
    }
}

impl Inner {
    fn open(&self) -> Result<(), AccessLogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        *lock(&self.file) = Some(open_sync(path)?);
        Ok(())
    }

    fn reopen(&self) {
        lock(&self.file).take();
        if let Err(e) = self.open() {
            error!("{}", e);
        }
    }

    fn write(&self, line: &str) {
        let failed = {
            let mut guard = lock(&self.file);
            let Some(file) = guard.as_mut() else {
                return;
            };
            file.write_all(line.as_bytes())
                .and_then(|_| file.write_all(b"\n"))
                .err()
        };

        if let Some(e) = failed {
            error!("Access log write failed: {}", e);
            self.reopen();
        }
    }
}

/// Handle to the access log. Clones share the same file and worker.
#[derive(Clone, Default)]
pub struct AccessLog {
    inner: Arc<Inner>,
}

impl AccessLog {
    /// An empty `path` disables access logging.
    pub fn new(path: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: if path.is_empty() { None } else { Some(PathBuf::from(path)) },
                ..Default::default()
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.path.is_some()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.sender).is_some()
    }

    /// Open the file (so configuration errors surface at startup) and
    /// spawn the writer task.
    pub fn start(&self) -> Result<(), AccessLogError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if self.is_running() {
            return Err(AccessLogError::AlreadyRunning);
        }

        let Some(path) = self.inner.path.clone() else {
            return Ok(());
        };

        // Open here so a bad path fails startup; the worker takes the file over
        let file = match lock(&self.inner.file).take() {
            Some(file) => file,
            None => open_sync(&path)?,
        };

        let mut state = Worker {
            path,
            file: Some(tokio::fs::File::from_std(file)),
        };
        let (tx, mut rx) = mpsc::channel::<LogMsg>(ACCESS_LOG_QUEUE);
        let worker = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    LogMsg::Line(line) => state.write(&line).await,
                    LogMsg::Reopen => {
                        debug!("Reopening access log");
                        state.reopen().await;
                    }
                }
            }
            state.close().await;
            debug!("Access log worker done");
        });

        *lock(&self.inner.signals) = Self::spawn_signal_listener(tx.downgrade());
        *lock(&self.inner.worker) = Some(worker);
        *lock(&self.inner.sender) = Some(tx);

        info!("Access log started");
        Ok(())
    }

    #[cfg(unix)]
    fn spawn_signal_listener(weak: mpsc::WeakSender<LogMsg>) -> Option<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                error!("Could not install SIGUSR1 handler: {}", e);
                return None;
            }
        };

        Some(tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                let Some(tx) = weak.upgrade() else {
                    break;
                };
                if tx.send(LogMsg::Reopen).await.is_err() {
                    break;
                }
            }
        }))
    }

    #[cfg(not(unix))]
    fn spawn_signal_listener(_weak: mpsc::WeakSender<LogMsg>) -> Option<JoinHandle<()>> {
        None
    }

    /// Close the channel and wait until every queued record is written.
    pub async fn stop(&self) {
        if let Some(signals) = lock(&self.inner.signals).take() {
            signals.abort();
        }

        let sender = lock(&self.inner.sender).take();
        drop(sender);

        let worker = lock(&self.inner.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Access log worker failed: {}", e);
            }
        }
    }

    /// Ask for the file to be reopened, e.g. after rotation.
    pub async fn reopen(&self) {
        let sender = lock(&self.inner.sender).clone();
        match sender {
            Some(tx) => {
                if tx.send(LogMsg::Reopen).await.is_err() {
                    self.inner.reopen();
                }
            }
            None => self.inner.reopen(),
        }
    }

    pub async fn log(&self, record: &AccessRecord) {
        if !self.is_enabled() {
            return;
        }

        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                error!("Could not format access log message: {}", e);
                return;
            }
        };

        let sender = lock(&self.inner.sender).clone();
        match sender {
            Some(tx) => {
                if let Err(mpsc::error::SendError(LogMsg::Line(line))) = tx.send(LogMsg::Line(line)).await {
                    self.inner.write(&line);
                }
            }
            None => {
                // Not started yet: write in the caller
                if lock(&self.inner.file).is_none() {
                    if let Err(e) = self.inner.open() {
                        error!("{}", e);
                        return;
                    }
                }
                self.inner.write(&line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log() -> PathBuf {
        std::env::temp_dir().join(format!("portal-access-{}.log", uuid::Uuid::new_v4()))
    }

    fn record(path: &str) -> AccessRecord {
        AccessRecord {
            epoch: 1_700_000_000,
            timestamp: "2023-11-14 22:13:20".to_string(),
            username: "alice".to_string(),
            nodename: "node1".to_string(),
            ip: "192.0.2.1".to_string(),
            xff: "192.0.2.1".to_string(),
            method: "GET".to_string(),
            host: "portal.example".to_string(),
            path: path.to_string(),
            args: String::new(),
            template: "index.tmpl".to_string(),
            static_file: String::new(),
        }
    }

    fn lines(path: &PathBuf) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_disabled_log_writes_nothing() {
        let log = AccessLog::new("");
        log.start().unwrap();
        assert!(!log.is_running());
        log.log(&record("/")).await;
    }

    #[tokio::test]
    async fn test_synchronous_write_before_start() {
        let path = temp_log();
        let log = AccessLog::new(path.to_str().unwrap());
        log.log(&record("/early")).await;

        let written = lines(&path);
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["path"], "/early");
        assert_eq!(written[0]["staticfile"], "");
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_worker_preserves_order_and_drains_on_stop() {
        let path = temp_log();
        let log = AccessLog::new(path.to_str().unwrap());
        log.start().unwrap();
        assert!(log.is_running());
        assert!(matches!(log.start(), Err(AccessLogError::AlreadyRunning)));

        for i in 0..50 {
            log.log(&record(&format!("/{}", i))).await;
        }
        log.stop().await;
        assert!(!log.is_running());

        let written = lines(&path);
        assert_eq!(written.len(), 50);
        assert_eq!(written[0]["path"], "/0");
        assert_eq!(written[49]["path"], "/49");
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_reopen_follows_rotation() {
        let path = temp_log();
        let rotated = path.with_extension("log.1");
        let log = AccessLog::new(path.to_str().unwrap());
        log.start().unwrap();

        log.log(&record("/before")).await;
        // Let the worker write before the file is moved away
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        std::fs::rename(&path, &rotated).unwrap();
        log.reopen().await;
        log.log(&record("/after")).await;
        log.stop().await;

        assert_eq!(lines(&rotated)[0]["path"], "/before");
        assert_eq!(lines(&path)[0]["path"], "/after");
        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&rotated).ok();
    }

    #[tokio::test]
    async fn test_writes_fall_back_after_stop() {
        let path = temp_log();
        let log = AccessLog::new(path.to_str().unwrap());
        log.log(&record("/cold")).await;
        log.start().unwrap();
        log.log(&record("/warm")).await;
        log.stop().await;
        log.log(&record("/late")).await;

        let written: Vec<_> = lines(&path).iter().map(|l| l["path"].clone()).collect();
        assert_eq!(written, vec!["/cold", "/warm", "/late"]);
        std::fs::remove_file(&path).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_mode_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_log();
        let log = AccessLog::new(path.to_str().unwrap());
        log.start().unwrap();
        log.stop().await;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        std::fs::remove_file(&path).ok();
    }
}
