//! Tails `dhcpd.leases` and registers each lease's IP.

use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Lease, LeaseParser};
use crate::services::NodeLookup;

pub struct LeasePoller {
    path: PathBuf,
    interval: Duration,
    lookup: Arc<dyn NodeLookup>,
    parser: LeaseParser,
    /// Bytes of the file already consumed
    offset: u64,
    /// Tail of the last read that did not end a block yet
    pending: String,
}

impl LeasePoller {
    pub fn new(
        path: impl Into<PathBuf>,
        interval: Duration,
        lookup: Arc<dyn NodeLookup>,
    ) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            interval,
            lookup,
            parser: LeaseParser::new()?,
            offset: 0,
            pending: String::new(),
        })
    }

    /// Poll until `shutdown` flips. Failed polls are logged and retried on
    /// the next tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(path = %self.path.display(), interval = ?self.interval, "Running DHCP lease poller");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(path = %self.path.display(), error = %e, "Failed to poll lease file");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Lease poller shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Read whatever was appended since the last poll and register the
    /// complete leases in it. Returns how many leases were found.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let chunk = match self.read_appended().await {
            Ok(chunk) => chunk,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Lease file does not exist yet");
                return Ok(0);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        if chunk.is_empty() {
            return Ok(0);
        }
        self.pending.push_str(&chunk);

        let complete = match self.pending.rfind('}') {
            Some(end) => {
                let rest = self.pending.split_off(end + 1);
                std::mem::replace(&mut self.pending, rest)
            }
            None => return Ok(0),
        };

        let leases = self.parser.parse(&complete, Utc::now());
        debug!(count = leases.len(), "Parsed leases");
        for lease in &leases {
            self.register(lease).await;
        }
        Ok(leases.len())
    }

    async fn read_appended(&mut self) -> std::io::Result<String> {
        let mut file = File::open(&self.path).await?;
        let len = file.metadata().await?.len();

        if len < self.offset {
            debug!(path = %self.path.display(), "Lease file was rewritten, starting over");
            self.offset = 0;
            self.pending.clear();
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.offset += read as u64;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    async fn register(&self, lease: &Lease) {
        match self.lookup.register_ip(lease.ip, &lease.mac).await {
            Ok(_) => debug!(ip = %lease.ip, mac = %lease.mac, "Registered lease"),
            Err(e) => warn!(ip = %lease.ip, mac = %lease.mac, error = %e, "Failed to register lease"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::net::Ipv4Addr;
    use std::path::Path;
    use std::sync::RwLock;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::error::ServiceError;
    use crate::services::{IpRegistration, Node};

    #[derive(Default)]
    struct Recorder {
        registrations: RwLock<Vec<(Ipv4Addr, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl NodeLookup for Recorder {
        async fn node_by_mac(&self, mac: &str) -> Result<Node, ServiceError> {
            Err(ServiceError::NotFound(mac.to_string()))
        }

        async fn register_ip(&self, ip: Ipv4Addr, mac: &str) -> Result<IpRegistration, ServiceError> {
            self.registrations.write().unwrap().push((ip, mac.to_string()));
            if self.fail {
                return Err(ServiceError::Unavailable("registry down".to_string()));
            }
            Ok(IpRegistration::Recorded)
        }
    }

    const LEASE_A: &str = "lease 10.1.1.10 {\n  ends never;\n  hardware ethernet 00:11:22:33:44:aa;\n}\n";
    const LEASE_B: &str = "lease 10.1.1.11 {\n  ends never;\n  hardware ethernet 00:11:22:33:44:bb;\n}\n";

    fn setup(fail: bool) -> (TempDir, PathBuf, Arc<Recorder>, LeasePoller) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dhcpd.leases");
        let recorder = Arc::new(Recorder {
            fail,
            ..Recorder::default()
        });
        let poller = LeasePoller::new(
            path.clone(),
            Duration::from_millis(10),
            recorder.clone(),
        )
        .unwrap();
        (dir, path, recorder, poller)
    }

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn registered(recorder: &Recorder) -> Vec<(Ipv4Addr, String)> {
        recorder.registrations.read().unwrap().clone()
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let (_dir, _path, recorder, mut poller) = setup(false);
        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert!(registered(&recorder).is_empty());
    }

    #[tokio::test]
    async fn only_appended_leases_are_registered() {
        let (_dir, path, recorder, mut poller) = setup(false);

        append(&path, LEASE_A);
        assert_eq!(poller.poll_once().await.unwrap(), 1);

        append(&path, LEASE_B);
        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(poller.poll_once().await.unwrap(), 0);

        assert_eq!(
            registered(&recorder),
            vec![
                (Ipv4Addr::new(10, 1, 1, 10), "00:11:22:33:44:aa".to_string()),
                (Ipv4Addr::new(10, 1, 1, 11), "00:11:22:33:44:bb".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn partial_block_waits_for_its_end() {
        let (_dir, path, recorder, mut poller) = setup(false);
        let (head, tail) = LEASE_A.split_at(30);

        append(&path, head);
        assert_eq!(poller.poll_once().await.unwrap(), 0);

        append(&path, tail);
        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(registered(&recorder).len(), 1);
    }

    #[tokio::test]
    async fn rewritten_file_is_read_from_start() {
        let (_dir, path, recorder, mut poller) = setup(false);

        append(&path, &format!("{LEASE_A}{LEASE_B}"));
        assert_eq!(poller.poll_once().await.unwrap(), 2);

        std::fs::write(&path, LEASE_B).unwrap();
        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(registered(&recorder).len(), 3);
    }

    #[tokio::test]
    async fn registration_errors_do_not_stop_the_batch() {
        let (_dir, path, recorder, mut poller) = setup(true);

        append(&path, &format!("{LEASE_A}{LEASE_B}"));
        assert_eq!(poller.poll_once().await.unwrap(), 2);
        assert_eq!(registered(&recorder).len(), 2);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (_dir, path, recorder, poller) = setup(false);
        append(&path, LEASE_A);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(poller.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(registered(&recorder).len(), 1);
    }
}
