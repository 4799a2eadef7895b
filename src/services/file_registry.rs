//! Node registry kept in plain text files.
//!
//! Layout under the data directory:
//!
//! - `nodes.txt`: `node_id,mac,discovered,boot_profile,ip,last_seen`.
//!   Rows with an empty `node_id` are IP observations of unknown machines.
//! - `tasks.txt`: `node_id,profile`, one active task per node.
//! - `profiles/<name>.ipxe`: boot profiles a task may request.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

// File locking
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use super::{BootSettings, IpRegistration, Node, NodeLookup, NodeStore, TaskProtocol};
use crate::domain::NodeId;
use crate::error::ServiceError;

const NODES_FILE: &str = "nodes.txt";
const TASKS_FILE: &str = "tasks.txt";
const PROFILES_DIR: &str = "profiles";
const PROFILE_EXTENSION: &str = "ipxe";

/// One row of `nodes.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub node_id: String,
    pub mac: String,
    pub discovered: bool,
    pub boot_profile: String,
    pub ip: Option<Ipv4Addr>,
    pub last_seen: DateTime<Utc>,
}

impl NodeEntry {
    /// A machine we have only seen on the wire.
    pub fn observed(mac: &str, ip: Ipv4Addr) -> Self {
        Self {
            node_id: String::new(),
            mac: normalize_mac(mac),
            discovered: false,
            boot_profile: String::new(),
            ip: Some(ip),
            last_seen: Utc::now(),
        }
    }

    /// Parse a NodeEntry from a CSV line.
    pub fn from_csv_line(line: &str) -> Result<Self, ServiceError> {
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 6 {
            return Err(ServiceError::Corrupt(format!("invalid node line: {}", line)));
        }

        let discovered = parts[2]
            .parse()
            .map_err(|_| ServiceError::Corrupt(format!("invalid discovered flag: {}", parts[2])))?;

        let ip = match parts[4] {
            "" => None,
            ip => Some(
                ip.parse()
                    .map_err(|_| ServiceError::Corrupt(format!("invalid IP address: {}", ip)))?,
            ),
        };

        let last_seen = DateTime::parse_from_rfc3339(parts[5])
            .map_err(|_| ServiceError::Corrupt(format!("invalid timestamp: {}", parts[5])))?
            .with_timezone(&Utc);

        Ok(Self {
            node_id: parts[0].to_string(),
            mac: normalize_mac(parts[1]),
            discovered,
            boot_profile: parts[3].to_string(),
            ip,
            last_seen,
        })
    }

    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.node_id,
            self.mac,
            self.discovered,
            self.boot_profile,
            self.ip.map(|ip| ip.to_string()).unwrap_or_default(),
            self.last_seen.to_rfc3339()
        )
    }

    /// The registered node behind this row, if it is one.
    fn to_node(&self) -> Option<Node> {
        if self.node_id.is_empty() {
            return None;
        }
        Some(Node {
            id: NodeId::new(self.node_id.clone()),
            discovered: self.discovered,
            boot_settings: (!self.boot_profile.is_empty()).then(|| BootSettings {
                profile: self.boot_profile.clone(),
            }),
        })
    }
}

/// One row of `tasks.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskEntry {
    node_id: String,
    profile: String,
}

impl TaskEntry {
    fn from_csv_line(line: &str) -> Result<Self, ServiceError> {
        match line.split_once(',') {
            Some((node_id, profile)) if !node_id.is_empty() && !profile.contains(',') => Ok(Self {
                node_id: node_id.to_string(),
                profile: profile.to_string(),
            }),
            _ => Err(ServiceError::Corrupt(format!("invalid task line: {}", line))),
        }
    }
}

/// Normalize a MAC address to lowercase
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_lowercase()
}

/// Acquire an exclusive lock on a file (Unix only)
#[cfg(unix)]
fn lock_file_exclusive(file: &File) -> Result<(), ServiceError> {
    use libc::{flock, LOCK_EX};
    let fd = file.as_raw_fd();
    let result = unsafe { flock(fd, LOCK_EX) };
    if result != 0 {
        return Err(ServiceError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Acquire a shared lock on a file (Unix only)
#[cfg(unix)]
fn lock_file_shared(file: &File) -> Result<(), ServiceError> {
    use libc::{flock, LOCK_SH};
    let fd = file.as_raw_fd();
    let result = unsafe { flock(fd, LOCK_SH) };
    if result != 0 {
        return Err(ServiceError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Release a file lock (Unix only)
#[cfg(unix)]
fn unlock_file(file: &File) -> Result<(), ServiceError> {
    use libc::{flock, LOCK_UN};
    let fd = file.as_raw_fd();
    let result = unsafe { flock(fd, LOCK_UN) };
    if result != 0 {
        return Err(ServiceError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// No-op lock for non-Unix platforms
#[cfg(not(unix))]
fn lock_file_exclusive(_file: &File) -> Result<(), ServiceError> {
    Ok(())
}

/// No-op shared lock for non-Unix platforms
#[cfg(not(unix))]
fn lock_file_shared(_file: &File) -> Result<(), ServiceError> {
    Ok(())
}

/// No-op unlock for non-Unix platforms
#[cfg(not(unix))]
fn unlock_file(_file: &File) -> Result<(), ServiceError> {
    Ok(())
}

/// Read every non-empty line of `reader` through `parse`.
fn read_lines<R, T, F>(reader: R, parse: F) -> Result<Vec<T>, ServiceError>
where
    R: BufRead,
    F: Fn(&str) -> Result<T, ServiceError>,
{
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        entries.push(parse(line)?);
    }
    Ok(entries)
}

/// Read `path` under a shared lock so a concurrent rewrite is never seen
/// half done. A missing file reads as empty.
fn read_locked<T, F>(path: &Path, parse: F) -> Result<Vec<T>, ServiceError>
where
    F: Fn(&str) -> Result<T, ServiceError>,
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    lock_file_shared(&file)?;
    let entries = read_lines(BufReader::new(&file), parse);
    unlock_file(&file)?;
    entries
}

/// File-backed implementation of every collaborator trait.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    data_dir: PathBuf,
}

impl FileRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn nodes_path(&self) -> PathBuf {
        self.data_dir.join(NODES_FILE)
    }

    fn tasks_path(&self) -> PathBuf {
        self.data_dir.join(TASKS_FILE)
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.data_dir
            .join(PROFILES_DIR)
            .join(format!("{}.{}", name, PROFILE_EXTENSION))
    }

    /// Ensure the data directory exists
    pub fn ensure_data_dir(&self) -> Result<(), ServiceError> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Read node entries from nodes.txt
    pub fn read_nodes(&self) -> Result<Vec<NodeEntry>, ServiceError> {
        read_locked(&self.nodes_path(), NodeEntry::from_csv_line)
    }

    fn read_tasks(&self) -> Result<Vec<TaskEntry>, ServiceError> {
        read_locked(&self.tasks_path(), TaskEntry::from_csv_line)
    }

    /// Read and rewrite nodes.txt under an exclusive lock.
    pub fn with_nodes<F, T>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Vec<NodeEntry>) -> Result<T, ServiceError>,
    {
        self.ensure_data_dir()?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.nodes_path())?;

        lock_file_exclusive(&file)?;

        let mut entries = read_lines(BufReader::new(&file), NodeEntry::from_csv_line)?;
        let result = f(&mut entries)?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        {
            let mut writer = BufWriter::new(&file);
            for entry in &entries {
                writeln!(writer, "{}", entry.to_csv_line())?;
            }
            writer.flush()?;
        }

        unlock_file(&file)?;

        Ok(result)
    }

    pub fn find_node_by_mac(&self, mac: &str) -> Result<Node, ServiceError> {
        let mac = normalize_mac(mac);
        self.read_nodes()?
            .iter()
            .filter(|e| e.mac == mac)
            .find_map(NodeEntry::to_node)
            .ok_or_else(|| ServiceError::NotFound(mac.clone()))
    }

    pub fn find_node_by_id(&self, node_id: &NodeId) -> Result<Node, ServiceError> {
        self.read_nodes()?
            .iter()
            .filter(|e| e.node_id == node_id.as_str())
            .find_map(NodeEntry::to_node)
            .ok_or_else(|| ServiceError::NotFound(node_id.to_string()))
    }

    /// Record that `mac` currently holds `ip`.
    ///
    /// The address is taken away from any other row that still claims it.
    pub fn record_ip(&self, ip: Ipv4Addr, mac: &str) -> Result<(), ServiceError> {
        let mac = normalize_mac(mac);
        self.with_nodes(|entries| {
            for entry in entries.iter_mut() {
                if entry.mac != mac && entry.ip == Some(ip) {
                    entry.ip = None;
                }
            }

            match entries.iter_mut().find(|e| e.mac == mac) {
                Some(entry) => {
                    entry.ip = Some(ip);
                    entry.last_seen = Utc::now();
                }
                None => entries.push(NodeEntry::observed(&mac, ip)),
            }
            Ok(())
        })
    }

    /// The profile of the node's active task.
    fn active_task(&self, node_id: &NodeId) -> Result<String, ServiceError> {
        self.read_tasks()?
            .into_iter()
            .find(|t| t.node_id == node_id.as_str())
            .map(|t| t.profile)
            .ok_or_else(|| ServiceError::NotFound(format!("active task for {}", node_id)))
    }

    pub fn profile_exists(&self, name: &str) -> bool {
        self.profile_path(name).exists()
    }

    /// Run blocking file work off the async executor.
    async fn blocking<T, F>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(FileRegistry) -> Result<T, ServiceError> + Send + 'static,
        T: Send + 'static,
    {
        let registry = self.clone();
        tokio::task::spawn_blocking(move || f(registry))
            .await
            .map_err(|e| ServiceError::Unavailable(format!("registry task failed: {}", e)))?
    }
}

#[async_trait]
impl NodeLookup for FileRegistry {
    async fn node_by_mac(&self, mac: &str) -> Result<Node, ServiceError> {
        let mac = mac.to_string();
        self.blocking(move |r| r.find_node_by_mac(&mac)).await
    }

    async fn register_ip(&self, ip: Ipv4Addr, mac: &str) -> Result<IpRegistration, ServiceError> {
        let mac = mac.to_string();
        self.blocking(move |r| r.record_ip(ip, &mac)).await?;
        debug!(%ip, "Recorded IP address");
        Ok(IpRegistration::Recorded)
    }
}

#[async_trait]
impl TaskProtocol for FileRegistry {
    async fn active_task_exists(&self, node_id: &NodeId) -> Result<(), ServiceError> {
        let node_id = node_id.clone();
        self.blocking(move |r| r.active_task(&node_id).map(|_| ())).await
    }

    async fn request_boot_profile(&self, node_id: &NodeId) -> Result<String, ServiceError> {
        let node_id = node_id.clone();
        self.blocking(move |r| {
            let profile = r.active_task(&node_id)?;
            if !r.profile_exists(&profile) {
                return Err(ServiceError::NotFound(format!("profile {}", profile)));
            }
            Ok(format!("{}.{}", profile, PROFILE_EXTENSION))
        })
        .await
    }
}

#[async_trait]
impl NodeStore for FileRegistry {
    async fn find_by_identifier(&self, node_id: &NodeId) -> Result<Node, ServiceError> {
        let node_id = node_id.clone();
        self.blocking(move |r| r.find_node_by_id(&node_id)).await
    }
}
