//! Hosts manager editing the OS hosts file in place

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::conventions::HostFileConventions;
use crate::document::HostsDocument;
use crate::service::{parse_ip, split_hosts, HostsError, HostsService};

/// Manages the CloudOne section of a hosts file
///
/// The document is loaded once and then flushed and reloaded after every
/// change. Edits made by other programs between two changes are lost.
#[derive(Clone)]
pub struct HostsManager {
    inner: Arc<Inner>,
}

struct Inner {
    conventions: HostFileConventions,
    document: Mutex<HostsDocument>,
}

impl HostsManager {
    /// Load the hosts file at the conventions' path; the file must exist
    pub fn load(conventions: HostFileConventions) -> Result<Self, HostsError> {
        let document = read_document(&conventions.path)?;
        info!(path = %conventions.path.display(), "Loaded hosts file");
        Ok(Self {
            inner: Arc::new(Inner {
                conventions,
                document: Mutex::new(document),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.conventions.path
    }

    /// Snapshot of the in-memory document
    pub fn document(&self) -> HostsDocument {
        self.inner.document.lock().clone()
    }

    /// Bind the comma separated `hosts` to `ip` and persist the file
    pub fn add_hosts(&self, ip: &str, hosts: &str) -> Result<(), HostsError> {
        let ip = ip.trim();
        parse_ip(ip)?;
        let hosts = split_hosts(hosts);
        if hosts.is_empty() {
            return Err(HostsError::NoHosts);
        }

        let mut document = self.inner.document.lock();
        document.add(ip, &hosts, self.inner.conventions.max_hosts_per_line);
        self.flush(&mut document)?;
        debug!(ip, hosts = ?hosts, "Added hosts");
        Ok(())
    }

    /// Unbind the comma separated `hosts` from `ip` and persist the file
    pub fn remove_hosts(&self, ip: &str, hosts: &str) -> Result<(), HostsError> {
        let ip = ip.trim();
        parse_ip(ip)?;
        let hosts = split_hosts(hosts);

        let mut document = self.inner.document.lock();
        document.remove(ip, &hosts, self.inner.conventions.max_hosts_per_line);
        self.flush(&mut document)?;
        debug!(ip, hosts = ?hosts, "Removed hosts");
        Ok(())
    }

    fn flush(&self, document: &mut HostsDocument) -> Result<(), HostsError> {
        let path = &self.inner.conventions.path;
        std::fs::write(path, document.export(self.inner.conventions.eol))?;
        *document = read_document(path)?;
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<HostsDocument, HostsError> {
    let bytes = std::fs::read(path)?;
    Ok(HostsDocument::parse(&String::from_utf8_lossy(&bytes)))
}

#[async_trait]
impl HostsService for HostsManager {
    async fn add(&self, ip: &str, hosts: &str) -> Result<(), HostsError> {
        let manager = self.clone();
        let (ip, hosts) = (ip.to_string(), hosts.to_string());
        tokio::task::spawn_blocking(move || manager.add_hosts(&ip, &hosts)).await?
    }

    async fn remove(&self, ip: &str, hosts: &str) -> Result<(), HostsError> {
        let manager = self.clone();
        let (ip, hosts) = (ip.to_string(), hosts.to_string());
        tokio::task::spawn_blocking(move || manager.remove_hosts(&ip, &hosts)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    fn setup(content: &str) -> (TempDir, HostsManager) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, content).unwrap();
        let conventions = HostFileConventions::posix().with_path(&path.to_string_lossy());
        let manager = HostsManager::load(conventions).unwrap();
        (dir, manager)
    }

    fn read(manager: &HostsManager) -> String {
        std::fs::read_to_string(manager.path()).unwrap()
    }

    fn mapping(document: &HostsDocument) -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in document.owned() {
            map.entry(entry.ip.clone())
                .or_default()
                .extend(entry.hosts.iter().cloned());
        }
        map
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let conventions =
            HostFileConventions::posix().with_path(&dir.path().join("nope").to_string_lossy());
        assert!(matches!(HostsManager::load(conventions), Err(HostsError::Io(_))));
    }

    #[test]
    fn test_add_to_empty_file() {
        let (_dir, manager) = setup("");
        manager.add_hosts("172.18.0.22", "storage.local").unwrap();
        assert_eq!(
            read(&manager),
            "# Added by CloudOne\n172.18.0.22 storage.local\n# End of CloudOne section\n"
        );
    }

    #[test]
    fn test_add_duplicate_hosts() {
        let (_dir, manager) = setup("");
        manager.add_hosts("172.18.0.22", "a.local,a.local").unwrap();
        let document = manager.document();
        let owned: Vec<_> = document.owned().collect();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].hosts, vec!["a.local"]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let (_dir, manager) = setup("127.0.0.1 localhost\n");
        manager.add_hosts("172.18.0.22", "b.local,a.local").unwrap();
        let once = read(&manager);
        manager.add_hosts("172.18.0.22", "b.local,a.local").unwrap();
        assert_eq!(read(&manager), once);
    }

    #[test]
    fn test_invalid_ip_does_not_touch_file() {
        let (_dir, manager) = setup("127.0.0.1 localhost\n");
        let err = manager.add_hosts("not-an-ip", "a.local").unwrap_err();
        assert!(matches!(err, HostsError::InvalidIp(_)));
        let err = manager.remove_hosts("999.0.0.1", "a.local").unwrap_err();
        assert!(matches!(err, HostsError::InvalidIp(_)));
        assert_eq!(read(&manager), "127.0.0.1 localhost\n");
    }

    #[test]
    fn test_ip_is_trimmed_before_matching() {
        let (_dir, manager) = setup("");
        manager.add_hosts(" 172.18.0.22", "a.local").unwrap();
        manager.add_hosts("172.18.0.22 ", "b.local").unwrap();

        let document = manager.document();
        assert_eq!(document.owned().count(), 1);
        assert_eq!(document.owned_hosts("172.18.0.22"), vec!["a.local", "b.local"]);

        manager.remove_hosts(" 172.18.0.22 ", "a.local,b.local").unwrap();
        assert_eq!(read(&manager), "");
    }

    #[test]
    fn test_add_requires_hosts() {
        let (_dir, manager) = setup("");
        let err = manager.add_hosts("172.18.0.22", " , ").unwrap_err();
        assert!(matches!(err, HostsError::NoHosts));
        assert_eq!(read(&manager), "");
    }

    #[test]
    fn test_host_owned_by_single_ip() {
        let (_dir, manager) = setup("");
        manager.add_hosts("172.18.0.22", "a.local,b.local").unwrap();
        manager.add_hosts("172.18.0.23", "b.local,c.local").unwrap();
        manager.remove_hosts("172.18.0.23", "c.local").unwrap();
        manager.add_hosts("172.18.0.22", "c.local").unwrap();

        let document = manager.document();
        let mut seen = BTreeSet::new();
        for entry in document.owned() {
            for host in &entry.hosts {
                assert!(seen.insert(host.clone()), "{host} owned twice");
            }
        }
        assert_eq!(document.owned_hosts("172.18.0.22"), vec!["a.local", "c.local"]);
        assert_eq!(document.owned_hosts("172.18.0.23"), vec!["b.local"]);
    }

    #[test]
    fn test_section_lifecycle() {
        let original = "127.0.0.1 localhost\n# keep me\n";
        let (_dir, manager) = setup(original);
        manager.add_hosts("172.18.0.22", "a.local,b.local").unwrap();
        assert!(read(&manager).contains("# Added by CloudOne\n"));

        manager.remove_hosts("172.18.0.22", "a.local,b.local").unwrap();
        assert_eq!(read(&manager), original);
    }

    #[test]
    fn test_reload_reproduces_mapping() {
        let (_dir, manager) = setup("::1 localhost\n");
        manager.add_hosts("172.18.0.22", "x.local,y.local").unwrap();
        manager.add_hosts("10.1.1.1", "z.local").unwrap();
        let before = mapping(&manager.document());

        let reloaded =
            HostsManager::load(HostFileConventions::posix().with_path(&manager.path().to_string_lossy()))
                .unwrap();
        assert_eq!(mapping(&reloaded.document()), before);
        assert_eq!(before.len(), 2);
    }

    #[test]
    fn test_windows_line_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, "").unwrap();
        let conventions = HostFileConventions {
            path: path.clone(),
            ..HostFileConventions::windows()
        };
        let manager = HostsManager::load(conventions).unwrap();

        let names: Vec<String> = (0..10).map(|i| format!("h{i}.local")).collect();
        manager.add_hosts("172.18.0.22", &names.join(",")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\r\n"));
        assert_eq!(manager.document().owned().count(), 2);
    }

    #[tokio::test]
    async fn test_service_trait() {
        let (_dir, manager) = setup("");
        let service: Arc<dyn HostsService> = Arc::new(manager.clone());
        service.add("172.18.0.22", "secretmanager.googleapis.local").await.unwrap();
        assert_eq!(
            manager.document().owned_hosts("172.18.0.22"),
            vec!["secretmanager.googleapis.local"]
        );
        service.remove("172.18.0.22", "secretmanager.googleapis.local").await.unwrap();
        assert!(!manager.document().has_section());
    }
}
