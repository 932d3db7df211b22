//! Storage volume enumeration and volume identifiers.
//!
//! Volume discovery is not thread safe on every platform, so it is only
//! ever performed on the thread that created the [`MainThreadDispatcher`].
//! Other threads send a request and block until the owner answers it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use xxhash_rust::xxh3::xxh3_64;

/// One mounted (or known) storage volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolidVolumeInfo {
    /// Mount point
    pub path: PathBuf,
    pub uuid: Option<String>,
    pub label: Option<String>,
    pub is_removable: bool,
    pub is_optical_disc: bool,
    pub is_mounted: bool,
}

/// Source of the volume list.
pub trait VolumeProvider: Send + Sync {
    fn volumes(&self) -> Vec<SolidVolumeInfo>;
}

/// Shared reference to a VolumeProvider implementation.
pub type SharedVolumeProvider = Arc<dyn VolumeProvider>;

/// Volumes as reported by the operating system.
#[derive(Debug, Default)]
pub struct SysinfoVolumeProvider;

impl SysinfoVolumeProvider {
    pub fn new() -> Self {
        Self
    }

    /// Map of canonical device path to link name in a `/dev/disk/by-*` dir
    fn device_links(dir: &Path) -> HashMap<PathBuf, String> {
        let mut links = HashMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return links,
        };
        for entry in entries.flatten() {
            if let Ok(target) = std::fs::canonicalize(entry.path()) {
                let name = unescape_udev(&entry.file_name().to_string_lossy());
                links.insert(target, name);
            }
        }
        links
    }
}

/// udev escapes blanks and slashes in labels as `\x20` etc.
fn unescape_udev(name: &str) -> String {
    let raw = name.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && raw.get(i + 1) == Some(&b'x') {
            let decoded = raw
                .get(i + 2..i + 4)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                bytes.push(byte);
                i += 4;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    // Labels are UTF-8 split into escaped bytes
    String::from_utf8_lossy(&bytes).into_owned()
}

impl VolumeProvider for SysinfoVolumeProvider {
    fn volumes(&self) -> Vec<SolidVolumeInfo> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        let uuids = Self::device_links(Path::new("/dev/disk/by-uuid"));
        let labels = Self::device_links(Path::new("/dev/disk/by-label"));

        disks
            .list()
            .iter()
            .map(|disk| {
                let device = std::fs::canonicalize(disk.name())
                    .unwrap_or_else(|_| PathBuf::from(disk.name()));
                let file_system = disk.file_system().to_string_lossy().to_lowercase();

                SolidVolumeInfo {
                    path: disk.mount_point().to_path_buf(),
                    uuid: uuids.get(&device).cloned(),
                    label: labels.get(&device).cloned(),
                    is_removable: disk.is_removable(),
                    is_optical_disc: file_system == "iso9660" || file_system == "udf",
                    is_mounted: true,
                }
            })
            .collect()
    }
}

/// Fixed volume list, replaceable at runtime to simulate plug events.
#[derive(Debug, Default)]
pub struct StaticVolumeProvider {
    volumes: Mutex<Vec<SolidVolumeInfo>>,
}

impl StaticVolumeProvider {
    pub fn new(volumes: Vec<SolidVolumeInfo>) -> Self {
        Self {
            volumes: Mutex::new(volumes),
        }
    }

    pub fn set_volumes(&self, volumes: Vec<SolidVolumeInfo>) {
        *self.volumes.lock() = volumes;
    }
}

impl VolumeProvider for StaticVolumeProvider {
    fn volumes(&self) -> Vec<SolidVolumeInfo> {
        self.volumes.lock().clone()
    }
}

/// Request for the owner thread to enumerate volumes.
pub(crate) struct VolumeRequest {
    reply: Sender<Vec<SolidVolumeInfo>>,
}

/// Runs volume enumeration on its owner thread.
pub struct MainThreadDispatcher {
    provider: SharedVolumeProvider,
    owner: ThreadId,
    tx: Sender<VolumeRequest>,
    rx: Receiver<VolumeRequest>,
    timeout: Duration,
}

impl MainThreadDispatcher {
    /// The calling thread becomes the owner.
    pub fn new(provider: SharedVolumeProvider) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            provider,
            owner: std::thread::current().id(),
            tx,
            rx,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_owner_thread(&self) -> bool {
        std::thread::current().id() == self.owner
    }

    /// Enumerate volumes, marshalling to the owner thread when needed.
    ///
    /// Returns `None` when the owner did not answer within the timeout.
    pub fn volumes(&self) -> Option<Vec<SolidVolumeInfo>> {
        if self.is_owner_thread() {
            return Some(self.provider.volumes());
        }

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        if self.tx.send(VolumeRequest { reply: reply_tx }).is_err() {
            return None;
        }

        match reply_rx.recv_timeout(self.timeout) {
            Ok(volumes) => Some(volumes),
            Err(_) => {
                tracing::warn!("owner thread did not answer volume enumeration request");
                None
            }
        }
    }

    /// Answer all pending requests. Call from the owner thread.
    pub fn pump(&self) -> usize {
        let mut handled = 0;
        while let Ok(request) = self.rx.try_recv() {
            let _ = request.reply.send(self.provider.volumes());
            handled += 1;
        }
        handled
    }

    /// Receiver side, so the owner can select on it while blocked elsewhere
    pub(crate) fn requests(&self) -> &Receiver<VolumeRequest> {
        &self.rx
    }

    pub(crate) fn answer(&self, request: VolumeRequest) {
        let _ = request.reply.send(self.provider.volumes());
    }
}

/// Shared reference to the dispatcher.
pub type SharedDispatcher = Arc<MainThreadDispatcher>;

// ---------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------

/// Parsed album root identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeIdentifier {
    Uuid(String),
    Label {
        label: String,
        directory_hash: Option<String>,
    },
    Path(String),
    NetworkShare(String),
}

impl VolumeIdentifier {
    pub fn parse(identifier: &str) -> Option<Self> {
        let (scheme, query) = identifier.split_once(":?")?;
        let params: HashMap<String, String> = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), decode_component(v)))
            .collect();

        match scheme {
            "volumeid" => {
                if let Some(uuid) = params.get("uuid") {
                    Some(VolumeIdentifier::Uuid(uuid.clone()))
                } else if let Some(label) = params.get("label") {
                    Some(VolumeIdentifier::Label {
                        label: label.clone(),
                        directory_hash: params.get("directoryhash").cloned(),
                    })
                } else {
                    params.get("path").map(|p| VolumeIdentifier::Path(p.clone()))
                }
            }
            "networkshareid" => params
                .get("mountpath")
                .map(|p| VolumeIdentifier::NetworkShare(p.clone())),
            _ => None,
        }
    }

    pub fn to_identifier_string(&self) -> String {
        match self {
            VolumeIdentifier::Uuid(uuid) => format!("volumeid:?uuid={}", encode_component(uuid)),
            VolumeIdentifier::Label {
                label,
                directory_hash: Some(hash),
            } => format!(
                "volumeid:?label={}&directoryhash={}",
                encode_component(label),
                hash
            ),
            VolumeIdentifier::Label {
                label,
                directory_hash: None,
            } => format!("volumeid:?label={}", encode_component(label)),
            VolumeIdentifier::Path(path) => format!("volumeid:?path={}", encode_component(path)),
            VolumeIdentifier::NetworkShare(path) => {
                format!("networkshareid:?mountpath={}", encode_component(path))
            }
        }
    }
}

fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' | '&' | '=' | '?' | '#' => out.push_str(&format!("%{:02X}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

fn decode_component(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Hash of the sorted top-level entry names of a directory.
///
/// Tells apart discs that share a label.
pub fn directory_hash(path: &Path) -> Option<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .ok()?
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Some(format!("{:016x}", xxh3_64(names.join("\n").as_bytes())))
}

/// Best identifier for a volume: UUID, then label (plus directory hash
/// for optical discs), then the mount path.
pub fn volume_identifier(volume: &SolidVolumeInfo) -> VolumeIdentifier {
    if let Some(uuid) = volume.uuid.as_ref().filter(|u| !u.is_empty()) {
        return VolumeIdentifier::Uuid(uuid.clone());
    }

    if let Some(label) = volume.label.as_ref().filter(|l| !l.is_empty()) {
        let directory_hash = if volume.is_optical_disc {
            directory_hash(&volume.path)
        } else {
            None
        };
        return VolumeIdentifier::Label {
            label: label.clone(),
            directory_hash,
        };
    }

    VolumeIdentifier::Path(volume.path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn volume(path: &Path) -> SolidVolumeInfo {
        SolidVolumeInfo {
            path: path.to_path_buf(),
            is_mounted: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_uuid_preferred_over_label() {
        let mut v = volume(Path::new("/media/disk"));
        v.uuid = Some("1234-ABCD".to_string());
        v.label = Some("Photos".to_string());

        let id = volume_identifier(&v);
        assert_eq!(id, VolumeIdentifier::Uuid("1234-ABCD".to_string()));
        assert_eq!(id.to_identifier_string(), "volumeid:?uuid=1234-ABCD");
    }

    #[test]
    fn test_optical_disc_embeds_directory_hash() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("DCIM")).unwrap();
        fs::write(temp_dir.path().join("readme.txt"), b"x").unwrap();

        let mut v = volume(temp_dir.path());
        v.label = Some("HOLIDAY".to_string());
        v.is_optical_disc = true;

        let id = volume_identifier(&v).to_identifier_string();
        let hash = directory_hash(temp_dir.path()).unwrap();
        assert_eq!(id, format!("volumeid:?label=HOLIDAY&directoryhash={}", hash));

        v.is_optical_disc = false;
        assert_eq!(volume_identifier(&v).to_identifier_string(), "volumeid:?label=HOLIDAY");
    }

    #[test]
    fn test_directory_hash_depends_on_listing() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::write(a.path().join("one"), b"").unwrap();
        fs::write(b.path().join("one"), b"").unwrap();
        assert_eq!(directory_hash(a.path()), directory_hash(b.path()));

        fs::write(b.path().join("two"), b"").unwrap();
        assert_ne!(directory_hash(a.path()), directory_hash(b.path()));
    }

    #[test]
    fn test_path_fallback_and_parse() {
        let v = volume(Path::new("/mnt/a&b"));
        let id = volume_identifier(&v);
        let text = id.to_identifier_string();
        assert_eq!(text, "volumeid:?path=/mnt/a%26b");
        assert_eq!(VolumeIdentifier::parse(&text), Some(id));

        assert_eq!(
            VolumeIdentifier::parse("networkshareid:?mountpath=/net/share"),
            Some(VolumeIdentifier::NetworkShare("/net/share".to_string()))
        );
        assert_eq!(VolumeIdentifier::parse("garbage"), None);
    }

    #[test]
    fn test_dispatcher_marshals_to_owner() {
        let provider = Arc::new(StaticVolumeProvider::new(vec![volume(Path::new("/data"))]));
        let dispatcher = Arc::new(MainThreadDispatcher::new(provider));

        let worker = {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || dispatcher.volumes())
        };

        // Owner thread pumps until the worker's request was answered
        let mut handled = 0;
        while handled == 0 {
            handled = dispatcher.pump();
            std::thread::sleep(Duration::from_millis(5));
        }

        let volumes = worker.join().unwrap().unwrap();
        assert_eq!(volumes[0].path, PathBuf::from("/data"));
    }

    #[test]
    fn test_unescape_udev() {
        assert_eq!(unescape_udev(r"My\x20Disk"), "My Disk");
        assert_eq!(unescape_udev(r"Fotos\x20M\xc3\xbcnchen"), "Fotos München");
        assert_eq!(unescape_udev(r"bad\xZZ"), r"bad\xZZ");
    }
}
