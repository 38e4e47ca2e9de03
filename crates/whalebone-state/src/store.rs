//! ClusterStore — file-backed persistence of cluster membership.
//!
//! Provides load/save/remove of a [`ClusterRecord`] per cluster name.
//! `save` is the only writer of the record. The host files are derived
//! from it and `load` rewrites any that disagree.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use whalebone_core::Instance;

use crate::error::{StateError, StateResult};
use crate::types::ClusterRecord;

/// Membership record, JSON.
pub const RECORD_FILE: &str = "cluster.json";
/// Public names, one per line.
pub const PUBLIC_NAMES_FILE: &str = "boxen.public";
/// Private names, one per line.
pub const PRIVATE_NAMES_FILE: &str = "boxen.private";

/// Per-cluster state rooted at a directory (normally `~/.whalebone`).
#[derive(Debug, Clone)]
pub struct ClusterStore {
    root: PathBuf,
}

impl ClusterStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StateResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StateError::io(&root, e))?;
        debug!(root = %root.display(), "cluster store opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Paths ──────────────────────────────────────────────────────

    /// Directory holding a cluster's artifacts.
    pub fn cluster_dir(&self, cluster: &str) -> StateResult<PathBuf> {
        validate_name(cluster)?;
        Ok(self.root.join(cluster))
    }

    pub fn record_path(&self, cluster: &str) -> StateResult<PathBuf> {
        Ok(self.cluster_dir(cluster)?.join(RECORD_FILE))
    }

    /// Public host list of any cluster, e.g. to ship it to another cluster.
    pub fn public_names_path(&self, cluster: &str) -> StateResult<PathBuf> {
        Ok(self.cluster_dir(cluster)?.join(PUBLIC_NAMES_FILE))
    }

    pub fn private_names_path(&self, cluster: &str) -> StateResult<PathBuf> {
        Ok(self.cluster_dir(cluster)?.join(PRIVATE_NAMES_FILE))
    }

    /// Create the cluster directory if it is missing. Idempotent.
    pub fn ensure_cluster_dir(&self, cluster: &str) -> StateResult<PathBuf> {
        let dir = self.cluster_dir(cluster)?;
        std::fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;
        Ok(dir)
    }

    // ── Read ───────────────────────────────────────────────────────

    /// Load a cluster's record. Absent clusters yield an empty record.
    pub fn load(&self, cluster: &str) -> StateResult<ClusterRecord> {
        let path = self.record_path(cluster)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ClusterRecord::empty(cluster));
            }
            Err(e) => return Err(StateError::io(&path, e)),
        };

        let record: ClusterRecord =
            serde_json::from_slice(&bytes).map_err(|e| StateError::Deserialize {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if record.cluster != cluster {
            return Err(corrupt(
                cluster,
                format!("record belongs to cluster {:?}", record.cluster),
            ));
        }
        validate_instances(cluster, &record.instances)?;
        let dir = self.cluster_dir(cluster)?;
        sync_host_file(cluster, &dir, PUBLIC_NAMES_FILE, &record.public_names())?;
        sync_host_file(cluster, &dir, PRIVATE_NAMES_FILE, &record.private_names())?;

        Ok(record)
    }

    /// Load a cluster's record, failing if it has no instances.
    pub fn load_required(&self, cluster: &str) -> StateResult<ClusterRecord> {
        let record = self.load(cluster)?;
        if record.is_empty() {
            return Err(StateError::NotFound(cluster.to_string()));
        }
        Ok(record)
    }

    // ── Write ──────────────────────────────────────────────────────

    /// Persist `instances` as the cluster's membership, replacing any
    /// previous record. Creates the cluster directory if needed.
    pub fn save(&self, cluster: &str, instances: &[Instance]) -> StateResult<ClusterRecord> {
        validate_instances(cluster, instances)?;
        let dir = self.ensure_cluster_dir(cluster)?;

        let record = ClusterRecord {
            cluster: cluster.to_string(),
            instances: instances.to_vec(),
            updated_at: epoch_secs(),
        };
        let json =
            serde_json::to_vec_pretty(&record).map_err(|e| StateError::Serialize(e.to_string()))?;

        // The record commits the save; host files left stale by an
        // interruption after this point are rewritten by the next load.
        write_atomic(&dir, &dir.join(RECORD_FILE), &json)?;
        write_atomic(&dir, &dir.join(PUBLIC_NAMES_FILE), host_file(&record.public_names()).as_bytes())?;
        write_atomic(&dir, &dir.join(PRIVATE_NAMES_FILE), host_file(&record.private_names()).as_bytes())?;

        debug!(%cluster, instances = record.len(), "cluster record saved");
        Ok(record)
    }

    /// Delete every artifact of a cluster. Returns whether a record existed.
    ///
    /// All artifacts are attempted; if any removal fails the error names
    /// each one that is still on disk. The cluster directory is kept.
    pub fn remove(&self, cluster: &str) -> StateResult<bool> {
        let dir = self.cluster_dir(cluster)?;
        let existed = dir.join(RECORD_FILE).is_file();
        let mut failed = Vec::new();

        // Record first: once it is gone the host files are inert.
        for file in [RECORD_FILE, PUBLIC_NAMES_FILE, PRIVATE_NAMES_FILE] {
            let path = dir.join(file);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(%cluster, path = %path.display(), error = %e, "failed to remove cluster artifact");
                    failed.push((path, e.to_string()));
                }
            }
        }

        if !failed.is_empty() {
            return Err(StateError::Remove {
                cluster: cluster.to_string(),
                failed,
            });
        }
        if existed {
            info!(%cluster, "cluster record removed");
        }
        Ok(existed)
    }
}

fn validate_name(cluster: &str) -> StateResult<()> {
    let bad = cluster.is_empty()
        || cluster == "."
        || cluster == ".."
        || cluster.contains(['/', '\\', '\0']);
    if bad {
        return Err(StateError::InvalidName(cluster.to_string()));
    }
    Ok(())
}

fn validate_instances(cluster: &str, instances: &[Instance]) -> StateResult<()> {
    let mut seen = HashSet::new();
    for inst in instances {
        if inst.id.is_empty() {
            return Err(corrupt(cluster, "instance with empty id".to_string()));
        }
        if !seen.insert(inst.id.as_str()) {
            return Err(corrupt(cluster, format!("duplicate instance id {}", inst.id)));
        }
        if inst.public_dns.contains('\n') || inst.private_dns.contains('\n') {
            return Err(corrupt(cluster, format!("instance {} has a multi-line name", inst.id)));
        }
    }
    Ok(())
}

fn corrupt(cluster: &str, reason: String) -> StateError {
    StateError::Corrupt {
        cluster: cluster.to_string(),
        reason,
    }
}

/// Rewrite `dir/file` from `names` unless it already matches.
fn sync_host_file(cluster: &str, dir: &Path, file: &str, names: &[String]) -> StateResult<()> {
    let path = dir.join(file);
    let expected = host_file(names);
    match std::fs::read_to_string(&path) {
        Ok(content) if content == expected => return Ok(()),
        Ok(_) => warn!(
            %cluster,
            path = %path.display(),
            "host file disagrees with the record, rewriting"
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(%cluster, path = %path.display(), "host file missing, rewriting");
        }
        Err(e) => return Err(StateError::io(&path, e)),
    }
    write_atomic(dir, &path, expected.as_bytes())
}

fn host_file(names: &[String]) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str(name);
        out.push('\n');
    }
    out
}

/// Replace `path` with `bytes` via a temp file in `dir` and a rename.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> StateResult<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StateError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StateError::io(path, e.error))?;
    Ok(())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use whalebone_core::InstanceState;

    fn test_store() -> (tempfile::TempDir, ClusterStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ClusterStore::open(dir.path().join("state")).unwrap();
        (dir, store)
    }

    fn instance(n: u32) -> Instance {
        Instance::new(
            format!("i-{n:04}"),
            InstanceState::Running,
            format!("ec2-{n}.compute.example"),
            format!("ip-10-0-0-{n}.internal"),
        )
    }

    #[test]
    fn load_absent_cluster_is_empty() {
        let (_dir, store) = test_store();
        let record = store.load("nope").unwrap();
        assert!(record.is_empty());
        assert_eq!(record.cluster, "nope");
    }

    #[test]
    fn load_required_absent_cluster_is_not_found() {
        let (_dir, store) = test_store();
        let err = store.load_required("nope").unwrap_err();
        assert!(matches!(err, StateError::NotFound(ref c) if c == "nope"));
    }

    #[test]
    fn save_then_load_keeps_triples_aligned() {
        let (_dir, store) = test_store();
        let instances: Vec<Instance> = (1..=5).map(instance).collect();
        store.save("prod", &instances).unwrap();

        let record = store.load("prod").unwrap();
        assert_eq!(record.len(), 5);
        let ids = record.ids();
        let public = record.public_names();
        let private = record.private_names();
        assert_eq!(ids.len(), public.len());
        assert_eq!(ids.len(), private.len());
        for (i, original) in instances.iter().enumerate() {
            assert_eq!(ids[i], original.id);
            assert_eq!(public[i], original.public_dns);
            assert_eq!(private[i], original.private_dns);
        }
    }

    #[test]
    fn host_files_mirror_record_order() {
        let (_dir, store) = test_store();
        store.save("prod", &[instance(2), instance(1)]).unwrap();

        let public = std::fs::read_to_string(store.public_names_path("prod").unwrap()).unwrap();
        assert_eq!(public, "ec2-2.compute.example\nec2-1.compute.example\n");
        let private = std::fs::read_to_string(store.private_names_path("prod").unwrap()).unwrap();
        assert_eq!(private, "ip-10-0-0-2.internal\nip-10-0-0-1.internal\n");
    }

    #[test]
    fn pending_instances_keep_their_slot() {
        let (_dir, store) = test_store();
        let pending = Instance::new("i-9", InstanceState::Pending, "", "");
        store.save("prod", &[instance(1), pending]).unwrap();

        let record = store.load("prod").unwrap();
        assert_eq!(record.public_names(), vec!["ec2-1.compute.example", ""]);
    }

    #[test]
    fn save_overwrites_previous_record() {
        let (_dir, store) = test_store();
        store.save("prod", &[instance(1), instance(2), instance(3)]).unwrap();
        store.save("prod", &[instance(7)]).unwrap();

        let record = store.load("prod").unwrap();
        assert_eq!(record.ids(), vec!["i-0007"]);
    }

    #[test]
    fn save_rejects_duplicate_ids() {
        let (_dir, store) = test_store();
        let err = store.save("prod", &[instance(1), instance(1)]).unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
        assert!(store.load("prod").unwrap().is_empty());
    }

    #[test]
    fn host_file_from_an_interrupted_save_is_rewritten() {
        let (_dir, store) = test_store();
        let pending = |id: &str| Instance::new(id, InstanceState::Pending, "", "");
        store.save("c", &[pending("i-1"), pending("i-2")]).unwrap();

        // A later save got as far as replacing one host file.
        let dir = store.cluster_dir("c").unwrap();
        write_atomic(&dir, &store.public_names_path("c").unwrap(), b"ec2-1\nec2-2\n").unwrap();

        let record = store.load("c").unwrap();
        assert_eq!(record.ids(), vec!["i-1", "i-2"]);
        let public = std::fs::read_to_string(store.public_names_path("c").unwrap()).unwrap();
        assert_eq!(public, "\n\n");
    }

    #[test]
    fn short_host_file_is_rewritten() {
        let (_dir, store) = test_store();
        store.save("prod", &[instance(1), instance(2)]).unwrap();
        std::fs::write(store.private_names_path("prod").unwrap(), "only-one\n").unwrap();

        let record = store.load("prod").unwrap();
        let private = std::fs::read_to_string(store.private_names_path("prod").unwrap()).unwrap();
        assert_eq!(private.lines().collect::<Vec<_>>(), record.private_names());
    }

    #[test]
    fn missing_host_file_is_rewritten() {
        let (_dir, store) = test_store();
        store.save("prod", &[instance(1)]).unwrap();
        std::fs::remove_file(store.public_names_path("prod").unwrap()).unwrap();

        assert_eq!(store.load("prod").unwrap().len(), 1);
        let public = std::fs::read_to_string(store.public_names_path("prod").unwrap()).unwrap();
        assert_eq!(public, "ec2-1.compute.example\n");
    }

    #[test]
    fn duplicate_ids_in_the_record_are_corrupt() {
        let (_dir, store) = test_store();
        store.ensure_cluster_dir("prod").unwrap();
        let record = ClusterRecord {
            cluster: "prod".to_string(),
            instances: vec![instance(1), instance(1)],
            updated_at: 0,
        };
        std::fs::write(
            store.record_path("prod").unwrap(),
            serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();

        assert!(matches!(store.load("prod"), Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn garbage_record_fails_to_deserialize() {
        let (_dir, store) = test_store();
        store.ensure_cluster_dir("prod").unwrap();
        std::fs::write(store.record_path("prod").unwrap(), b"{not json").unwrap();

        assert!(matches!(store.load("prod"), Err(StateError::Deserialize { .. })));
    }

    #[test]
    fn remove_deletes_all_artifacts() {
        let (_dir, store) = test_store();
        store.save("prod", &[instance(1)]).unwrap();

        assert!(store.remove("prod").unwrap());
        assert!(!store.record_path("prod").unwrap().exists());
        assert!(!store.public_names_path("prod").unwrap().exists());
        assert!(!store.private_names_path("prod").unwrap().exists());
        assert!(store.cluster_dir("prod").unwrap().is_dir());
        assert!(store.load("prod").unwrap().is_empty());
    }

    #[test]
    fn remove_absent_cluster_is_noop() {
        let (_dir, store) = test_store();
        assert!(!store.remove("ghost").unwrap());
        assert!(!store.remove("ghost").unwrap());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, store) = test_store();
        store.save("prod", &[instance(1)]).unwrap();
        store.save("prod", &[instance(2)]).unwrap();

        let mut names: Vec<String> = std::fs::read_dir(store.cluster_dir("prod").unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![PRIVATE_NAMES_FILE, PUBLIC_NAMES_FILE, RECORD_FILE]);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let (_dir, store) = test_store();
        for name in ["", ".", "..", "a/b"] {
            assert!(matches!(store.cluster_dir(name), Err(StateError::InvalidName(_))));
        }
    }
}
