//! Removal of agent binaries no pod references anymore
//!
//! Layout per tenant under the root directory:
//!
//! ```text
//! {root}/{tenant}/bin/{version}/...       installed agent payload
//! {root}/{tenant}/gc/{version}/{pod}      one marker per pod using the version
//! ```
//!
//! A version is removed when it is not the latest one and its marker
//! directory is empty. Markers are written by the provisioning path; the
//! collector only reads them.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::fs::Filesystem;

/// Directory holding installed agent versions
pub const BINARY_DIR: &str = "bin";

/// Directory holding per-version pod reference markers
pub const REFERENCE_DIR: &str = "gc";

/// What one sweep did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Versions whose binary and marker directories were both removed
    pub removed: Vec<String>,
    /// Paths that could not be removed
    pub failed_paths: Vec<PathBuf>,
}

/// Sweeps unused agent versions of a tenant
pub struct BinaryGarbageCollector {
    root: PathBuf,
    fs: Arc<dyn Filesystem>,
}

impl BinaryGarbageCollector {
    /// Create a collector for the tree under `root`
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn Filesystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    /// Remove every version of `tenant` that is neither `latest` nor in use
    ///
    /// Never fails: unreadable marker directories keep their version, and a
    /// failed removal is recorded without stopping the sweep.
    pub fn collect(&self, tenant: &str, latest: &str) -> GcReport {
        let mut report = GcReport::default();
        if !is_single_component(tenant) {
            warn!(tenant = %tenant, "tenant is not a plain directory name, skipping");
            return report;
        }
        let tenant_dir = self.root.join(tenant);
        let references_base = tenant_dir.join(REFERENCE_DIR);

        let versions = match self.fs.read_dir(&references_base) {
            Ok(versions) => versions,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %references_base.display(), "no version references, skipping");
                return report;
            }
            Err(e) => {
                warn!(
                    path = %references_base.display(),
                    error = %e,
                    "failed to list version references"
                );
                return report;
            }
        };

        for version in versions {
            if version == latest {
                debug!(version = %version, "skipped, is latest");
                continue;
            }

            let references = references_base.join(&version);
            if self.in_use(&references, &version) {
                continue;
            }

            let binary = tenant_dir.join(BINARY_DIR).join(&version);
            info!(version = %version, path = %binary.display(), "deleting unused version");

            let mut complete = true;
            for path in [binary, references] {
                if let Err(e) = self.fs.remove_all(&path) {
                    warn!(path = %path.display(), error = %e, "delete failed");
                    report.failed_paths.push(path);
                    complete = false;
                }
            }
            if complete {
                report.removed.push(version);
            }
        }

        report
    }

    /// Whether a version still has pod markers; unreadable counts as in use
    fn in_use(&self, references: &Path, version: &str) -> bool {
        match self.fs.read_dir(references) {
            Ok(markers) if markers.is_empty() => false,
            Ok(markers) => {
                debug!(version = %version, references = markers.len(), "skipped, in use");
                true
            }
            Err(e) => {
                debug!(version = %version, error = %e, "skipped, failed to get references");
                true
            }
        }
    }
}

/// Whether `tenant` names exactly one directory directly under the root
fn is_single_component(tenant: &str) -> bool {
    let mut components = Path::new(tenant).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::fs::OsFilesystem;

    const TENANT: &str = "abc12345";

    /// Installs `versions` and gives each listed pod markers
    fn install(root: &Path, versions: &[&str], markers: &[(&str, &str)]) {
        for version in versions {
            let bin = root.join(TENANT).join(BINARY_DIR).join(version);
            OsFilesystem.create_dir_all(&bin).expect("bin dir");
            std::fs::write(bin.join("agent.so"), b"payload").expect("payload");
            OsFilesystem
                .create_dir_all(&root.join(TENANT).join(REFERENCE_DIR).join(version))
                .expect("gc dir");
        }
        for (version, pod) in markers {
            let marker = root.join(TENANT).join(REFERENCE_DIR).join(version).join(pod);
            std::fs::write(marker, b"").expect("marker");
        }
    }

    fn exists(root: &Path, dir: &str, version: &str) -> bool {
        root.join(TENANT).join(dir).join(version).exists()
    }

    /// Delegates to the real filesystem but fails removal of chosen paths
    struct FailingRemove {
        fail: Vec<PathBuf>,
    }

    impl Filesystem for FailingRemove {
        fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
            OsFilesystem.read_dir(path)
        }

        fn remove_all(&self, path: &Path) -> io::Result<()> {
            if self.fail.iter().any(|p| p == path) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            OsFilesystem.remove_all(path)
        }

        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            OsFilesystem.create_dir_all(path)
        }
    }

    #[test]
    fn removes_only_unreferenced_old_versions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        install(root, &["1", "2", "3"], &[("3", "pod-a")]);

        let gc = BinaryGarbageCollector::new(root, Arc::new(OsFilesystem));
        let report = gc.collect(TENANT, "2");

        assert_eq!(report.removed, vec!["1".to_string()]);
        assert!(report.failed_paths.is_empty());
        assert!(!exists(root, BINARY_DIR, "1"));
        assert!(!exists(root, REFERENCE_DIR, "1"));
        assert!(exists(root, BINARY_DIR, "2"));
        assert!(exists(root, BINARY_DIR, "3"));
        assert!(exists(root, REFERENCE_DIR, "3"));
    }

    #[test]
    fn missing_tenant_tree_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gc = BinaryGarbageCollector::new(dir.path(), Arc::new(OsFilesystem));

        assert_eq!(gc.collect(TENANT, "2"), GcReport::default());
    }

    #[test]
    fn second_sweep_finds_nothing_more() {
        let dir = tempfile::tempdir().expect("tempdir");
        install(dir.path(), &["1", "2"], &[]);
        let gc = BinaryGarbageCollector::new(dir.path(), Arc::new(OsFilesystem));

        assert_eq!(gc.collect(TENANT, "2").removed, vec!["1".to_string()]);
        assert_eq!(gc.collect(TENANT, "2"), GcReport::default());
    }

    #[test]
    fn failed_removal_does_not_stop_the_sweep() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        install(root, &["1", "2", "3"], &[]);
        let blocked = root.join(TENANT).join(REFERENCE_DIR).join("1");

        let gc = BinaryGarbageCollector::new(
            root,
            Arc::new(FailingRemove {
                fail: vec![blocked.clone()],
            }),
        );
        let report = gc.collect(TENANT, "2");

        assert_eq!(report.failed_paths, vec![blocked]);
        assert_eq!(report.removed, vec!["3".to_string()]);
        assert!(!exists(root, BINARY_DIR, "1"));
        assert!(exists(root, REFERENCE_DIR, "1"));
        assert!(!exists(root, BINARY_DIR, "3"));
        assert!(!exists(root, REFERENCE_DIR, "3"));
    }

    #[test]
    fn unreadable_references_keep_the_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        install(root, &["2"], &[]);
        OsFilesystem
            .create_dir_all(&root.join(TENANT).join(BINARY_DIR).join("4"))
            .expect("bin dir");
        // a plain file where the marker directory should be cannot be listed
        std::fs::write(root.join(TENANT).join(REFERENCE_DIR).join("4"), b"").expect("file");

        let gc = BinaryGarbageCollector::new(root, Arc::new(OsFilesystem));
        let report = gc.collect(TENANT, "2");

        assert!(report.removed.is_empty());
        assert!(exists(root, BINARY_DIR, "4"));
    }

    /// Lays out an unreferenced version "1" directly under `base`
    fn install_untenanted(base: &Path) {
        let bin = base.join(BINARY_DIR).join("1");
        OsFilesystem.create_dir_all(&bin).expect("bin dir");
        std::fs::write(bin.join("precious"), b"payload").expect("payload");
        OsFilesystem
            .create_dir_all(&base.join(REFERENCE_DIR).join("1"))
            .expect("gc dir");
    }

    #[test]
    fn absolute_tenant_cannot_reach_outside_the_root() {
        let root = tempfile::tempdir().expect("root");
        let outside = tempfile::tempdir().expect("outside");
        install_untenanted(outside.path());
        let tenant = outside.path().to_str().expect("utf-8 path");

        let gc = BinaryGarbageCollector::new(root.path(), Arc::new(OsFilesystem));

        assert_eq!(gc.collect(tenant, "2"), GcReport::default());
        assert!(outside.path().join(BINARY_DIR).join("1").join("precious").exists());
        assert!(outside.path().join(REFERENCE_DIR).join("1").exists());
    }

    #[test]
    fn parent_tenant_cannot_climb_out_of_the_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("csi");
        OsFilesystem.create_dir_all(&root).expect("root");
        install_untenanted(dir.path());

        let gc = BinaryGarbageCollector::new(&root, Arc::new(OsFilesystem));

        for tenant in ["..", "../csi", "nested/.."] {
            assert_eq!(gc.collect(tenant, "2"), GcReport::default(), "{tenant}");
        }
        assert!(dir.path().join(BINARY_DIR).join("1").exists());
        assert!(dir.path().join(REFERENCE_DIR).join("1").exists());
    }

    #[test]
    fn empty_tenant_does_not_sweep_the_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_untenanted(dir.path());

        let gc = BinaryGarbageCollector::new(dir.path(), Arc::new(OsFilesystem));

        assert_eq!(gc.collect("", "2"), GcReport::default());
        assert_eq!(gc.collect(".", "2"), GcReport::default());
        assert!(dir.path().join(BINARY_DIR).join("1").exists());
    }

    #[test]
    fn tenant_must_be_one_plain_component() {
        assert!(is_single_component(TENANT));
        assert!(!is_single_component(""));
        assert!(!is_single_component("."));
        assert!(!is_single_component(".."));
        assert!(!is_single_component("/abc"));
        assert!(!is_single_component("abc/def"));
    }
}
