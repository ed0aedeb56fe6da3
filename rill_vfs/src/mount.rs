use alloc::{string::String, sync::Arc, vec::Vec};
use rill_vfs_api::fs::FsBackend;
use slotmap::SlotMap;

slotmap::new_key_type! { pub(crate) struct MountId; }

/// One mounted filesystem instance. `base` is a non-owning back-reference
/// to the filesystem this one is mounted inside; a stale id resolves to
/// nothing.
pub(crate) struct MountEntry {
    /// Normalized with a trailing slash.
    pub mount_point: String,
    pub base: Option<MountId>,
    pub child_mounts: u32,
    pub backend: Arc<dyn FsBackend>,
}

/// Ordered, id-addressable list of mounts.
pub(crate) struct MountTable {
    entries: SlotMap<MountId, MountEntry>,
    order: Vec<MountId>,
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: MountId) -> Option<&MountEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: MountId) -> Option<&mut MountEntry> {
        self.entries.get_mut(id)
    }

    pub fn by_index(&self, index: usize) -> Option<&MountEntry> {
        self.entries.get(*self.order.get(index)?)
    }

    pub fn insert(&mut self, entry: MountEntry) -> MountId {
        let id = self.entries.insert(entry);
        self.order.push(id);
        id
    }

    pub fn remove(&mut self, id: MountId) -> Option<MountEntry> {
        let entry = self.entries.remove(id)?;
        self.order.retain(|&other| other != id);
        Some(entry)
    }

    /// Exact mount-point lookup. `path` must carry its trailing slash.
    pub fn find_exact(&self, path: &str) -> Option<MountId> {
        self.order
            .iter()
            .copied()
            .find(|&id| self.entries.get(id).is_some_and(|e| e.mount_point == path))
    }

    /// Longest-prefix match: tries the whole path, then each `/` boundary
    /// from the end. Returns the entry and the byte offset where the
    /// FS-relative suffix starts.
    pub fn resolve_base(&self, path: &str) -> Option<(MountId, usize)> {
        let boundaries =
            core::iter::once(path.len()).chain(path.rmatch_indices('/').map(|(i, _)| i + 1));
        for end in boundaries {
            if let Some(id) = self.find_exact(&path[..end]) {
                return Some((id, end));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{MountEntry, MountTable};
    use alloc::{string::String, sync::Arc};
    use rill_vfs_api::fs::FsBackend;

    struct NullFs;

    impl FsBackend for NullFs {}

    fn table_with(paths: &[&str]) -> MountTable {
        let mut table = MountTable::new();
        for path in paths {
            table.insert(MountEntry {
                mount_point: String::from(*path),
                base: None,
                child_mounts: 0,
                backend: Arc::new(NullFs),
            });
        }
        table
    }

    #[test]
    fn deepest_prefix_wins() {
        let table = table_with(&["/", "/mnt/", "/mnt/sd/"]);
        let (id, at) = table.resolve_base("/mnt/sd/file.txt").expect("resolved");
        assert_eq!("/mnt/sd/", table.get(id).unwrap().mount_point);
        assert_eq!("file.txt", &"/mnt/sd/file.txt"[at..]);
    }

    #[test]
    fn shorter_prefixes_fall_back_to_root() {
        let table = table_with(&["/", "/mnt/", "/mnt/sd/"]);
        let (id, at) = table.resolve_base("/usr/lib").expect("resolved");
        assert_eq!("/", table.get(id).unwrap().mount_point);
        assert_eq!("usr/lib", &"/usr/lib"[at..]);
    }

    #[test]
    fn mount_point_itself_resolves_with_empty_suffix() {
        let table = table_with(&["/", "/mnt/"]);
        let (id, at) = table.resolve_base("/mnt/").expect("resolved");
        assert_eq!("/mnt/", table.get(id).unwrap().mount_point);
        assert_eq!("", &"/mnt/"[at..]);
    }

    #[test]
    fn prefix_must_end_on_a_boundary() {
        let table = table_with(&["/", "/mnt/"]);
        let (id, _) = table.resolve_base("/mntx/f").expect("resolved");
        assert_eq!("/", table.get(id).unwrap().mount_point);
    }

    #[test]
    fn empty_table_resolves_nothing() {
        let table = MountTable::new();
        assert!(table.resolve_base("/").is_none());
        assert!(table.find_exact("/").is_none());
    }

    #[test]
    fn exact_lookup_ignores_prefixes() {
        let table = table_with(&["/", "/mnt/"]);
        assert!(table.find_exact("/mnt/").is_some());
        assert!(table.find_exact("/mnt/sd/").is_none());
    }

    #[test]
    fn removal_keeps_positional_order() {
        let mut table = table_with(&["/", "/a/", "/b/"]);
        let a = table.find_exact("/a/").unwrap();
        table.remove(a).unwrap();
        assert_eq!("/", table.by_index(0).unwrap().mount_point);
        assert_eq!("/b/", table.by_index(1).unwrap().mount_point);
        assert!(table.by_index(2).is_none());
    }
}
