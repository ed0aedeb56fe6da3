use alloc::{boxed::Box, vec::Vec};
use rill_vfs_api::{FsError, driver::DriverConfig, path, stat::FileType};
use slotmap::SlotMap;
use smallvec::SmallVec;

slotmap::new_key_type! { pub(crate) struct NodeId; }

pub(crate) enum NodePayload {
    /// Child ids in insertion order.
    Dir(SmallVec<[NodeId; 8]>),
    File(Vec<u8>),
    Driver(DriverConfig),
}

pub(crate) struct Node {
    pub name: Box<str>,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: usize,
    pub mtime: u32,
    pub payload: NodePayload,
}

impl Node {
    pub fn dir(name: &str) -> Self {
        Self::new(name, NodePayload::Dir(SmallVec::new()))
    }

    pub fn file(name: &str) -> Self {
        Self::new(name, NodePayload::File(Vec::new()))
    }

    pub fn driver(name: &str, cfg: DriverConfig) -> Self {
        Self::new(name, NodePayload::Driver(cfg))
    }

    fn new(name: &str, payload: NodePayload) -> Self {
        Self {
            name: name.into(),
            mode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            mtime: 0,
            payload,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.payload, NodePayload::Dir(_))
    }

    pub fn file_type(&self) -> FileType {
        match self.payload {
            NodePayload::Dir(_) => FileType::Directory,
            NodePayload::File(_) => FileType::Regular,
            NodePayload::Driver(_) => FileType::Driver,
        }
    }
}

/// Node arena. Non-root nodes are owned by exactly one directory's child
/// list; the root is created at init and never removed.
pub(crate) struct NodeTree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}

impl NodeTree {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::dir("/"));
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        let NodePayload::Dir(children) = &self.nodes.get(dir)?.payload else {
            return None;
        };
        children
            .iter()
            .copied()
            .find(|&id| self.nodes.get(id).is_some_and(|n| &*n.name == name))
    }

    /// Walks `path` from the root, stopping `skip_last` segments early.
    /// `skip_last == 1` resolves the parent of the final segment.
    pub fn walk(&self, path: &str, skip_last: usize) -> Option<NodeId> {
        let take = path::depth(path).checked_sub(skip_last)?;
        let mut current = self.root;
        for seg in path::segments(path).take(take) {
            current = self.child(current, seg)?;
        }
        Some(current)
    }

    pub fn find_parent<'p>(&self, path: &'p str) -> Option<(NodeId, &'p str)> {
        let name = path::file_name(path)?;
        Some((self.walk(path, 1)?, name))
    }

    pub fn insert_child(&mut self, dir: NodeId, node: Node) -> Result<NodeId, FsError> {
        if !self.nodes.get(dir).is_some_and(Node::is_dir) {
            return Err(FsError::NotADirectory);
        }
        let id = self.nodes.insert(node);
        match self.nodes.get_mut(dir) {
            Some(Node {
                payload: NodePayload::Dir(children),
                ..
            }) => {
                children.push(id);
                Ok(id)
            }
            _ => {
                self.nodes.remove(id);
                Err(FsError::NotADirectory)
            }
        }
    }

    /// Detaches `node` from `dir` and frees it. Non-empty directories are
    /// refused.
    pub fn unlink(&mut self, dir: NodeId, node: NodeId) -> Result<(), FsError> {
        match self.nodes.get(node) {
            Some(Node {
                payload: NodePayload::Dir(children),
                ..
            }) if !children.is_empty() => return Err(FsError::DirectoryNotEmpty),
            Some(_) => (),
            None => return Err(FsError::NotFound),
        }

        let Some(Node {
            payload: NodePayload::Dir(children),
            ..
        }) = self.nodes.get_mut(dir)
        else {
            return Err(FsError::NotADirectory);
        };
        let Some(pos) = children.iter().position(|&id| id == node) else {
            return Err(FsError::NotFound);
        };
        children.remove(pos);
        self.nodes.remove(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, NodeTree};
    use rill_vfs_api::FsError;

    fn sample_tree() -> NodeTree {
        let mut tree = NodeTree::new();
        let root = tree.root();
        let etc = tree.insert_child(root, Node::dir("etc")).unwrap();
        tree.insert_child(etc, Node::file("motd")).unwrap();
        tree.insert_child(root, Node::file("boot.bin")).unwrap();
        tree
    }

    #[test]
    fn walk_resolves_root() {
        let tree = sample_tree();
        assert_eq!(Some(tree.root()), tree.walk("", 0));
        assert_eq!(Some(tree.root()), tree.walk("/", 0));
    }

    #[test]
    fn walk_resolves_nested() {
        let tree = sample_tree();
        let motd = tree.walk("etc/motd", 0).expect("nested node");
        assert_eq!("motd", &*tree.node(motd).unwrap().name);
    }

    #[test]
    fn walk_rejects_missing_segment() {
        let tree = sample_tree();
        assert!(tree.walk("etc/passwd", 0).is_none());
        assert!(tree.walk("usr/motd", 0).is_none());
    }

    #[test]
    fn walk_rejects_file_in_the_middle() {
        let tree = sample_tree();
        assert!(tree.walk("boot.bin/x", 0).is_none());
    }

    #[test]
    fn parent_of_nested_path() {
        let tree = sample_tree();
        let (parent, name) = tree.find_parent("etc/motd").expect("parent");
        assert_eq!("etc", &*tree.node(parent).unwrap().name);
        assert_eq!("motd", name);
    }

    #[test]
    fn parent_of_top_level_is_root() {
        let tree = sample_tree();
        let (parent, name) = tree.find_parent("boot.bin").expect("parent");
        assert_eq!(tree.root(), parent);
        assert_eq!("boot.bin", name);
    }

    #[test]
    fn root_has_no_parent() {
        let tree = sample_tree();
        assert!(tree.find_parent("/").is_none());
    }

    #[test]
    fn unlink_refuses_populated_dir() {
        let mut tree = sample_tree();
        let etc = tree.walk("etc", 0).unwrap();
        assert_eq!(
            Err(FsError::DirectoryNotEmpty),
            tree.unlink(tree.root(), etc)
        );
    }

    #[test]
    fn unlink_detaches_and_frees() {
        let mut tree = sample_tree();
        let etc = tree.walk("etc", 0).unwrap();
        let motd = tree.walk("etc/motd", 0).unwrap();
        tree.unlink(etc, motd).expect("unlink file");
        assert!(tree.walk("etc/motd", 0).is_none());
        tree.unlink(tree.root(), etc).expect("unlink now-empty dir");
        assert!(tree.walk("etc", 0).is_none());
    }

    #[test]
    fn insert_into_file_fails() {
        let mut tree = sample_tree();
        let boot = tree.walk("boot.bin", 0).unwrap();
        assert_eq!(
            Err(FsError::NotADirectory),
            tree.insert_child(boot, Node::file("x")).map(|_| ())
        );
    }
}
