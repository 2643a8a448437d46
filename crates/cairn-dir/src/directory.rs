//! In-memory directory trees referencing chunked file content.
//!
//! A [`DirectoryTree`] is mutable until collapsed. Collapsing serializes every
//! expanded directory bottom-up into a Directory node and replaces it with a
//! handle; later path operations expand collapsed directories on demand
//! through the tree's [`TreeReader`].
//!
//! Directory payload, inside the Directory node wire format:
//!
//! ```text
//! file_count varint | (name_len varint | name utf8 | flags varint) * file_count
//! dir_count varint  | (name_len varint | name utf8) * dir_count
//! ```
//!
//! Children list file roots first, then subdirectories, both in name order.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use cairn_tree::{encode_varint, ByteReader, Node, NodeHandle, RawDirectory, TreeError, TreeReader, TreeWriter};
use cairn_types::ContentHash;

use crate::entry::{FileEntry, FileFlags};
use crate::error::{DirError, DirResult};

/// Split a path on `/` and `\`, dropping empty components.
pub fn split_path(path: &str) -> DirResult<Vec<&str>> {
    let components = path_components(path)?;
    if components.is_empty() {
        return Err(DirError::InvalidPath {
            path: path.to_string(),
            reason: "empty path".into(),
        });
    }
    Ok(components)
}

/// Like [`split_path`] but an empty path names the root.
fn path_components(path: &str) -> DirResult<Vec<&str>> {
    let components: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|c| !c.is_empty())
        .collect();
    if let Some(bad) = components.iter().find(|c| **c == "." || **c == "..") {
        return Err(DirError::InvalidPath {
            path: path.to_string(),
            reason: format!("relative component {bad:?}"),
        });
    }
    Ok(components)
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// State of a subdirectory entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectoryState {
    /// Loaded in memory and mutable.
    Expanded(DirectoryNode),
    /// Serialized; only its handle is held.
    Collapsed(NodeHandle),
}

/// A named subdirectory inside a [`DirectoryNode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    state: DirectoryState,
}

impl DirectoryEntry {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: DirectoryState::Expanded(DirectoryNode::default()),
        }
    }

    /// Current in-memory state of this subdirectory.
    pub fn state(&self) -> &DirectoryState {
        &self.state
    }

    /// Whether the subdirectory is loaded in memory.
    pub fn is_expanded(&self) -> bool {
        matches!(self.state, DirectoryState::Expanded(_))
    }

    /// Handle of a collapsed directory.
    pub fn handle(&self) -> Option<&NodeHandle> {
        match &self.state {
            DirectoryState::Collapsed(handle) => Some(handle),
            DirectoryState::Expanded(_) => None,
        }
    }

    async fn expand(
        &mut self,
        reader: Option<&TreeReader>,
        path: &str,
    ) -> DirResult<&mut DirectoryNode> {
        if let DirectoryState::Collapsed(handle) = &self.state {
            let reader = reader.ok_or_else(|| DirError::Detached(path.to_string()))?;
            let node = load_directory(reader, handle).await?;
            self.state = DirectoryState::Expanded(node);
        }
        let DirectoryState::Expanded(node) = &mut self.state else {
            unreachable!("directory was expanded above")
        };
        Ok(node)
    }
}

/// Files and subdirectories of one directory. A name denotes at most one of
/// the two.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryNode {
    files: BTreeMap<String, FileEntry>,
    dirs: BTreeMap<String, DirectoryEntry>,
}

impl DirectoryNode {
    /// Files in this directory, sorted by name.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    /// Subdirectories, sorted by name.
    pub fn directories(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.dirs.values()
    }

    /// The file called `name`, if any.
    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(name)
    }

    pub fn directory(&self, name: &str) -> Option<&DirectoryEntry> {
        self.dirs.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Serialize bottom-up, leaving every subdirectory collapsed.
    fn collapse(&mut self, writer: &mut TreeWriter) -> NodeHandle {
        let mut payload = Vec::new();
        let mut children = Vec::with_capacity(self.files.len() + self.dirs.len());

        encode_varint(&mut payload, self.files.len() as u64);
        for file in self.files.values() {
            encode_name(&mut payload, &file.name);
            encode_varint(&mut payload, file.flags.bits() as u64);
            children.push(file.root.clone());
        }

        encode_varint(&mut payload, self.dirs.len() as u64);
        for entry in self.dirs.values_mut() {
            let handle = match &mut entry.state {
                DirectoryState::Expanded(child) => child.collapse(writer),
                DirectoryState::Collapsed(handle) => handle.clone(),
            };
            encode_name(&mut payload, &entry.name);
            entry.state = DirectoryState::Collapsed(handle.clone());
            children.push(handle);
        }

        writer.write_node(&Node::directory(payload, children))
    }
}

fn encode_name(buf: &mut Vec<u8>, name: &str) {
    encode_varint(buf, name.len() as u64);
    buf.extend_from_slice(name.as_bytes());
}

/// Parse a Directory node's payload. Subdirectories come back collapsed.
pub fn decode_directory(hash: ContentHash, raw: &RawDirectory) -> DirResult<DirectoryNode> {
    let malformed = |reason: String| DirError::MalformedDirectory { hash, reason };
    let mut reader = ByteReader::new(&raw.payload);

    let file_count = reader.read_len().map_err(malformed)?;
    let mut file_meta = Vec::new();
    for _ in 0..file_count {
        let name = read_name(&mut reader).map_err(malformed)?;
        let bits = reader.read_varint().map_err(malformed)?;
        let bits = u32::try_from(bits).map_err(|_| malformed(format!("flags {bits} out of range")))?;
        file_meta.push((name, FileFlags::from_bits(bits)));
    }

    let dir_count = reader.read_len().map_err(malformed)?;
    let mut dir_names = Vec::new();
    for _ in 0..dir_count {
        dir_names.push(read_name(&mut reader).map_err(malformed)?);
    }
    if reader.remaining() != 0 {
        return Err(malformed(format!("{} trailing payload bytes", reader.remaining())));
    }
    if raw.children.len() != file_count + dir_count {
        return Err(malformed(format!(
            "{} children for {file_count} files and {dir_count} directories",
            raw.children.len()
        )));
    }

    let mut node = DirectoryNode::default();
    let (file_roots, dir_handles) = raw.children.split_at(file_count);
    for ((name, flags), root) in file_meta.into_iter().zip(file_roots) {
        if node.files.contains_key(&name) {
            return Err(malformed(format!("duplicate name {name:?}")));
        }
        node.files.insert(
            name.clone(),
            FileEntry {
                name,
                flags,
                length: root.length,
                root: root.clone(),
            },
        );
    }
    for (name, handle) in dir_names.into_iter().zip(dir_handles) {
        if node.files.contains_key(&name) || node.dirs.contains_key(&name) {
            return Err(malformed(format!("duplicate name {name:?}")));
        }
        node.dirs.insert(
            name.clone(),
            DirectoryEntry {
                name,
                state: DirectoryState::Collapsed(handle.clone()),
            },
        );
    }
    Ok(node)
}

fn read_name(reader: &mut ByteReader<'_>) -> Result<String, String> {
    let len = reader.read_len()?;
    let bytes = reader.read_bytes(len)?;
    let name = std::str::from_utf8(bytes).map_err(|e| format!("name is not UTF-8: {e}"))?;
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(format!("invalid entry name {name:?}"));
    }
    Ok(name.to_string())
}

async fn load_directory(reader: &TreeReader, handle: &NodeHandle) -> DirResult<DirectoryNode> {
    let node = reader.read_handle(handle).await?;
    match node.as_ref() {
        Node::Directory(raw) => decode_directory(handle.hash, raw),
        other => Err(TreeError::UnexpectedKind {
            hash: handle.hash,
            found: other.kind().as_str(),
            expected: "directory",
        }
        .into()),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// Missing directories or files in the way end the walk with `None`.
    Lookup,
    /// Missing directories are created; a file in the way is a collision.
    Create,
}

/// Where a read-only check for a new file's place stopped.
enum Slot {
    Free,
    /// Path of the entry that collides.
    Taken(String),
    /// A collapsed directory that has to be loaded to continue. `depth`
    /// counts the parent components consumed, including this one.
    Collapsed {
        handle: NodeHandle,
        depth: usize,
        walked: String,
    },
}

/// Check whether a file `name` may live under `parents` within `node`,
/// stopping at the first collapsed directory.
fn find_slot(mut node: &DirectoryNode, parents: &[&str], name: &str, mut walked: String) -> Slot {
    for (i, component) in parents.iter().enumerate() {
        walked = join(&walked, component);
        if node.files.contains_key(*component) {
            return Slot::Taken(walked);
        }
        match node.dirs.get(*component).map(DirectoryEntry::state) {
            None => return Slot::Free,
            Some(DirectoryState::Expanded(child)) => node = child,
            Some(DirectoryState::Collapsed(handle)) => {
                return Slot::Collapsed {
                    handle: handle.clone(),
                    depth: i + 1,
                    walked,
                }
            }
        }
    }
    if node.dirs.contains_key(name) {
        Slot::Taken(join(&walked, name))
    } else {
        Slot::Free
    }
}

/// Walk from `node` down `components`, expanding collapsed directories.
///
/// In `Create` mode a collision can only be met inside directories that
/// already existed, before anything has been created.
async fn descend<'a>(
    mut node: &'a mut DirectoryNode,
    reader: Option<&TreeReader>,
    components: &[&str],
    walk: Walk,
) -> DirResult<Option<&'a mut DirectoryNode>> {
    let mut walked = String::new();
    for name in components {
        walked = join(&walked, name);
        if node.files.contains_key(*name) {
            return match walk {
                Walk::Lookup => Ok(None),
                Walk::Create => Err(DirError::NameCollision(walked)),
            };
        }
        let entry = match node.dirs.entry(name.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) if walk == Walk::Create => e.insert(DirectoryEntry::empty(name)),
            Entry::Vacant(_) => return Ok(None),
        };
        node = entry.expand(reader, &walked).await?;
    }
    Ok(Some(node))
}

/// Names directly inside one directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<FileEntry>,
    pub directories: Vec<String>,
}

/// Every path in a tree, sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeListing {
    pub files: Vec<(String, FileEntry)>,
    pub directories: Vec<String>,
}

/// A mutable directory hierarchy whose files reference chunked content.
#[derive(Clone, Debug, Default)]
pub struct DirectoryTree {
    root: DirectoryNode,
    reader: Option<TreeReader>,
}

impl DirectoryTree {
    /// An empty tree with no reader. Collapsed directories cannot be
    /// re-expanded until one is attached with [`with_reader`](Self::with_reader).
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the reader used to expand collapsed directories.
    pub fn with_reader(mut self, reader: TreeReader) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Load the tree whose root directory node is `handle`.
    pub async fn open(reader: TreeReader, handle: &NodeHandle) -> DirResult<Self> {
        let root = load_directory(&reader, handle).await?;
        Ok(Self {
            root,
            reader: Some(reader),
        })
    }

    /// The root directory, in its current state.
    pub fn root(&self) -> &DirectoryNode {
        &self.root
    }

    pub fn reader(&self) -> Option<&TreeReader> {
        self.reader.as_ref()
    }

    /// Insert or overwrite the file at `path`, creating missing parent
    /// directories. On a collision the tree is left unchanged.
    pub async fn add_file(
        &mut self,
        path: &str,
        flags: FileFlags,
        length: u64,
        root: NodeHandle,
    ) -> DirResult<()> {
        let components = split_path(path)?;
        if length != root.length {
            return Err(DirError::LengthMismatch {
                path: path.to_string(),
                given: length,
                actual: root.length,
            });
        }
        let (name, parents) = components
            .split_last()
            .ok_or_else(|| DirError::InvalidPath {
                path: path.to_string(),
                reason: "empty path".into(),
            })?;

        self.check_file_slot(parents, name).await?;

        let parent = descend(&mut self.root, self.reader.as_ref(), parents, Walk::Create)
            .await?
            .ok_or_else(|| DirError::NameCollision(components.join("/")))?;
        parent.files.insert(
            name.to_string(),
            FileEntry {
                name: name.to_string(),
                flags,
                length,
                root,
            },
        );
        Ok(())
    }

    /// Fail with `NameCollision` if a file `name` cannot be placed under
    /// `parents`. Collapsed directories on the way are read but stay
    /// collapsed.
    async fn check_file_slot(&self, parents: &[&str], name: &str) -> DirResult<()> {
        let mut rest = parents;
        let mut slot = find_slot(&self.root, rest, name, String::new());
        loop {
            match slot {
                Slot::Free => return Ok(()),
                Slot::Taken(path) => return Err(DirError::NameCollision(path)),
                Slot::Collapsed {
                    handle,
                    depth,
                    walked,
                } => {
                    let reader = self
                        .reader
                        .as_ref()
                        .ok_or_else(|| DirError::Detached(walked.clone()))?;
                    let loaded = load_directory(reader, &handle).await?;
                    rest = &rest[depth..];
                    slot = find_slot(&loaded, rest, name, walked);
                }
            }
        }
    }

    /// Find or create the directory at `path`.
    pub async fn add_directory(&mut self, path: &str) -> DirResult<()> {
        let components = split_path(path)?;
        descend(&mut self.root, self.reader.as_ref(), &components, Walk::Create).await?;
        Ok(())
    }

    /// Remove the file at `path`. Returns `false` if there was none.
    pub async fn delete_file(&mut self, path: &str) -> DirResult<bool> {
        let components = split_path(path)?;
        let Some((name, parents)) = components.split_last() else {
            return Ok(false);
        };
        match descend(&mut self.root, self.reader.as_ref(), parents, Walk::Lookup).await? {
            Some(parent) => Ok(parent.files.remove(*name).is_some()),
            None => Ok(false),
        }
    }

    /// Remove the directory at `path` and everything under it. Returns
    /// `false` if there was none.
    pub async fn delete_directory(&mut self, path: &str) -> DirResult<bool> {
        let components = split_path(path)?;
        let Some((name, parents)) = components.split_last() else {
            return Ok(false);
        };
        match descend(&mut self.root, self.reader.as_ref(), parents, Walk::Lookup).await? {
            Some(parent) => Ok(parent.dirs.remove(*name).is_some()),
            None => Ok(false),
        }
    }

    /// Look up the file at `path`, expanding directories on the way.
    pub async fn find_file(&mut self, path: &str) -> DirResult<Option<FileEntry>> {
        let components = split_path(path)?;
        let Some((name, parents)) = components.split_last() else {
            return Ok(None);
        };
        Ok(
            descend(&mut self.root, self.reader.as_ref(), parents, Walk::Lookup)
                .await?
                .and_then(|parent| parent.files.get(*name).cloned()),
        )
    }

    /// Contents of the directory at `path` (empty path for the root), or
    /// `None` if it does not exist.
    pub async fn list(&mut self, path: &str) -> DirResult<Option<Listing>> {
        let components = path_components(path)?;
        let Some(node) =
            descend(&mut self.root, self.reader.as_ref(), &components, Walk::Lookup).await?
        else {
            return Ok(None);
        };
        Ok(Some(Listing {
            files: node.files.values().cloned().collect(),
            directories: node.dirs.keys().cloned().collect(),
        }))
    }

    /// Every file and directory path in the tree, expanding as needed.
    pub async fn walk(&mut self) -> DirResult<TreeListing> {
        let mut listing = TreeListing::default();
        let mut pending = vec![String::new()];

        while let Some(dir_path) = pending.pop() {
            let components = path_components(&dir_path)?;
            let Some(node) =
                descend(&mut self.root, self.reader.as_ref(), &components, Walk::Lookup).await?
            else {
                continue;
            };
            for (name, file) in &node.files {
                listing.files.push((join(&dir_path, name), file.clone()));
            }
            for name in node.dirs.keys() {
                let child = join(&dir_path, name);
                listing.directories.push(child.clone());
                pending.push(child);
            }
        }

        listing.files.sort_by(|a, b| a.0.cmp(&b.0));
        listing.directories.sort();
        Ok(listing)
    }

    /// All files with their full paths, sorted by path.
    pub async fn files(&mut self) -> DirResult<Vec<(String, FileEntry)>> {
        Ok(self.walk().await?.files)
    }

    /// Serialize the tree through `writer` and return the root directory
    /// handle. Subdirectories become collapsed; the caller flushes `writer`.
    pub fn collapse(&mut self, writer: &mut TreeWriter) -> NodeHandle {
        self.root.collapse(writer)
    }
}
