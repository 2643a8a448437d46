use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use cairn_tree::NodeHandle;
use serde::{Deserialize, Serialize};

/// Per-file attribute bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileFlags(u32);

impl FileFlags {
    pub const NONE: Self = Self(0);
    pub const EXECUTABLE: Self = Self(1);
    pub const READ_ONLY: Self = Self(2);
    pub const TEXT: Self = Self(4);
    pub const UTF16: Self = Self(8);

    /// Flags from their stored bit representation. Unknown bits are kept.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the executable flag is set.
    pub fn is_executable(&self) -> bool {
        self.contains(Self::EXECUTABLE)
    }

    /// Unix permission bits a file with these flags is exported with.
    pub fn unix_mode(&self) -> u32 {
        if self.is_executable() {
            0o755
        } else {
            0o644
        }
    }

    /// Flags implied by unix permission bits: executable if any execute bit
    /// is set.
    pub fn from_unix_mode(mode: u32) -> Self {
        if mode & 0o111 != 0 {
            Self::EXECUTABLE
        } else {
            Self::NONE
        }
    }
}

impl BitOr for FileFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for FileFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marks = [
            (Self::EXECUTABLE, 'x'),
            (Self::READ_ONLY, 'r'),
            (Self::TEXT, 't'),
            (Self::UTF16, 'u'),
        ];
        for (flag, mark) in marks {
            let c = if self.contains(flag) { mark } else { '-' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// A file inside a directory: its name, attributes and chunked content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub flags: FileFlags,
    pub length: u64,
    pub root: NodeHandle,
}

impl FileEntry {
    /// An entry whose length is taken from `root`.
    pub fn new(name: impl Into<String>, flags: FileFlags, root: NodeHandle) -> Self {
        Self {
            name: name.into(),
            flags,
            length: root.length,
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let flags = FileFlags::EXECUTABLE | FileFlags::TEXT;
        assert!(flags.is_executable());
        assert!(flags.contains(FileFlags::TEXT));
        assert!(!flags.contains(FileFlags::READ_ONLY));
        assert_eq!(flags.bits(), 5);
        assert_eq!(flags.to_string(), "x-t-");
    }

    #[test]
    fn unix_mode_roundtrip() {
        assert_eq!(FileFlags::from_unix_mode(0o755), FileFlags::EXECUTABLE);
        assert_eq!(FileFlags::from_unix_mode(0o100744), FileFlags::EXECUTABLE);
        assert_eq!(FileFlags::from_unix_mode(0o644), FileFlags::NONE);
        assert_eq!(FileFlags::EXECUTABLE.unix_mode(), 0o755);
        assert_eq!(FileFlags::NONE.unix_mode(), 0o644);
    }
}
