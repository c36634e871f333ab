//! Node flags
//!
//! Bitset describing what an abstract memory object may be. Flags only ever
//! accumulate through unification, except `FOREIGN`, which survives a merge
//! only when both sides carry it. Display prints one letter per flag.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Bitset of node properties
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct NodeFlags: u32 {
        const STACK = 1 << 0;
        const HEAP = 1 << 1;
        const GLOBAL = 1 << 2;
        const EXTERNAL = 1 << 3;
        const INT_TO_PTR = 1 << 4;
        const PTR_TO_INT = 1 << 5;
        const UNKNOWN = 1 << 6;
        const INCOMPLETE = 1 << 7;
        const MODIFIED = 1 << 8;
        const READ = 1 << 9;
        const ARRAY = 1 << 10;
        const OFFSET_COLLAPSED = 1 << 11;
        const TYPE_COLLAPSED = 1 << 12;
        const DEAD = 1 << 13;
        const NULL = 1 << 14;
        /// Copied in from a caller and not yet bound to callee structure
        const FOREIGN = 1 << 15;
    }
}

impl NodeFlags {
    const NAMES: [(NodeFlags, char); 16] = [
        (Self::STACK, 'S'),
        (Self::HEAP, 'H'),
        (Self::GLOBAL, 'G'),
        (Self::EXTERNAL, 'E'),
        (Self::INT_TO_PTR, 'P'),
        (Self::PTR_TO_INT, '2'),
        (Self::UNKNOWN, 'U'),
        (Self::INCOMPLETE, 'I'),
        (Self::MODIFIED, 'M'),
        (Self::READ, 'R'),
        (Self::ARRAY, 'A'),
        (Self::OFFSET_COLLAPSED, 'O'),
        (Self::TYPE_COLLAPSED, 'T'),
        (Self::DEAD, 'D'),
        (Self::NULL, 'N'),
        (Self::FOREIGN, 'F'),
    ];

    /// Flags of the node produced by merging two nodes
    ///
    /// OR for every flag but `FOREIGN`, which is AND-ed.
    pub fn join(self, other: NodeFlags) -> NodeFlags {
        (self | other).difference(Self::FOREIGN) | (self & other & Self::FOREIGN)
    }
}

impl fmt::Display for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, c) in Self::NAMES {
            if self.contains(flag) {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}
