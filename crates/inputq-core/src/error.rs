#![forbid(unsafe_code)]

//! Errors returned by the resolution methods of the queue.
//!
//! Resolution messages race with block discard: a hit-test result or a
//! content response may arrive after its block was already drained and
//! dropped. Those cases are reported, never panicked on.

use crate::block::BlockId;
use crate::event::InputKind;

/// Why a resolution message had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// No live block has this id (never created, or already discarded).
    UnknownBlock(BlockId),
    /// The block exists but is of a different kind than the message needs.
    KindMismatch {
        block_id: BlockId,
        expected: InputKind,
        found: InputKind,
    },
    /// The block already had this decision; the message was ignored.
    NoEffect(BlockId),
}

impl ResolveError {
    /// Block id the message referred to.
    #[must_use]
    pub const fn block_id(&self) -> BlockId {
        match *self {
            Self::UnknownBlock(id) | Self::NoEffect(id) => id,
            Self::KindMismatch { block_id, .. } => block_id,
        }
    }
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownBlock(id) => write!(f, "no input block with id {id}"),
            Self::KindMismatch {
                block_id,
                expected,
                found,
            } => write!(
                f,
                "input block {block_id} is a {found} block, expected a {expected} block"
            ),
            Self::NoEffect(id) => write!(f, "input block {id} already resolved"),
        }
    }
}

impl std::error::Error for ResolveError {}
