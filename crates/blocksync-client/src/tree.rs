//! The editor side of synchronization.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use blocksync_types::Node;
use parking_lot::RwLock;

/// Where the current document tree comes from, and where accepted remote
/// state goes.
pub trait TreeSource: Send + Sync {
    /// Snapshot of the current root nodes.
    fn current_tree(&self) -> Vec<Node>;

    /// Replace the whole tree (initial load, accepted remote change).
    fn replace_tree(&self, roots: Vec<Node>);
}

/// In-process tree shared between an editor and its sync driver.
#[derive(Clone, Default)]
pub struct SharedTree {
    roots: Arc<RwLock<Vec<Node>>>,
    replaced: Arc<AtomicUsize>,
}

impl SharedTree {
    pub fn new(roots: Vec<Node>) -> Self {
        Self {
            roots: Arc::new(RwLock::new(roots)),
            replaced: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mutate the tree in place. Callers notify the sync handle afterwards.
    pub fn edit<R>(&self, f: impl FnOnce(&mut Vec<Node>) -> R) -> R {
        f(&mut self.roots.write())
    }

    pub fn snapshot(&self) -> Vec<Node> {
        self.roots.read().clone()
    }

    /// How many times the sync driver replaced the tree.
    pub fn replace_count(&self) -> usize {
        self.replaced.load(Ordering::Relaxed)
    }
}

impl TreeSource for SharedTree {
    fn current_tree(&self) -> Vec<Node> {
        self.snapshot()
    }

    fn replace_tree(&self, roots: Vec<Node>) {
        *self.roots.write() = roots;
        self.replaced.fetch_add(1, Ordering::Relaxed);
    }
}
