//! `trieroute` compiles a set of `/literal/{variable}` path patterns
//! into a flat bytecode program and matches request paths against it,
//! enumerating every handler whose pattern accepts the path rather than
//! stopping at the first.
//!
//! ```
//! use trieroute::Router;
//!
//! let mut router = Router::new();
//! router.insert("/admin/{*}", "admin").unwrap();
//! router.insert("/{*}", "public").unwrap();
//! router.optimize();
//! let program = router.compile();
//!
//! let matches = program.match_path("/admin/settings");
//! assert_eq!(matches.len(), 2);
//! assert_eq!(matches[0].handler, "admin");
//! assert_eq!(matches[1].handler, "public");
//! ```

mod compiler;
mod debug;
mod handler;
mod optimizer;
mod parser;
mod runtime;
mod token;
pub mod trie;

pub use compiler::{Instruction, Program, Target};
pub use handler::Pass;
pub use parser::{ParseError, ParseErrorReason};
pub use runtime::{Match, Runtime, RuntimePool};
pub use token::{Separator, Token, Variable, UNBOUNDED};
pub use trie::{Node, Trie};

use crate::debug_log;

/// Builds up a set of patterns, then compiles them into an immutable
/// [`Program`]. Patterns may be inserted in any order; handler ids are
/// assigned in insertion order regardless of where in the tree they end
/// up.
pub struct Router<H> {
    trie: Trie<H>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Router::new()
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Router { trie: Trie::new() }
    }

    /// Parses `pattern` and registers `handler` against it, returning
    /// the handler id assigned to this insertion.
    pub fn insert(&mut self, pattern: &str, handler: H) -> Result<u64, ParseError> {
        self.trie.insert(pattern, handler)
    }
}

impl<H> Router<H> {
    /// Coalesces chains of single-byte literal nodes back into literal
    /// runs wherever no branching was lost. Safe to call more than
    /// once; a second pass is a no-op.
    pub fn optimize(&mut self) {
        optimizer::optimize(&mut self.trie);
    }
}

impl<H: Clone> Router<H> {
    /// Flattens the tree, as it currently stands, into a [`Program`].
    /// Consumes the router: a `Program` is immutable and meant to be
    /// shared across match calls, not grown further. Call [`Router::optimize`]
    /// first to get fused literal runs in the compiled output; compiling
    /// an unoptimized tree is not incorrect, just one instruction per
    /// byte instead of per literal run.
    pub fn compile(self) -> Program<H> {
        debug_log!("router compiling {} bytes of tree", std::mem::size_of_val(&self.trie));
        compiler::compile(&self.trie)
    }

    /// The tree as it stands. Mainly useful for debugging: `Display`s
    /// as the box-drawing tree dump.
    pub fn tree(&self) -> &Trie<H> {
        &self.trie
    }
}
