//! Flattens an optimized [`Trie`] into a linear bytecode program.
//!
//! The tree is walked in the same child order the tree dump renders
//! ([`sorted_children`]), assigning one instruction per node. An
//! instruction's `onErr` (or `jump`, for `matchEnd`) always points to the
//! program counter right after the instruction's own subtree — which,
//! since a preorder walk keeps every subtree contiguous, is either the
//! next sibling or (recursively) whatever comes after the nearest
//! ancestor's subtree. That position falls straight out of
//! [`subtree_size`], so no explicit ancestor/failure stack is needed: a
//! node's own `pc` and its own subtree size are enough.
//!
//! `unwind` is the depth, minus one, of whatever instruction sits at the
//! target — how many capture frames the runtime must pop to get back to
//! that point. It is filled in a short second pass once every
//! instruction's depth is known.

use std::fmt;

use crate::debug_log;
use crate::token::{Separator, Token, Variable};
use crate::trie::{sorted_children, subtree_size, Node, Trie};

/// A jump target: `-1` is the halt sentinel (nothing left to try).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub pc: i64,
    pub unwind: u32,
}

impl Target {
    pub const HALT: Target = Target { pc: -1, unwind: 0 };
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {}}}", self.pc, self.unwind)
    }
}

/// One compiled step. `frames` is the 1-indexed depth of the tree node
/// this instruction came from, i.e. how many capture frames are active
/// by the time this step runs.
#[derive(Debug, Clone)]
pub enum Instruction<H> {
    MatchEpsilon {
        frames: u32,
        on_err: Target,
    },
    MatchByte {
        byte: u8,
        frames: u32,
        on_err: Target,
    },
    MatchBytes {
        bytes: String,
        frames: u32,
        on_err: Target,
    },
    MatchVariable {
        var: Variable,
        /// Index into [`Program::regexes`], if this variable carries one.
        regex: Option<usize>,
        frames: u32,
        on_err: Target,
    },
    MatchEnd {
        handlers: Vec<(u64, H)>,
        frames: u32,
        jump: Target,
    },
}

impl<H> Instruction<H> {
    pub fn frames(&self) -> u32 {
        match self {
            Instruction::MatchEpsilon { frames, .. }
            | Instruction::MatchByte { frames, .. }
            | Instruction::MatchBytes { frames, .. }
            | Instruction::MatchVariable { frames, .. }
            | Instruction::MatchEnd { frames, .. } => *frames,
        }
    }

    fn target_mut(&mut self) -> &mut Target {
        match self {
            Instruction::MatchEpsilon { on_err, .. }
            | Instruction::MatchByte { on_err, .. }
            | Instruction::MatchBytes { on_err, .. }
            | Instruction::MatchVariable { on_err, .. } => on_err,
            Instruction::MatchEnd { jump, .. } => jump,
        }
    }

    pub fn target(&self) -> Target {
        match self {
            Instruction::MatchEpsilon { on_err, .. }
            | Instruction::MatchByte { on_err, .. }
            | Instruction::MatchBytes { on_err, .. }
            | Instruction::MatchVariable { on_err, .. } => *on_err,
            Instruction::MatchEnd { jump, .. } => *jump,
        }
    }
}

impl<H: fmt::Debug> fmt::Display for Instruction<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::MatchEpsilon { frames, on_err } => {
                write!(f, "matchEpsilon(frames: {}, onErr: {})", frames, on_err)
            }
            Instruction::MatchByte { byte, frames, on_err } => {
                write!(f, "matchByte({:?}, frames: {}, onErr: {})", *byte as char, frames, on_err)
            }
            Instruction::MatchBytes { bytes, frames, on_err } => {
                write!(f, "matchBytes({:?}, frames: {}, onErr: {})", bytes, frames, on_err)
            }
            Instruction::MatchVariable { frames, on_err, .. } => {
                write!(f, "matchVariable(frames: {}, onErr: {})", frames, on_err)
            }
            Instruction::MatchEnd { frames, jump, .. } => {
                write!(f, "matchEnd(frames: {}, jump: {})", frames, jump)
            }
        }
    }
}

/// A compiled, immutable program ready to be run by [`crate::runtime`].
pub struct Program<H> {
    pub instructions: Vec<Instruction<H>>,
    pub regexes: Vec<regex::Regex>,
}

impl<H: fmt::Debug> fmt::Display for Program<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "({:>3}) {}", idx, instr)?;
        }
        Ok(())
    }
}

/// Flattens `trie` into a [`Program`]. `trie` should already have gone
/// through [`crate::optimizer::optimize`]; compiling an unoptimized trie
/// is not incorrect, just wasteful (one instruction per byte instead of
/// per literal run).
pub fn compile<H: Clone>(trie: &Trie<H>) -> Program<H> {
    let mut instructions = Vec::new();
    let mut depths = Vec::new();
    let mut regexes = Vec::new();

    if let Some(root) = &trie.root {
        let total = 1 + subtree_size(root) as i64;
        let mut pc = 0i64;
        emit(root, 1, total, &mut pc, &mut instructions, &mut depths, &mut regexes);
    }

    for instr in instructions.iter_mut() {
        let target = instr.target_mut();
        if target.pc >= 0 {
            target.unwind = depths[target.pc as usize] - 1;
        }
    }

    debug_log!("compiled {} instructions, {} regexes", instructions.len(), regexes.len());
    Program { instructions, regexes }
}

fn emit<H: Clone>(
    node: &Node<H>,
    depth: u32,
    total: i64,
    pc: &mut i64,
    out: &mut Vec<Instruction<H>>,
    depths: &mut Vec<u32>,
    regexes: &mut Vec<regex::Regex>,
) {
    let my_pc = *pc;
    *pc += 1;
    depths.push(depth);

    let target_pc = my_pc + 1 + subtree_size(node) as i64;
    let target = if target_pc >= total { Target::HALT } else { Target { pc: target_pc, unwind: 0 } };

    let instr = match &node.token {
        Token::Epsilon(Separator::Slash) => Instruction::MatchEpsilon { frames: depth, on_err: target },
        Token::Epsilon(Separator::End) => {
            Instruction::MatchEnd { handlers: node.handlers.clone(), frames: depth, jump: target }
        }
        Token::Literal(s) => {
            let mut chars = s.chars();
            let first = chars.next().expect("a literal node's run is never empty");
            // A single ASCII char fits one byte and gets the cheaper
            // instruction; anything else (multi-char runs, or a lone
            // non-ASCII char whose UTF-8 encoding is more than one byte)
            // goes through MatchBytes, which compares the real encoding
            // instead of truncating a scalar value into a byte.
            if chars.next().is_none() && first.is_ascii() {
                Instruction::MatchByte { byte: first as u8, frames: depth, on_err: target }
            } else {
                Instruction::MatchBytes { bytes: s.clone(), frames: depth, on_err: target }
            }
        }
        Token::Variable(v) => {
            let regex_idx = v.regex.as_ref().map(|src| {
                regexes.push(regex::Regex::new(src).expect("regex validated at parse time"));
                regexes.len() - 1
            });
            Instruction::MatchVariable { var: v.clone(), regex: regex_idx, frames: depth, on_err: target }
        }
    };
    out.push(instr);

    for child in sorted_children(node) {
        emit(child, depth + 1, total, pc, out, depths, regexes);
    }
}
