//! The prefix-shared tree that merges every inserted pattern.
//!
//! Patterns are parsed into [`Token`] sequences and walked into the tree
//! one token at a time; siblings are deduplicated by structural token
//! equality so independent patterns sharing a prefix share tree nodes.
//! Literal runs longer than one byte are decomposed into a chain of
//! single-byte literal nodes on insert — this is what gives the
//! [`crate::optimizer`] something to fuse back together along unique
//! edges.

use std::fmt;

use crate::debug_log;
use crate::debug_warn;
use crate::parser::{self, ParseError};
use crate::token::{Separator, Token};

/// One node of the trie. The root node is always `eps('/')`, since every
/// parsed pattern begins with that token.
#[derive(Debug, Clone)]
pub struct Node<H> {
    pub token: Token,
    pub children: Vec<Node<H>>,
    pub handlers: Vec<(u64, H)>,
}

impl<H> Node<H> {
    fn new(token: Token) -> Self {
        Node { token, children: Vec::new(), handlers: Vec::new() }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.token, Token::Epsilon(Separator::End))
    }
}

/// The prefix tree built up by repeated [`Trie::insert`] calls.
#[derive(Debug, Clone, Default)]
pub struct Trie<H> {
    pub root: Option<Node<H>>,
    next_handler_id: u64,
}

impl<H> Trie<H> {
    pub fn new() -> Self {
        Trie { root: None, next_handler_id: 0 }
    }

    /// Parses `pattern` and merges its tokens into the tree, appending
    /// `handler` to the terminal node's handler list under a freshly
    /// minted, monotonically increasing handler id.
    pub fn insert(&mut self, pattern: &str, handler: H) -> Result<u64, ParseError> {
        let tokens = parser::parse(pattern)?;
        let expanded: Vec<Token> = tokens.into_iter().flat_map(expand_token).collect();

        if self.root.is_none() {
            self.root = Some(Node::new(expanded[0].clone()));
        }
        let root = self.root.as_mut().expect("root initialized above");
        debug_assert_eq!(root.token, expanded[0], "every pattern must start with eps('/')");

        let mut cur = root;
        for tok in &expanded[1..] {
            let idx = match cur.children.iter().position(|c| &c.token == tok) {
                Some(p) => p,
                None => {
                    cur.children.push(Node::new(tok.clone()));
                    cur.children.len() - 1
                }
            };
            cur = &mut cur.children[idx];
        }

        if !cur.handlers.is_empty() {
            debug_warn!(
                "pattern {:?} lands on a leaf that already has {} handler(s) registered",
                pattern,
                cur.handlers.len()
            );
        }

        let id = self.next_handler_id;
        self.next_handler_id += 1;
        cur.handlers.push((id, handler));
        debug_log!("inserted pattern {:?} as handler {}", pattern, id);
        Ok(id)
    }
}

fn expand_token(token: Token) -> Vec<Token> {
    match token {
        Token::Literal(s) if s.chars().count() > 1 => {
            s.chars().map(|c| Token::Literal(c.to_string())).collect()
        }
        other => vec![other],
    }
}

/// Number of instructions the subtree rooted at `node` will emit,
/// excluding the one instruction `node` itself contributes. This is the
/// numeric annotation shown in the tree dump and lets the compiler
/// precompute jump offsets in one pass.
pub fn subtree_size<H>(node: &Node<H>) -> usize {
    node.children.iter().map(|c| 1 + subtree_size(c)).sum()
}

/// A regex-constrained variable (it narrows what it accepts beyond "any
/// one segment") is tried before its siblings regardless of how small
/// its own subtree is — this is what lets a guard like
/// `{prepass(about-.*)}` run ahead of a much bushier literal sibling.
/// Everything else (literals, and a plain unconstrained variable like
/// `{*}`) sorts together by descending subtree size, ties broken by
/// original insertion order.
fn child_priority<H>(node: &Node<H>) -> (u8, usize) {
    let tier = match &node.token {
        Token::Variable(v) if v.regex.is_some() => 1,
        _ => 0,
    };
    (tier, subtree_size(node))
}

/// Children in compiled/displayed order (see [`child_priority`]), ties
/// broken by original insertion order (a stable sort). The compiler
/// walks children in this same order so match enumeration, the tree
/// dump, and the instruction stream all agree with each other.
pub fn sorted_children<H>(node: &Node<H>) -> Vec<&Node<H>> {
    let mut children: Vec<&Node<H>> = node.children.iter().collect();
    children.sort_by(|a, b| child_priority(b).cmp(&child_priority(a)));
    children
}

impl<H: fmt::Debug> fmt::Display for Trie<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Some(root) => render_node(f, root, "", true, true),
            None => Ok(()),
        }
    }
}

fn render_node<H: fmt::Debug>(
    f: &mut fmt::Formatter<'_>,
    node: &Node<H>,
    prefix: &str,
    is_last: bool,
    is_root: bool,
) -> fmt::Result {
    let self_marker = if is_root {
        ""
    } else if is_last {
        "└"
    } else {
        "├"
    };
    let has_descendants = !node.children.is_empty() || !node.handlers.is_empty();
    let shape = if has_descendants { "┬" } else { "─" };
    writeln!(f, "{}{}{}╴{}", prefix, self_marker, shape, node_content(node))?;

    let child_prefix = if is_root {
        String::new()
    } else if is_last {
        format!("{} ", prefix)
    } else {
        format!("{}│", prefix)
    };

    let ordered = sorted_children(node);
    let n = ordered.len();
    for (i, child) in ordered.into_iter().enumerate() {
        render_node(f, child, &child_prefix, i + 1 == n, false)?;
    }

    let m = node.handlers.len();
    for (i, (id, value)) in node.handlers.iter().enumerate() {
        let marker = if i + 1 == m { "└" } else { "├" };
        writeln!(f, "{}{}─╴handler({}): {:?}", child_prefix, marker, id, value)?;
    }

    Ok(())
}

fn node_content<H>(node: &Node<H>) -> String {
    let size = subtree_size(node);
    match &node.token {
        Token::Epsilon(Separator::Slash) => format!("eps({}, '/')", size),
        Token::Epsilon(Separator::End) => "eps(end)".to_string(),
        Token::Literal(s) => format!("lit({}, {:?})", size, s),
        Token::Variable(v) => {
            let regex = match &v.regex {
                Some(r) => format!("{:?}", r),
                None => "none".to_string(),
            };
            format!("var({}, [{}], {}, {}, {})", size, v.name, regex, v.min, v.max)
        }
    }
}
