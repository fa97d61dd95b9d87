//! Coalesces chains of single-byte literal nodes into multi-byte literals.
//!
//! `Trie::insert` always decomposes a literal run into one node per byte,
//! so that independent patterns sharing only a prefix of a word still
//! share tree structure. This pass undoes that decomposition wherever it
//! bought nothing: a literal node is fused into its single literal child
//! only when that child is itself the sole route forward (no siblings at
//! the fusion point), so branching points stay split and prefix-sharing
//! is preserved. Idempotent: once no node has a single literal child
//! left, a second pass is a no-op.

use crate::debug_log;
use crate::token::Token;
use crate::trie::{Node, Trie};

pub fn optimize<H>(trie: &mut Trie<H>) {
    if let Some(root) = trie.root.as_mut() {
        optimize_node(root);
    }
}

fn optimize_node<H>(node: &mut Node<H>) {
    if matches!(node.token, Token::Literal(_)) {
        loop {
            let can_fuse = node.children.len() == 1 && matches!(node.children[0].token, Token::Literal(_));
            if !can_fuse {
                break;
            }
            let child = node.children.remove(0);
            debug_assert!(child.handlers.is_empty(), "a literal node is never a leaf");
            match (&mut node.token, &child.token) {
                (Token::Literal(parent), Token::Literal(next)) => parent.push_str(next),
                _ => unreachable!(),
            }
            node.children = child.children;
            debug_log!("fused literal run into {:?}", node.token);
        }
    }

    for child in node.children.iter_mut() {
        optimize_node(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::Trie;

    fn sample() -> Trie<&'static str> {
        let mut t = Trie::new();
        t.insert("/_git/blobs/{hash([0-9a-f]{40})}", "blob").unwrap();
        t.insert("/admin/{*}", "auth-check").unwrap();
        t.insert("/admin/auth", "auth").unwrap();
        t.insert("/admin/{*}", "admin").unwrap();
        t.insert("/about/{*}", "about").unwrap();
        t.insert("/about-us/{*}", "about").unwrap();
        t.insert("/about-office/{*}", "about").unwrap();
        t.insert("/{*}", "public").unwrap();
        t
    }

    #[test]
    fn matches_the_worked_fixture() {
        let mut t = sample();
        optimize(&mut t);
        let dump = t.to_string();
        let expected = "\
┬╴eps(28, '/')
├┬╴lit(19, \"a\")
│├┬╴lit(12, \"bout\")
││├┬╴lit(8, \"-\")
│││├┬╴lit(3, \"us\")
││││└┬╴eps(2, '/')
││││ └┬╴var(1, [1], none, 0, -1)
││││  └┬╴eps(end)
││││   └─╴handler(5): \"about\"
│││└┬╴lit(3, \"office\")
│││ └┬╴eps(2, '/')
│││  └┬╴var(1, [1], none, 0, -1)
│││   └┬╴eps(end)
│││    └─╴handler(6): \"about\"
││└┬╴eps(2, '/')
││ └┬╴var(1, [1], none, 0, -1)
││  └┬╴eps(end)
││   └─╴handler(4): \"about\"
│└┬╴lit(5, \"dmin\")
│ └┬╴eps(4, '/')
│  ├┬╴var(1, [1], none, 0, -1)
│  │└┬╴eps(end)
│  │ ├─╴handler(1): \"auth-check\"
│  │ └─╴handler(3): \"admin\"
│  └┬╴lit(1, \"auth\")
│   └┬╴eps(end)
│    └─╴handler(2): \"auth\"
├┬╴lit(5, \"_git\")
│└┬╴eps(4, '/')
│ └┬╴lit(3, \"blobs\")
│  └┬╴eps(2, '/')
│   └┬╴var(1, [hash], \"([0-9a-f]{40})\", 1, 1)
│    └┬╴eps(end)
│     └─╴handler(0): \"blob\"
└┬╴var(1, [1], none, 0, -1)
 └┬╴eps(end)
  └─╴handler(7): \"public\"
";
        assert_eq!(dump, expected);
    }

    #[test]
    fn idempotent() {
        let mut t = sample();
        optimize(&mut t);
        let once = t.to_string();
        optimize(&mut t);
        let twice = t.to_string();
        assert_eq!(once, twice);
    }

    #[test]
    fn no_literal_node_has_a_single_literal_child() {
        let mut t = sample();
        optimize(&mut t);

        fn check<H>(node: &Node<H>) {
            if matches!(node.token, Token::Literal(_)) && node.children.len() == 1 {
                assert!(!matches!(node.children[0].token, Token::Literal(_)));
            }
            for c in &node.children {
                check(c);
            }
        }
        check(t.root.as_ref().unwrap());
    }
}
