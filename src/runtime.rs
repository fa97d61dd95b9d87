//! The backtracking VM that walks a [`Program`](crate::compiler::Program)
//! over an input path and enumerates every accepting leaf.
//!
//! Captures are kept in a flat log of `(depth, name, value)` triples
//! rather than a real push/pop stack keyed to tree structure: forward
//! progress appends at the current depth, and every transfer (`onErr`
//! or `jump`) truncates the log back to its target's `unwind` depth
//! before continuing. This mirrors the compiler's `frames` field, which
//! is itself a depth counter, not a push count — truncating by depth on
//! every transfer is what a real pop of the capture stack would do.
//!
//! A leaf whose `eps(end)` carries more than one handler does not emit
//! them back to back. The first handler is recorded immediately; the
//! rest are queued as a pending drain keyed to the leaf's own `jump`
//! unwind depth, and only get emitted once some later transfer actually
//! unwinds past that depth — i.e. once the search is done trying the
//! leaf's immediate siblings. This is what makes `/admin//auth` report
//! `auth-check`, `auth`, `admin`, `public` in that order even though
//! `auth-check` and `admin` share a single compiled `matchEnd`.
//!
//! A variable consumes one path segment at a time rather than slurping
//! to the next `/` in one step; an unbounded variable (`{*}`, `{+}`)
//! keeps crossing separators until input runs out, contributing one
//! capture entry per segment under the same name. A segment that
//! matches empty is tolerated once `min` segments are already satisfied
//! but adds no entry, which is why a trailing `{*}` with nothing left
//! to consume leaves a leaf's capture list empty instead of holding one
//! empty-string entry. `eps('/')` likewise tolerates being at the very
//! end of input with no separator left to consume, so a pattern whose
//! last segment is optional still matches a path with no trailing
//! slash.

use parking_lot::Mutex;

use crate::compiler::{Instruction, Program, Target};
use crate::debug_trace;

/// One accepted route: the handler that matched and the captures bound
/// along the way, in the order their variables appear in the pattern.
#[derive(Debug, Clone)]
pub struct Match<H> {
    pub handler_id: u64,
    pub handler: H,
    pub captures: Vec<(String, String)>,
}

struct Pending<H> {
    threshold: u32,
    remaining: std::collections::VecDeque<(u64, H)>,
    snapshot: Vec<(String, String)>,
}

/// Reusable execution state for one [`Program::match_path`] call.
#[derive(Default)]
pub struct Runtime {
    captures: Vec<(u32, String, String)>,
}

impl Runtime {
    pub fn new() -> Self {
        Runtime { captures: Vec::new() }
    }

    fn reset(&mut self) {
        self.captures.clear();
    }
}

impl<H: Clone> Program<H> {
    /// Runs `path` against this program, returning every match in
    /// depth-first child order.
    pub fn match_path(&self, path: &str) -> Vec<Match<H>> {
        let mut runtime = Runtime::new();
        self.match_path_with(&mut runtime, path)
    }

    /// Same as [`Program::match_path`] but checks a [`Runtime`] out of
    /// `pool` instead of allocating a fresh one, returning it once the
    /// match is done.
    pub fn match_path_pooled(&self, pool: &RuntimePool, path: &str) -> Vec<Match<H>> {
        let mut runtime = pool.idle.lock().pop().unwrap_or_default();
        let result = self.match_path_with(&mut runtime, path);
        pool.idle.lock().push(runtime);
        result
    }

    /// Same as [`Program::match_path`] but reuses `runtime`'s buffers
    /// instead of allocating fresh ones.
    pub fn match_path_with(&self, runtime: &mut Runtime, path: &str) -> Vec<Match<H>> {
        runtime.reset();
        let input = path.as_bytes();
        let mut matches = Vec::new();
        let mut pending: Vec<Pending<H>> = Vec::new();

        if self.instructions.is_empty() {
            return matches;
        }

        let mut pc: i64 = 0;
        let mut pos: usize = 0;
        // pos_at_depth[d] is the input position as of first reaching depth
        // d: the entry state every sibling at that depth shares. A
        // transfer restores `pos` from here rather than leaving whatever
        // the abandoned branch left behind.
        let mut pos_at_depth: Vec<usize> = vec![0];

        loop {
            if pc < 0 {
                drain_all(&mut pending, &mut matches);
                break;
            }

            let instr = &self.instructions[pc as usize];
            debug_trace!("pc {} pos {}: {}", pc, pos, instruction_kind(instr));
            let frames = instr.frames() as usize;
            if pos_at_depth.len() <= frames {
                pos_at_depth.resize(frames + 1, 0);
            }
            pos_at_depth[frames] = pos;

            match instr {
                Instruction::MatchEpsilon { frames: _, on_err } => {
                    if pos < input.len() && input[pos] == b'/' {
                        pos += 1;
                        while pos < input.len() && input[pos] == b'/' {
                            pos += 1;
                        }
                        pc += 1;
                    } else if pos == input.len() {
                        // No trailing slash to consume, but nothing is left
                        // to match either: tolerate the missing separator.
                        pc += 1;
                    } else {
                        pc = take_transfer(*on_err, &mut pos, &mut pos_at_depth, &mut runtime.captures, &mut pending, &mut matches);
                    }
                }
                Instruction::MatchByte { byte, frames: _, on_err } => {
                    if pos < input.len() && input[pos] == *byte {
                        pos += 1;
                        pc += 1;
                    } else {
                        pc = take_transfer(*on_err, &mut pos, &mut pos_at_depth, &mut runtime.captures, &mut pending, &mut matches);
                    }
                }
                Instruction::MatchBytes { bytes, frames: _, on_err } => {
                    let b = bytes.as_bytes();
                    if input[pos..].starts_with(b) {
                        pos += b.len();
                        pc += 1;
                    } else {
                        pc = take_transfer(*on_err, &mut pos, &mut pos_at_depth, &mut runtime.captures, &mut pending, &mut matches);
                    }
                }
                Instruction::MatchVariable { var, regex, frames, on_err } => {
                    match match_variable_segments(input, pos, var, regex.map(|idx| &self.regexes[idx])) {
                        Some((new_pos, segments)) => {
                            for seg in segments {
                                runtime.captures.push((*frames, var.name.clone(), seg));
                            }
                            pos = new_pos;
                            pc += 1;
                        }
                        None => {
                            pc = take_transfer(*on_err, &mut pos, &mut pos_at_depth, &mut runtime.captures, &mut pending, &mut matches);
                        }
                    }
                }
                Instruction::MatchEnd { handlers, frames: _, jump } => {
                    if pos == input.len() {
                        debug_trace!("matchEnd accept at pc {}: {} handler(s)", pc, handlers.len());
                        // By the truncate-on-transfer invariant, every entry
                        // still in the log belongs to the path that led here.
                        let snapshot: Vec<(String, String)> =
                            runtime.captures.iter().map(|(_, n, v)| (n.clone(), v.clone())).collect();
                        let mut queue: std::collections::VecDeque<(u64, H)> =
                            handlers.iter().cloned().collect();
                        if let Some((id, h)) = queue.pop_front() {
                            matches.push(Match { handler_id: id, handler: h, captures: snapshot.clone() });
                        }
                        if !queue.is_empty() {
                            pending.push(Pending { threshold: jump.unwind, remaining: queue, snapshot });
                        }
                    }
                    pc = take_transfer(*jump, &mut pos, &mut pos_at_depth, &mut runtime.captures, &mut pending, &mut matches);
                }
            }
        }

        matches
    }
}

/// Name of an instruction's kind, for trace logging without requiring a
/// `Debug`/`Display` bound on `H` in the hot dispatch loop.
fn instruction_kind<H>(instr: &Instruction<H>) -> &'static str {
    match instr {
        Instruction::MatchEpsilon { .. } => "matchEpsilon",
        Instruction::MatchByte { .. } => "matchByte",
        Instruction::MatchBytes { .. } => "matchBytes",
        Instruction::MatchVariable { .. } => "matchVariable",
        Instruction::MatchEnd { .. } => "matchEnd",
    }
}

/// Resolves a transfer: restores `pos` and the capture log to the
/// target's depth and drains any pending multi-handler leaves whose
/// threshold the transfer unwinds past.
fn take_transfer<H>(
    target: Target,
    pos: &mut usize,
    pos_at_depth: &mut [usize],
    captures: &mut Vec<(u32, String, String)>,
    pending: &mut Vec<Pending<H>>,
    matches: &mut Vec<Match<H>>,
) -> i64 {
    captures.retain(|(d, _, _)| *d <= target.unwind);
    if target.pc < 0 {
        drain_all(pending, matches);
        return -1;
    }
    let target_depth = (target.unwind + 1) as usize;
    if let Some(&p) = pos_at_depth.get(target_depth) {
        *pos = p;
    }
    while let Some(top) = pending.last() {
        if target.unwind < top.threshold {
            let top = pending.last_mut().expect("just checked non-empty");
            if let Some((id, h)) = top.remaining.pop_front() {
                matches.push(Match { handler_id: id, handler: h, captures: top.snapshot.clone() });
            }
            if top.remaining.is_empty() {
                pending.pop();
            }
        } else {
            break;
        }
    }
    target.pc
}

/// Matches one variable starting at `pos`, consuming one path segment at
/// a time (bounded by `var.min`/`var.max`). An unbounded variable (`{*}`,
/// `{+}`) keeps crossing `/` separators and consuming further segments
/// until the input runs out, producing one capture entry per segment
/// rather than a single slurped string. A segment that matches empty is
/// allowed (when at least `min` segments are already satisfied) but
/// contributes no capture entry — this is why a trailing `{*}` with
/// nothing left to consume shows up as an empty capture list instead of
/// one empty-string entry.
fn match_variable_segments(
    input: &[u8],
    mut pos: usize,
    var: &crate::token::Variable,
    regex: Option<&regex::Regex>,
) -> Option<(usize, Vec<String>)> {
    let mut segments = Vec::new();
    let mut count: i64 = 0;
    loop {
        let seg_end = input[pos..].iter().position(|&b| b == b'/').map(|i| pos + i).unwrap_or(input.len());
        let seg = std::str::from_utf8(&input[pos..seg_end]).ok()?;

        if seg.is_empty() && count >= var.min {
            break;
        }

        if let Some(re) = regex {
            let ok = re.find(seg).map(|m| m.start() == 0 && m.end() == seg.len()).unwrap_or(false);
            if !ok {
                break;
            }
        }

        if !seg.is_empty() {
            segments.push(seg.to_string());
        }
        pos = seg_end;
        count += 1;

        if var.max != crate::token::UNBOUNDED && count >= var.max {
            break;
        }
        if pos < input.len() && input[pos] == b'/' {
            pos += 1;
            while pos < input.len() && input[pos] == b'/' {
                pos += 1;
            }
            continue;
        }
        break;
    }

    if count < var.min {
        return None;
    }
    Some((pos, segments))
}

fn drain_all<H>(pending: &mut Vec<Pending<H>>, matches: &mut Vec<Match<H>>) {
    while let Some(mut top) = pending.pop() {
        while let Some((id, h)) = top.remaining.pop_front() {
            matches.push(Match { handler_id: id, handler: h, captures: top.snapshot.clone() });
        }
    }
}

/// A pool of reusable [`Runtime`] buffers, so concurrent `Match` calls
/// against one immutable [`Program`] don't each allocate fresh capture
/// storage. Safe to share across threads; checked out runtimes are
/// always returned clean.
#[derive(Default)]
pub struct RuntimePool {
    idle: Mutex<Vec<Runtime>>,
}

impl RuntimePool {
    pub fn new() -> Self {
        RuntimePool { idle: Mutex::new(Vec::new()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::Trie;

    fn sample_program() -> Program<&'static str> {
        let mut t = Trie::new();
        t.insert("/_git/blobs/{hash([0-9a-f]{40})}", "blob").unwrap();
        t.insert("/admin/{*}", "auth-check").unwrap();
        t.insert("/admin/auth", "auth").unwrap();
        t.insert("/admin/{*}", "admin").unwrap();
        t.insert("/about/{*}", "about").unwrap();
        t.insert("/{prepass(about-.*)}/{*}", "about-prepass").unwrap();
        t.insert("/about-us/{*}", "about").unwrap();
        t.insert("/about-office/{*}", "about").unwrap();
        t.insert("/{*}", "public").unwrap();
        crate::optimizer::optimize(&mut t);
        crate::compiler::compile(&t)
    }

    fn ids(matches: &[Match<&'static str>]) -> Vec<u64> {
        matches.iter().map(|m| m.handler_id).collect()
    }

    #[test]
    fn s1_admin_double_slash_auth() {
        let prog = sample_program();
        let matches = prog.match_path("/admin//auth");
        assert_eq!(ids(&matches), vec![1, 2, 3, 8]);
        assert_eq!(matches[0].captures, vec![("1".to_string(), "auth".to_string())]);
        assert_eq!(matches[1].captures, Vec::<(String, String)>::new());
        assert_eq!(matches[2].captures, vec![("1".to_string(), "auth".to_string())]);
        assert_eq!(
            matches[3].captures,
            vec![("1".to_string(), "admin".to_string()), ("1".to_string(), "auth".to_string())]
        );
    }

    // The regex-constrained `prepass` branch outranks its root siblings
    // (see `trie::child_priority`), so it is tried before the much
    // bushier "about*" literal branch even though its own subtree is
    // far smaller.
    #[test]
    fn s2_about_office_no_trailing_segment() {
        let prog = sample_program();
        let matches = prog.match_path("/about-office");
        assert_eq!(ids(&matches), vec![5, 7, 8]);
        assert_eq!(matches[0].captures, vec![("prepass".to_string(), "about-office".to_string())]);
        assert_eq!(matches[1].captures, Vec::<(String, String)>::new());
        assert_eq!(matches[2].captures, vec![("1".to_string(), "about-office".to_string())]);
    }

    #[test]
    fn s3_about_office_with_trailing_segment() {
        let prog = sample_program();
        let matches = prog.match_path("/about-office/test");
        assert_eq!(ids(&matches), vec![5, 7, 8]);
        assert_eq!(
            matches[0].captures,
            vec![("prepass".to_string(), "about-office".to_string()), ("1".to_string(), "test".to_string())]
        );
        assert_eq!(matches[1].captures, vec![("1".to_string(), "test".to_string())]);
        assert_eq!(
            matches[2].captures,
            vec![("1".to_string(), "about-office".to_string()), ("1".to_string(), "test".to_string())]
        );
    }

    #[test]
    fn no_match_yields_empty_list() {
        let mut t: Trie<&'static str> = Trie::new();
        t.insert("/only", "x").unwrap();
        crate::optimizer::optimize(&mut t);
        let prog = crate::compiler::compile(&t);
        assert!(prog.match_path("/nope").is_empty());
    }

    #[test]
    fn matches_a_non_ascii_literal_byte_for_byte() {
        let mut t: Trie<&'static str> = Trie::new();
        t.insert("/abé", "e").unwrap();
        t.insert("/abz", "z").unwrap();
        crate::optimizer::optimize(&mut t);
        let prog = crate::compiler::compile(&t);
        assert_eq!(ids(&prog.match_path("/abé")), vec![0]);
        assert_eq!(ids(&prog.match_path("/abz")), vec![1]);
    }

    #[test]
    fn pool_reuses_runtime_buffers() {
        let prog = sample_program();
        let pool = RuntimePool::new();
        let a = prog.match_path_pooled(&pool, "/admin//auth");
        let b = prog.match_path_pooled(&pool, "/admin//auth");
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(pool.idle.lock().len(), 1);
    }
}
