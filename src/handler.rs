//! The handler contract: the core stores an opaque value per leaf and
//! never invokes or inspects it.

use std::fmt;

/// Distinguishes "route matched but declines to serve" from a true
/// error, purely as a caller convention. The core never constructs or
/// inspects this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pass;

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass")
    }
}
