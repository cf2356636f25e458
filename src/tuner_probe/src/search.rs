//! Locating message sizes where the tuner changes its mind.
//!
//! The search bisects `[min, max]` and stops descending as soon as both
//! ends of an interval agree. A decision that changes and changes back
//! strictly inside such an interval is therefore not reported; the
//! result is exact only when the decision is a step function of size.

use crate::error::{Error, Result};
use crate::{Breakpoint, QueryResult};

/// Returns the breakpoints of `query` over the inclusive range `[min, max]`.
///
/// Adjacent entries carry different decisions, except when the whole range
/// is constant: then both endpoints are returned as they are. Each
/// non-initial entry is the smallest probed size of its decision run, so a
/// transition at size `s` shows up as an entry at exactly `s`.
///
/// The first failing query aborts the search and its error is returned.
pub fn find_breakpoints<F>(min: usize, max: usize, mut query: F) -> Result<Vec<Breakpoint>>
where
    F: FnMut(usize) -> Result<QueryResult>,
{
    if min == 0 || max < min {
        return Err(Error::InvalidRange(min, max));
    }
    if min == max {
        return Ok(vec![Breakpoint::new(min, query(min)?)]);
    }
    bisect(min, max, &mut query)
}

fn bisect<F>(min: usize, max: usize, query: &mut F) -> Result<Vec<Breakpoint>>
where
    F: FnMut(usize) -> Result<QueryResult>,
{
    let lo = Breakpoint::new(min, query(min)?);
    let hi = Breakpoint::new(max, query(max)?);
    log::trace!("bisect [{}, {}]: {} .. {}", min, max, lo.decision(), hi.decision());

    if lo.decision() == hi.decision() || max - min <= 1 {
        return Ok(vec![lo, hi]);
    }

    let mid = min + (max - min) / 2;
    let mut combined = bisect(min, mid, query)?;
    let right = bisect(mid, max, query)?;
    // both halves contain mid
    combined.extend(right.into_iter().skip(1));
    combined.dedup_by(|cur, prev| cur.decision() == prev.decision());
    Ok(combined)
}
