//! Condition DSL and query-plan normalization
//!
//! A `Handle` is an opaque reference to an active index, obtained from the
//! store facade. Comparing a handle against a scalar literal yields a
//! `Condition` value. Comparisons return values, not booleans, so boolean
//! combinators simply do not exist on conditions: "and" is expressed by
//! passing several conditions to `list`, and "or" is unrepresentable.
//!
//! Handle-to-handle comparison and comparison against non-scalar literals
//! are unrepresentable too: the comparison methods only accept
//! `Into<Scalar>` arguments.
//!
//! ## Normalization
//!
//! `QueryPlan::compile` partitions conditions by index, folds equalities
//! and bounds into one interval per index, and detects contradictions.
//! A contradictory query compiles to an empty plan that the facade answers
//! without consulting the backend. Backends receive the normalized form
//! only.

use crate::error::{Error, Result};
use crate::value::{Scalar, ScalarType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

// =============================================================================
// Handle and Condition
// =============================================================================

/// Opaque reference to an active index on one collection
///
/// The only thing the DSL can compare. Obtained from the facade, which
/// guarantees the referenced index was active at handle creation time.
///
/// Deliberately not `PartialEq`: `a.eq(b)` between two handles must not
/// compile, and none of the comparison methods accept a handle.
#[derive(Debug, Clone)]
pub struct Handle {
    collection: String,
    index: String,
}

impl Handle {
    /// Construct a handle; crate-external callers go through the facade
    pub fn new(collection: impl Into<String>, index: impl Into<String>) -> Self {
        Handle {
            collection: collection.into(),
            index: index.into(),
        }
    }

    /// Collection this handle belongs to
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Index name this handle refers to
    pub fn index(&self) -> &str {
        &self.index
    }

    /// `index == literal`
    pub fn eq(&self, literal: impl Into<Scalar>) -> Condition {
        self.cmp(CmpOp::Eq, literal)
    }

    /// `index < literal`
    pub fn lt(&self, literal: impl Into<Scalar>) -> Condition {
        self.cmp(CmpOp::Lt, literal)
    }

    /// `index <= literal`
    pub fn le(&self, literal: impl Into<Scalar>) -> Condition {
        self.cmp(CmpOp::Le, literal)
    }

    /// `index > literal`
    pub fn gt(&self, literal: impl Into<Scalar>) -> Condition {
        self.cmp(CmpOp::Gt, literal)
    }

    /// `index >= literal`
    pub fn ge(&self, literal: impl Into<Scalar>) -> Condition {
        self.cmp(CmpOp::Ge, literal)
    }

    fn cmp(&self, op: CmpOp, literal: impl Into<Scalar>) -> Condition {
        Condition {
            index: self.index.clone(),
            op,
            value: literal.into(),
        }
    }
}

/// Comparison operator inside a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    /// Equal
    Eq,
    /// Strictly less than
    Lt,
    /// Less than or equal
    Le,
    /// Strictly greater than
    Gt,
    /// Greater than or equal
    Ge,
}

/// One range condition over one index
///
/// Immutable and cheap to clone; safe to share across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    index: String,
    op: CmpOp,
    value: Scalar,
}

impl Condition {
    /// Index name this condition constrains
    pub fn index(&self) -> &str {
        &self.index
    }

    /// The comparison operator
    pub fn op(&self) -> CmpOp {
        self.op
    }

    /// The literal being compared against
    pub fn value(&self) -> &Scalar {
        &self.value
    }
}

// =============================================================================
// Interval
// =============================================================================

/// A half-open or closed interval over one index's values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Lower bound
    pub lower: Bound<Scalar>,
    /// Upper bound
    pub upper: Bound<Scalar>,
}

impl Interval {
    /// The unconstrained interval
    pub fn full() -> Self {
        Interval {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Tighten the lower bound, keeping the stricter of the two
    fn tighten_lower(&mut self, candidate: Bound<Scalar>) {
        self.lower = stricter(self.lower.clone(), candidate, true);
    }

    /// Tighten the upper bound, keeping the stricter of the two
    fn tighten_upper(&mut self, candidate: Bound<Scalar>) {
        self.upper = stricter(self.upper.clone(), candidate, false);
    }

    /// True when no scalar can satisfy both bounds
    ///
    /// Both bounds are known to share one type tag by construction.
    pub fn is_empty(&self) -> bool {
        let (lo, hi) = match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => return false,
            (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) => {
                (lo, hi)
            }
        };
        match lo.compare_same_type(hi) {
            Some(std::cmp::Ordering::Less) => false,
            Some(std::cmp::Ordering::Equal) => !matches!(
                (&self.lower, &self.upper),
                (Bound::Included(_), Bound::Included(_))
            ),
            Some(std::cmp::Ordering::Greater) => true,
            // Mixed tags cannot be constructed through compile()
            None => true,
        }
    }

    /// True when `value` lies inside the interval
    pub fn contains(&self, value: &Scalar) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(lo) => matches!(
                value.compare_same_type(lo),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
            Bound::Excluded(lo) => {
                matches!(value.compare_same_type(lo), Some(std::cmp::Ordering::Greater))
            }
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(hi) => matches!(
                value.compare_same_type(hi),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ),
            Bound::Excluded(hi) => {
                matches!(value.compare_same_type(hi), Some(std::cmp::Ordering::Less))
            }
        };
        above_lower && below_upper
    }
}

/// Pick the stricter of two bounds on the same side
fn stricter(current: Bound<Scalar>, candidate: Bound<Scalar>, is_lower: bool) -> Bound<Scalar> {
    use std::cmp::Ordering;
    match (&current, &candidate) {
        (Bound::Unbounded, _) => candidate,
        (_, Bound::Unbounded) => current,
        (
            Bound::Included(a) | Bound::Excluded(a),
            Bound::Included(b) | Bound::Excluded(b),
        ) => {
            // Same tag guaranteed by compile-time type checking
            let ord = a.compare_same_type(b).unwrap_or(Ordering::Equal);
            match ord {
                Ordering::Equal => {
                    // Exclusive beats inclusive at the same endpoint
                    if matches!(current, Bound::Excluded(_)) {
                        current
                    } else {
                        candidate
                    }
                }
                Ordering::Less => {
                    if is_lower {
                        candidate
                    } else {
                        current
                    }
                }
                Ordering::Greater => {
                    if is_lower {
                        current
                    } else {
                        candidate
                    }
                }
            }
        }
    }
}

// =============================================================================
// QueryPlan
// =============================================================================

/// Normalized query: one interval per referenced index
///
/// A query's result set is the intersection of the per-index intervals.
/// An empty plan (contradiction detected) is answered without consulting
/// the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    ranges: BTreeMap<String, Interval>,
    empty: bool,
}

impl QueryPlan {
    /// Compile a set of conditions into a normalized plan
    ///
    /// `value_types` maps each queryable index to its persisted value type
    /// (`None` while type inference is deferred on an empty collection).
    /// Conditions referencing indexes absent from the map are the caller's
    /// bug; the facade raises `UnknownIndexError` before compiling.
    pub fn compile(
        conditions: &[Condition],
        value_types: &BTreeMap<String, Option<ScalarType>>,
    ) -> Result<QueryPlan> {
        let mut ranges: BTreeMap<String, Interval> = BTreeMap::new();
        let mut empty = false;

        for cond in conditions {
            let literal = cond.value();
            if !literal.is_storable() {
                return Err(Error::invalid_condition(format!(
                    "non-finite float literal on index {:?}",
                    cond.index()
                )));
            }
            match value_types.get(cond.index()) {
                Some(Some(expected)) if *expected != literal.scalar_type() => {
                    return Err(Error::invalid_condition(format!(
                        "index {:?} holds {}, compared against {}",
                        cond.index(),
                        expected,
                        literal.scalar_type()
                    )));
                }
                Some(_) => {}
                None => {
                    return Err(Error::invalid_condition(format!(
                        "index {:?} not known to the plan compiler",
                        cond.index()
                    )));
                }
            }

            let interval = ranges
                .entry(cond.index().to_string())
                .or_insert_with(Interval::full);

            // Two conditions on the same index must agree on the tag too
            let prior_tag = [&interval.lower, &interval.upper]
                .into_iter()
                .find_map(|b| match b {
                    Bound::Included(s) | Bound::Excluded(s) => Some(s.scalar_type()),
                    Bound::Unbounded => None,
                });
            if let Some(tag) = prior_tag {
                if tag != literal.scalar_type() {
                    return Err(Error::invalid_condition(format!(
                        "mixed literal types on index {:?}",
                        cond.index()
                    )));
                }
            }

            match cond.op() {
                CmpOp::Eq => {
                    interval.tighten_lower(Bound::Included(literal.clone()));
                    interval.tighten_upper(Bound::Included(literal.clone()));
                }
                CmpOp::Lt => interval.tighten_upper(Bound::Excluded(literal.clone())),
                CmpOp::Le => interval.tighten_upper(Bound::Included(literal.clone())),
                CmpOp::Gt => interval.tighten_lower(Bound::Excluded(literal.clone())),
                CmpOp::Ge => interval.tighten_lower(Bound::Included(literal.clone())),
            }

            if interval.is_empty() {
                empty = true;
            }
        }

        Ok(QueryPlan { ranges, empty })
    }

    /// Plan that matches every record (the empty query)
    pub fn unconstrained() -> Self {
        QueryPlan {
            ranges: BTreeMap::new(),
            empty: false,
        }
    }

    /// True when the plan provably matches nothing
    pub fn is_empty_result(&self) -> bool {
        self.empty
    }

    /// True when no index is constrained (match everything)
    pub fn is_unconstrained(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The per-index intervals
    pub fn ranges(&self) -> &BTreeMap<String, Interval> {
        &self.ranges
    }

    /// Number of constrained indexes
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// True when the plan constrains no index
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
