//! Semiring algebra used for every weight computation in the decoder.
//!
//! Weights are plain `f32`; the semiring decides what they mean.
//!
//! | semiring      | zero | one | plus            | times |
//! |---------------|------|-----|-----------------|-------|
//! | tropical      | +∞   | 0   | min             | +     |
//! | log           | +∞   | 0   | -ln(e⁻ᵃ + e⁻ᵇ)  | +     |
//! | probability   | 0    | 1   | +               | ×     |
//!
//! The tropical and log semirings carry **costs** (negative natural-log
//! probabilities, lower is better); the probability semiring carries linear
//! values (higher is better). [`SemiringKind`] is the serialisable tag that
//! automata, active lists and lattices carry around; it implements
//! [`Semiring`] by dispatching to the unit structs below.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Abstract weight algebra.
///
/// Laws every implementation upholds (checked by the property tests):
/// `plus(zero, x) == x`, `times(one, x) == x`, `times(zero, x) == zero`.
pub trait Semiring: Copy + fmt::Debug + Send + Sync + 'static {
    /// Tag of this semiring.
    fn kind(&self) -> SemiringKind;
    /// Additive identity ("no path").
    fn zero(&self) -> f32;
    /// Multiplicative identity ("free path").
    fn one(&self) -> f32;
    /// Combine alternative paths.
    fn plus(&self, a: f32, b: f32) -> f32;
    /// Extend a path.
    fn times(&self, a: f32, b: f32) -> f32;
    /// Inverse of [`Semiring::times`]; dividing by `zero()` yields `zero()`.
    fn divide(&self, a: f32, b: f32) -> f32;
    /// `w` multiplied with itself `k` times (real exponent allowed).
    fn power(&self, w: f32, k: f32) -> f32;
    /// Natural order: `true` when `a` is strictly better than `b`.
    fn better(&self, a: f32, b: f32) -> bool;
    /// Weight of an event with natural-log probability `ln_p`.
    fn from_ln_probability(&self, ln_p: f32) -> f32;
    /// Natural-log probability of weight `w`.
    fn to_ln_probability(&self, w: f32) -> f32;

    /// Whether `w` is a valid element of the semiring.
    fn is_member(&self, w: f32) -> bool {
        !w.is_nan()
    }

    /// Weight of an event with linear probability `p`.
    fn from_probability(&self, p: f32) -> f32 {
        self.from_ln_probability(p.ln())
    }

    /// `w` expressed as a cost (`-ln p`), whatever the semiring.
    fn to_cost(&self, w: f32) -> f32 {
        -self.to_ln_probability(w)
    }

    /// Equality within `delta`; identical infinities compare equal.
    fn approx_eq(&self, a: f32, b: f32, delta: f32) -> bool {
        a == b || (a - b).abs() <= delta
    }
}

/* --------------------------------------------------------------------- */
/*  Tropical                                                             */

/// Min-plus over costs; the default for Viterbi search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TropicalSemiring;

impl Semiring for TropicalSemiring {
    fn kind(&self) -> SemiringKind {
        SemiringKind::Tropical
    }

    #[inline]
    fn zero(&self) -> f32 {
        f32::INFINITY
    }

    #[inline]
    fn one(&self) -> f32 {
        0.0
    }

    #[inline]
    fn plus(&self, a: f32, b: f32) -> f32 {
        a.min(b)
    }

    #[inline]
    fn times(&self, a: f32, b: f32) -> f32 {
        cost_times(a, b)
    }

    fn divide(&self, a: f32, b: f32) -> f32 {
        cost_divide(a, b)
    }

    fn power(&self, w: f32, k: f32) -> f32 {
        cost_power(w, k)
    }

    #[inline]
    fn better(&self, a: f32, b: f32) -> bool {
        a < b
    }

    fn from_ln_probability(&self, ln_p: f32) -> f32 {
        -ln_p
    }

    fn to_ln_probability(&self, w: f32) -> f32 {
        -w
    }

    fn is_member(&self, w: f32) -> bool {
        !w.is_nan() && w != f32::NEG_INFINITY
    }
}

/* --------------------------------------------------------------------- */
/*  Log                                                                  */

/// Log-sum-exp over costs; what forward-backward needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogSemiring;

impl Semiring for LogSemiring {
    fn kind(&self) -> SemiringKind {
        SemiringKind::Log
    }

    #[inline]
    fn zero(&self) -> f32 {
        f32::INFINITY
    }

    #[inline]
    fn one(&self) -> f32 {
        0.0
    }

    fn plus(&self, a: f32, b: f32) -> f32 {
        if a == f32::INFINITY {
            return b;
        }
        if b == f32::INFINITY {
            return a;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        lo - (lo - hi).exp().ln_1p()
    }

    #[inline]
    fn times(&self, a: f32, b: f32) -> f32 {
        cost_times(a, b)
    }

    fn divide(&self, a: f32, b: f32) -> f32 {
        cost_divide(a, b)
    }

    fn power(&self, w: f32, k: f32) -> f32 {
        cost_power(w, k)
    }

    #[inline]
    fn better(&self, a: f32, b: f32) -> bool {
        a < b
    }

    fn from_ln_probability(&self, ln_p: f32) -> f32 {
        -ln_p
    }

    fn to_ln_probability(&self, w: f32) -> f32 {
        -w
    }

    fn is_member(&self, w: f32) -> bool {
        !w.is_nan() && w != f32::NEG_INFINITY
    }
}

/* --------------------------------------------------------------------- */
/*  Probability                                                          */

/// Sum-product over linear values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbabilitySemiring;

impl Semiring for ProbabilitySemiring {
    fn kind(&self) -> SemiringKind {
        SemiringKind::Probability
    }

    #[inline]
    fn zero(&self) -> f32 {
        0.0
    }

    #[inline]
    fn one(&self) -> f32 {
        1.0
    }

    #[inline]
    fn plus(&self, a: f32, b: f32) -> f32 {
        a + b
    }

    fn times(&self, a: f32, b: f32) -> f32 {
        if a == 0.0 || b == 0.0 { 0.0 } else { a * b }
    }

    fn divide(&self, a: f32, b: f32) -> f32 {
        if b == 0.0 { 0.0 } else { a / b }
    }

    fn power(&self, w: f32, k: f32) -> f32 {
        if k == 0.0 { 1.0 } else { w.powf(k) }
    }

    #[inline]
    fn better(&self, a: f32, b: f32) -> bool {
        a > b
    }

    fn from_ln_probability(&self, ln_p: f32) -> f32 {
        ln_p.exp()
    }

    fn to_ln_probability(&self, w: f32) -> f32 {
        w.ln()
    }

    fn from_probability(&self, p: f32) -> f32 {
        p
    }

    fn is_member(&self, w: f32) -> bool {
        !w.is_nan() && w >= 0.0
    }
}

/* --------------------------------------------------------------------- */
/*  Shared cost-domain helpers                                           */

#[inline]
fn cost_times(a: f32, b: f32) -> f32 {
    if a == f32::INFINITY || b == f32::INFINITY {
        f32::INFINITY
    } else {
        a + b
    }
}

#[inline]
fn cost_divide(a: f32, b: f32) -> f32 {
    if a == f32::INFINITY || b == f32::INFINITY {
        f32::INFINITY
    } else {
        a - b
    }
}

#[inline]
fn cost_power(w: f32, k: f32) -> f32 {
    if k == 0.0 {
        0.0
    } else if w == f32::INFINITY {
        f32::INFINITY
    } else {
        w * k
    }
}

/* --------------------------------------------------------------------- */
/*  Tag                                                                  */

/// Serialisable semiring tag, carried by automata, active lists and lattices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemiringKind {
    #[default]
    Tropical,
    Log,
    Probability,
}

impl fmt::Display for SemiringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tropical => write!(f, "tropical"),
            Self::Log => write!(f, "log"),
            Self::Probability => write!(f, "probability"),
        }
    }
}

macro_rules! dispatch {
    ($kind:expr, $s:ident => $body:expr) => {
        match $kind {
            SemiringKind::Tropical => {
                let $s = TropicalSemiring;
                $body
            }
            SemiringKind::Log => {
                let $s = LogSemiring;
                $body
            }
            SemiringKind::Probability => {
                let $s = ProbabilitySemiring;
                $body
            }
        }
    };
}

impl Semiring for SemiringKind {
    fn kind(&self) -> SemiringKind {
        *self
    }

    #[inline]
    fn zero(&self) -> f32 {
        dispatch!(self, s => s.zero())
    }

    #[inline]
    fn one(&self) -> f32 {
        dispatch!(self, s => s.one())
    }

    #[inline]
    fn plus(&self, a: f32, b: f32) -> f32 {
        dispatch!(self, s => s.plus(a, b))
    }

    #[inline]
    fn times(&self, a: f32, b: f32) -> f32 {
        dispatch!(self, s => s.times(a, b))
    }

    fn divide(&self, a: f32, b: f32) -> f32 {
        dispatch!(self, s => s.divide(a, b))
    }

    fn power(&self, w: f32, k: f32) -> f32 {
        dispatch!(self, s => s.power(w, k))
    }

    #[inline]
    fn better(&self, a: f32, b: f32) -> bool {
        dispatch!(self, s => s.better(a, b))
    }

    fn from_ln_probability(&self, ln_p: f32) -> f32 {
        dispatch!(self, s => s.from_ln_probability(ln_p))
    }

    fn to_ln_probability(&self, w: f32) -> f32 {
        dispatch!(self, s => s.to_ln_probability(w))
    }

    fn is_member(&self, w: f32) -> bool {
        dispatch!(self, s => s.is_member(w))
    }

    fn from_probability(&self, p: f32) -> f32 {
        dispatch!(self, s => s.from_probability(p))
    }
}

/* ───────────────────────────── tests ──────────────────────────────── */
