//! Semirings parametrize every algorithm of this crate. A semiring consists of a value domain,
//! represented here by [`Weight`], together with two operations: `extend` combines the weights
//! along a path, `collect` combines the weights of alternative paths. `zero` is the identity of
//! `collect` and annihilates under `extend`, `one` is the identity of `extend`.
//!
//! All semirings are stateless and exist exactly once as a process wide static, so a
//! [`ConstSemiringRef`] is simply a `&'static dyn Semiring` and semirings can be compared through
//! their [`SemiringType`].
use std::cmp::Ordering;
use std::fmt::Debug;

/// A weight of one of the semirings in this module. Each semiring only ever produces the variant
/// it is responsible for, plus [`Weight::Invalid`] which signals a domain error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weight {
    /// Tropical and log weights: negative log probabilities.
    Real(f32),
    /// Weights of the count semiring; `u32::MAX` represents infinity.
    Count(u32),
    /// Weights of the expectation semiring: a log weight together with the expectation of an
    /// additive risk under that weight.
    Pair {
        /// The negative log probability.
        score: f32,
        /// The expected risk.
        risk: f32,
    },
    /// Returned instead of failing, e.g. when inverting a weight of a semiring that has no
    /// inverse or when parsing fails.
    Invalid,
}

impl Weight {
    /// Returns false for [`Weight::Invalid`].
    pub fn is_valid(&self) -> bool {
        !matches!(self, Weight::Invalid)
    }

    /// The scalar value of the weight, i.e. the real value, the count or the score.
    pub fn value(&self) -> f32 {
        match *self {
            Weight::Real(v) => v,
            Weight::Count(c) => c as f32,
            Weight::Pair { score, .. } => score,
            Weight::Invalid => f32::NAN,
        }
    }
}

impl From<f32> for Weight {
    fn from(value: f32) -> Self {
        Weight::Real(value)
    }
}

impl From<u32> for Weight {
    fn from(value: u32) -> Self {
        Weight::Count(value)
    }
}

/// Identifies a semiring, e.g. in the header of the binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemiringType {
    /// Not known.
    Unknown = 0,
    /// [`LogSemiring`].
    Log = 1,
    /// [`TropicalSemiring`].
    Tropical = 2,
    /// [`CountSemiring`].
    Count = 3,
    /// [`ExpectationSemiring`].
    Expectation = 4,
}

impl SemiringType {
    /// The tag used in the binary format.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Inverse of [`SemiringType::tag`].
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Unknown),
            1 => Some(Self::Log),
            2 => Some(Self::Tropical),
            3 => Some(Self::Count),
            4 => Some(Self::Expectation),
            _ => None,
        }
    }

    /// The name used in textual formats.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Log => "log",
            Self::Tropical => "tropical",
            Self::Count => "count",
            Self::Expectation => "expectation",
        }
    }

    /// Inverse of [`SemiringType::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::Unknown,
            Self::Log,
            Self::Tropical,
            Self::Count,
            Self::Expectation,
        ]
        .into_iter()
        .find(|t| t.name() == name)
    }

    /// Returns the singleton of the semiring, `None` for [`SemiringType::Unknown`].
    pub fn semiring(self) -> Option<ConstSemiringRef> {
        match self {
            Self::Unknown => None,
            Self::Log => Some(log()),
            Self::Tropical => Some(tropical()),
            Self::Count => Some(count_semiring()),
            Self::Expectation => Some(expectation()),
        }
    }
}

/// The operations of a semiring. Domain errors never panic, they produce [`Weight::Invalid`].
pub trait Semiring: Debug {
    /// Identifies the semiring.
    fn kind(&self) -> SemiringType;

    /// The human readable name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Identity of `collect`, annihilator of `extend`.
    fn zero(&self) -> Weight;
    /// Identity of `extend`.
    fn one(&self) -> Weight;
    /// The largest weight with respect to [`Semiring::compare`].
    fn max(&self) -> Weight;
    /// Combines weights along a path.
    fn extend(&self, a: Weight, b: Weight) -> Weight;
    /// Combines weights of alternative paths.
    fn collect(&self, a: Weight, b: Weight) -> Weight;
    /// Whether [`Semiring::invert`] is available.
    fn has_invert(&self) -> bool {
        true
    }
    /// The inverse with respect to `extend`. Only defined for weakly divisible semirings,
    /// all others return [`Weight::Invalid`].
    fn invert(&self, a: Weight) -> Weight;
    /// A total order on weights, "smaller" means "better". [`Weight::Invalid`] and weights of
    /// other semirings sort after [`Semiring::max`].
    fn compare(&self, a: Weight, b: Weight) -> Ordering;
    /// A hash value that agrees for weights that compare equal up to rounding.
    fn hash(&self, a: Weight) -> u64;
    /// Whether `a` is `one`. Default weights are omitted in textual output.
    fn is_default(&self, a: Weight) -> bool {
        self.compare(a, self.one()) == Ordering::Equal
    }
    /// Textual representation.
    fn format(&self, a: Weight) -> String;
    /// Inverse of [`Semiring::format`].
    fn parse(&self, s: &str) -> Weight;
    /// Number of bytes [`Semiring::compress`] produces.
    fn compressed_size(&self) -> usize {
        4
    }
    /// Appends the fixed width little endian binary representation of `a`.
    fn compress(&self, a: Weight, out: &mut Vec<u8>);
    /// Reads a weight written by [`Semiring::compress`] from the front of `bytes`.
    fn uncompress(&self, bytes: &[u8]) -> Weight;

    /// Converts a probability to a weight, [`Weight::Invalid`] if `p` is not a probability or
    /// the semiring has no probabilistic interpretation.
    fn from_probability(&self, p: f64) -> Weight {
        let _ = p;
        Weight::Invalid
    }
    /// Inverse of [`Semiring::from_probability`].
    fn to_probability(&self, a: Weight) -> Option<f64> {
        let _ = a;
        None
    }

    /// Collects all weights produced by the iterator, `zero` if it is empty.
    fn collect_all(&self, weights: &mut dyn Iterator<Item = Weight>) -> Weight {
        weights.fold(self.zero(), |acc, w| self.collect(acc, w))
    }
    /// Extends all weights produced by the iterator, `one` if it is empty.
    fn extend_all(&self, weights: &mut dyn Iterator<Item = Weight>) -> Weight {
        weights.fold(self.one(), |acc, w| self.extend(acc, w))
    }
}

/// Shared reference to one of the semiring singletons.
pub type ConstSemiringRef = &'static dyn Semiring;

/// Two semiring references denote the same semiring iff they have the same type.
pub fn same_semiring(a: ConstSemiringRef, b: ConstSemiringRef) -> bool {
    a.kind() == b.kind()
}

/// Converts a weight of `from` into a weight of `to`. `zero` and `one` map onto their
/// counterparts, all other weights by their scalar value: reals are rounded to counts, counts
/// become reals and pair scores become reals or pairs without risk. Weights without a
/// counterpart, e.g. negative reals in the count semiring, become [`Weight::Invalid`].
pub fn convert(w: Weight, from: ConstSemiringRef, to: ConstSemiringRef) -> Weight {
    if same_semiring(from, to) || !w.is_valid() {
        return w;
    }
    if from.compare(w, from.zero()) == Ordering::Equal {
        return to.zero();
    }
    if from.compare(w, from.one()) == Ordering::Equal {
        return to.one();
    }
    let v = match w {
        Weight::Count(u32::MAX) => f32::INFINITY,
        w => w.value(),
    };
    match to.kind() {
        SemiringType::Count if v == f32::INFINITY => Weight::Count(u32::MAX),
        SemiringType::Count if v >= 0.0 => Weight::Count(v.round() as u32),
        SemiringType::Count | SemiringType::Unknown => Weight::Invalid,
        SemiringType::Expectation => Weight::Pair {
            score: v,
            risk: 0.0,
        },
        SemiringType::Log | SemiringType::Tropical => Weight::Real(v),
    }
}

/// Number of units in the last place up to which two reals are considered equal.
pub const ULP_TOLERANCE: u32 = 16;

fn almost_equal_ulp(a: f32, b: f32, tolerance: u32) -> bool {
    if a == b {
        return true;
    }
    if a.is_nan() || b.is_nan() || a.is_sign_negative() != b.is_sign_negative() {
        return false;
    }
    (a.to_bits() as i64 - b.to_bits() as i64).unsigned_abs() <= tolerance as u64
}

fn compare_reals(a: f32, b: f32) -> Ordering {
    if almost_equal_ulp(a, b, ULP_TOLERANCE) {
        Ordering::Equal
    } else if a < b {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Hashes the float bits rounded to a multiple of 64 units in the last place. Values with few
/// significant mantissa bits, e.g. small integers and their halves, sit in the middle of their
/// bucket and share it with everything up to [`ULP_TOLERANCE`] away.
fn hash_real(a: f32) -> u64 {
    let a = if a == 0.0 { 0.0f32 } else { a };
    fxhash::hash64(&((a.to_bits() as u64 + 32) >> 6))
}

fn real(a: Weight) -> Option<f32> {
    match a {
        Weight::Real(v) => Some(v),
        _ => None,
    }
}

/// Invalid weights sort after every valid weight, including `max`.
fn compare_validity(a: bool, b: bool) -> Ordering {
    b.cmp(&a)
}

const INVALID_HASH: u64 = u64::MAX;

fn uncompress_f32(bytes: &[u8]) -> Option<f32> {
    Some(f32::from_le_bytes(bytes.get(..4)?.try_into().ok()?))
}

/// The log semiring over negative log probabilities: `extend` is `+`, `collect` is
/// `-log(exp(-a) + exp(-b))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSemiring;

/// The tropical semiring: `extend` is `+`, `collect` is `min`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TropicalSemiring;

/// Counts paths: `extend` is multiplication, `collect` is addition, both saturating at
/// `u32::MAX`, which represents infinity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountSemiring;

/// The expectation semiring on top of the log semiring. A weight is a pair of a log score and the
/// expectation of an additive risk among all paths represented by the weight. Risks add up along
/// a path and are averaged, weighted by their probabilities, across alternatives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectationSemiring;

static LOG: LogSemiring = LogSemiring;
static TROPICAL: TropicalSemiring = TropicalSemiring;
static COUNT: CountSemiring = CountSemiring;
static EXPECTATION: ExpectationSemiring = ExpectationSemiring;

/// The log semiring singleton.
pub fn log() -> ConstSemiringRef {
    &LOG
}

/// The tropical semiring singleton.
pub fn tropical() -> ConstSemiringRef {
    &TROPICAL
}

/// The count semiring singleton.
pub fn count_semiring() -> ConstSemiringRef {
    &COUNT
}

/// The expectation semiring singleton.
pub fn expectation() -> ConstSemiringRef {
    &EXPECTATION
}

fn log_add(a: f32, b: f32) -> f32 {
    if a == f32::INFINITY {
        return b;
    }
    if b == f32::INFINITY {
        return a;
    }
    let (min, max) = if a < b { (a, b) } else { (b, a) };
    min - (min - max).exp().ln_1p()
}

macro_rules! real_semiring_common {
    () => {
        fn zero(&self) -> Weight {
            Weight::Real(f32::INFINITY)
        }

        fn one(&self) -> Weight {
            Weight::Real(0.0)
        }

        fn max(&self) -> Weight {
            Weight::Real(f32::INFINITY)
        }

        fn extend(&self, a: Weight, b: Weight) -> Weight {
            match (a, b) {
                (Weight::Real(a), Weight::Real(b)) => Weight::Real(a + b),
                _ => Weight::Invalid,
            }
        }

        fn invert(&self, a: Weight) -> Weight {
            match a {
                Weight::Real(a) => Weight::Real(-a),
                _ => Weight::Invalid,
            }
        }

        fn compare(&self, a: Weight, b: Weight) -> Ordering {
            match (real(a), real(b)) {
                (Some(a), Some(b)) => compare_reals(a, b),
                (a, b) => compare_validity(a.is_some(), b.is_some()),
            }
        }

        fn hash(&self, a: Weight) -> u64 {
            real(a).map_or(INVALID_HASH, hash_real)
        }

        fn format(&self, a: Weight) -> String {
            match a {
                Weight::Real(v) => format!("{v}"),
                _ => "invalid".to_string(),
            }
        }

        fn parse(&self, s: &str) -> Weight {
            match s.trim().parse::<f32>() {
                Ok(v) => Weight::Real(v),
                Err(_) => {
                    tracing::warn!("'{s}' is not a valid {} semiring value", self.name());
                    Weight::Invalid
                }
            }
        }

        fn compress(&self, a: Weight, out: &mut Vec<u8>) {
            out.extend_from_slice(&real(a).unwrap_or(f32::NAN).to_le_bytes());
        }

        fn uncompress(&self, bytes: &[u8]) -> Weight {
            uncompress_f32(bytes).map_or(Weight::Invalid, Weight::Real)
        }

        fn from_probability(&self, p: f64) -> Weight {
            if !(0.0..=1.0).contains(&p) {
                return Weight::Invalid;
            }
            Weight::Real(-(p.ln()) as f32)
        }

        fn to_probability(&self, a: Weight) -> Option<f64> {
            match a {
                Weight::Real(v) => Some((-(v as f64)).exp()),
                _ => None,
            }
        }
    };
}

impl Semiring for LogSemiring {
    fn kind(&self) -> SemiringType {
        SemiringType::Log
    }

    real_semiring_common!();

    fn collect(&self, a: Weight, b: Weight) -> Weight {
        match (a, b) {
            (Weight::Real(a), Weight::Real(b)) => Weight::Real(log_add(a, b)),
            _ => Weight::Invalid,
        }
    }
}

impl Semiring for TropicalSemiring {
    fn kind(&self) -> SemiringType {
        SemiringType::Tropical
    }

    real_semiring_common!();

    fn collect(&self, a: Weight, b: Weight) -> Weight {
        match (a, b) {
            (Weight::Real(a), Weight::Real(b)) => Weight::Real(a.min(b)),
            _ => Weight::Invalid,
        }
    }
}

impl Semiring for CountSemiring {
    fn kind(&self) -> SemiringType {
        SemiringType::Count
    }

    fn zero(&self) -> Weight {
        Weight::Count(0)
    }

    fn one(&self) -> Weight {
        Weight::Count(1)
    }

    fn max(&self) -> Weight {
        Weight::Count(u32::MAX)
    }

    fn extend(&self, a: Weight, b: Weight) -> Weight {
        match (a, b) {
            (Weight::Count(a), Weight::Count(b)) => Weight::Count(a.saturating_mul(b)),
            _ => Weight::Invalid,
        }
    }

    fn collect(&self, a: Weight, b: Weight) -> Weight {
        match (a, b) {
            (Weight::Count(a), Weight::Count(b)) => Weight::Count(a.saturating_add(b)),
            _ => Weight::Invalid,
        }
    }

    fn has_invert(&self) -> bool {
        false
    }

    fn invert(&self, _a: Weight) -> Weight {
        Weight::Invalid
    }

    fn compare(&self, a: Weight, b: Weight) -> Ordering {
        match (a, b) {
            (Weight::Count(a), Weight::Count(b)) => a.cmp(&b),
            (a, b) => compare_validity(
                matches!(a, Weight::Count(_)),
                matches!(b, Weight::Count(_)),
            ),
        }
    }

    fn hash(&self, a: Weight) -> u64 {
        match a {
            Weight::Count(c) => fxhash::hash64(&c),
            _ => INVALID_HASH,
        }
    }

    fn format(&self, a: Weight) -> String {
        match a {
            Weight::Count(u32::MAX) => "inf".to_string(),
            Weight::Count(c) => c.to_string(),
            _ => "invalid".to_string(),
        }
    }

    fn parse(&self, s: &str) -> Weight {
        match s.trim() {
            "inf" => Weight::Count(u32::MAX),
            s => s.parse::<u32>().map_or_else(
                |_| {
                    tracing::warn!("'{s}' is not a valid count semiring value");
                    Weight::Invalid
                },
                Weight::Count,
            ),
        }
    }

    fn compress(&self, a: Weight, out: &mut Vec<u8>) {
        let c = match a {
            Weight::Count(c) => c,
            other => {
                tracing::warn!("{other:?} is not a count weight, storing infinity");
                u32::MAX
            }
        };
        out.extend_from_slice(&c.to_le_bytes());
    }

    fn uncompress(&self, bytes: &[u8]) -> Weight {
        bytes
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .map_or(Weight::Invalid, |b| Weight::Count(u32::from_le_bytes(b)))
    }
}

impl ExpectationSemiring {
    fn pair(a: Weight) -> Option<(f32, f32)> {
        match a {
            Weight::Pair { score, risk } => Some((score, risk)),
            _ => None,
        }
    }
}

impl Semiring for ExpectationSemiring {
    fn kind(&self) -> SemiringType {
        SemiringType::Expectation
    }

    fn zero(&self) -> Weight {
        Weight::Pair {
            score: f32::INFINITY,
            risk: 0.0,
        }
    }

    fn one(&self) -> Weight {
        Weight::Pair {
            score: 0.0,
            risk: 0.0,
        }
    }

    fn max(&self) -> Weight {
        Weight::Pair {
            score: f32::INFINITY,
            risk: f32::INFINITY,
        }
    }

    fn extend(&self, a: Weight, b: Weight) -> Weight {
        let (Some((sa, ra)), Some((sb, rb))) = (Self::pair(a), Self::pair(b)) else {
            return Weight::Invalid;
        };
        if sa == f32::INFINITY || sb == f32::INFINITY {
            return self.zero();
        }
        Weight::Pair {
            score: sa + sb,
            risk: ra + rb,
        }
    }

    fn collect(&self, a: Weight, b: Weight) -> Weight {
        let (Some((sa, ra)), Some((sb, rb))) = (Self::pair(a), Self::pair(b)) else {
            return Weight::Invalid;
        };
        if sa == f32::INFINITY {
            return b;
        }
        if sb == f32::INFINITY {
            return a;
        }
        let score = log_add(sa, sb);
        let (wa, wb) = ((score - sa).exp(), (score - sb).exp());
        Weight::Pair {
            score,
            risk: wa * ra + wb * rb,
        }
    }

    fn invert(&self, a: Weight) -> Weight {
        match a {
            Weight::Pair { score, risk } => Weight::Pair {
                score: -score,
                risk: -risk,
            },
            _ => Weight::Invalid,
        }
    }

    fn compare(&self, a: Weight, b: Weight) -> Ordering {
        match (Self::pair(a), Self::pair(b)) {
            (Some((sa, ra)), Some((sb, rb))) => {
                compare_reals(sa, sb).then_with(|| compare_reals(ra, rb))
            }
            (a, b) => compare_validity(a.is_some(), b.is_some()),
        }
    }

    fn hash(&self, a: Weight) -> u64 {
        Self::pair(a).map_or(INVALID_HASH, |(s, r)| {
            hash_real(s) ^ hash_real(r).rotate_left(1)
        })
    }

    fn format(&self, a: Weight) -> String {
        match a {
            Weight::Pair { score, risk } => format!("{score}:{risk}"),
            _ => "invalid".to_string(),
        }
    }

    fn parse(&self, s: &str) -> Weight {
        let parsed = s.trim().split_once(':').and_then(|(score, risk)| {
            Some(Weight::Pair {
                score: score.parse().ok()?,
                risk: risk.parse().ok()?,
            })
        });
        parsed.unwrap_or_else(|| {
            tracing::warn!("'{s}' is not a valid expectation semiring value");
            Weight::Invalid
        })
    }

    fn compressed_size(&self) -> usize {
        8
    }

    fn compress(&self, a: Weight, out: &mut Vec<u8>) {
        let (s, r) = Self::pair(a).unwrap_or((f32::NAN, f32::NAN));
        out.extend_from_slice(&s.to_le_bytes());
        out.extend_from_slice(&r.to_le_bytes());
    }

    fn uncompress(&self, bytes: &[u8]) -> Weight {
        match (uncompress_f32(bytes), bytes.get(4..).and_then(uncompress_f32)) {
            (Some(score), Some(risk)) => Weight::Pair { score, risk },
            _ => Weight::Invalid,
        }
    }

    fn from_probability(&self, p: f64) -> Weight {
        match log().from_probability(p) {
            Weight::Real(score) => Weight::Pair { score, risk: 0.0 },
            _ => Weight::Invalid,
        }
    }

    fn to_probability(&self, a: Weight) -> Option<f64> {
        match a {
            Weight::Pair { score, .. } => Some((-(score as f64)).exp()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(v: f32) -> Weight {
        Weight::Real(v)
    }

    #[test]
    fn tropical_operations() {
        let sr = tropical();
        assert_eq!(sr.extend(r(1.0), r(2.0)), r(3.0));
        assert_eq!(sr.collect(r(1.0), r(2.0)), r(1.0));
        assert_eq!(sr.collect(sr.zero(), r(2.0)), r(2.0));
        assert_eq!(sr.extend(sr.zero(), r(2.0)), sr.zero());
        assert_eq!(sr.invert(r(2.5)), r(-2.5));
        assert_eq!(sr.compare(r(1.0), r(2.0)), Ordering::Less);
        assert!(sr.is_default(r(0.0)));
        assert!(!sr.is_default(r(0.5)));
    }

    #[test]
    fn log_collect_adds_probabilities() {
        let sr = log();
        let half = sr.from_probability(0.5);
        let sum = sr.collect(half, half);
        assert_eq!(sr.compare(sum, sr.one()), Ordering::Equal);
        assert_eq!(sr.collect(sr.zero(), half), half);
        assert_eq!(sr.from_probability(1.5), Weight::Invalid);
        let p = sr.to_probability(sr.from_probability(0.25)).unwrap();
        assert!((p - 0.25).abs() < 1e-6);
    }

    #[test]
    fn count_saturates() {
        let sr = count_semiring();
        assert_eq!(sr.extend(Weight::Count(3), Weight::Count(4)), Weight::Count(12));
        assert_eq!(sr.collect(Weight::Count(3), Weight::Count(4)), Weight::Count(7));
        assert_eq!(sr.collect(sr.max(), Weight::Count(1)), sr.max());
        assert_eq!(sr.extend(sr.max(), Weight::Count(2)), sr.max());
        assert_eq!(sr.invert(Weight::Count(2)), Weight::Invalid);
        assert_eq!(sr.format(sr.max()), "inf");
        assert_eq!(sr.parse("inf"), sr.max());
    }

    #[test]
    fn expectation_averages_risk() {
        let sr = expectation();
        let a = Weight::Pair {
            score: sr.from_probability(0.5).value(),
            risk: 2.0,
        };
        let b = Weight::Pair {
            score: sr.from_probability(0.5).value(),
            risk: 4.0,
        };
        let c = sr.collect(a, b);
        match c {
            Weight::Pair { score, risk } => {
                assert!(score.abs() < 1e-6);
                assert!((risk - 3.0).abs() < 1e-5);
            }
            other => panic!("unexpected {other:?}"),
        }
        let e = sr.extend(a, sr.one());
        assert_eq!(sr.compare(e, a), Ordering::Equal);
        assert_eq!(sr.collect(sr.zero(), a), a);
    }

    #[test]
    fn text_and_binary_formats() {
        for sr in [log(), tropical(), count_semiring(), expectation()] {
            let w = match sr.kind() {
                SemiringType::Count => Weight::Count(42),
                SemiringType::Expectation => Weight::Pair {
                    score: 1.25,
                    risk: -0.5,
                },
                _ => r(3.75),
            };
            assert_eq!(sr.parse(&sr.format(w)), w);
            let mut bytes = vec![];
            sr.compress(w, &mut bytes);
            assert_eq!(bytes.len(), sr.compressed_size());
            assert_eq!(sr.uncompress(&bytes), w);
            assert_eq!(SemiringType::from_name(sr.name()), Some(sr.kind()));
            assert_eq!(
                SemiringType::from_tag(sr.kind().tag())
                    .and_then(SemiringType::semiring)
                    .map(|s| s.kind()),
                Some(sr.kind())
            );
        }
        assert_eq!(tropical().parse("x"), Weight::Invalid);
    }

    #[test]
    fn compare_tolerates_rounding() {
        let sr = log();
        let a = r(1.0);
        let b = r(f32::from_bits(1.0f32.to_bits() + 3));
        assert_eq!(sr.compare(a, b), Ordering::Equal);
        assert_eq!(sr.hash(a), sr.hash(b));
        for v in [0.0f32, 1.0, 2.5, 3.0, 17.0] {
            for delta in [-(ULP_TOLERANCE as i64), -1, 1, ULP_TOLERANCE as i64] {
                let bits = (v.to_bits() as i64 + delta).max(0) as u32;
                let near = r(f32::from_bits(bits));
                assert_eq!(sr.compare(r(v), near), Ordering::Equal, "{v} {delta}");
                assert_eq!(sr.hash(r(v)), sr.hash(near), "{v} {delta}");
            }
        }
        assert_eq!(sr.hash(r(0.99999994)), sr.hash(r(1.0)));
        assert_eq!(sr.hash(r(-0.0)), sr.hash(r(0.0)));
        assert_ne!(sr.hash(r(1.0)), sr.hash(r(1.5)));
    }

    #[test]
    fn invalid_weights_sort_last() {
        for sr in [log(), tropical(), count_semiring(), expectation()] {
            assert_eq!(sr.compare(sr.max(), Weight::Invalid), Ordering::Less);
            assert_eq!(sr.compare(Weight::Invalid, sr.one()), Ordering::Greater);
            assert_eq!(sr.compare(Weight::Invalid, Weight::Invalid), Ordering::Equal);
            assert_eq!(sr.hash(Weight::Invalid), sr.hash(Weight::Invalid));
            assert_eq!(sr.extend(sr.one(), Weight::Invalid), Weight::Invalid);
        }
        assert_eq!(
            count_semiring().compare(Weight::Count(3), r(1.0)),
            Ordering::Less
        );
        assert_eq!(tropical().compare(Weight::Count(3), r(1.0)), Ordering::Greater);
    }

    #[test]
    fn conversion_between_semirings() {
        let (t, c, e) = (tropical(), count_semiring(), expectation());
        assert_eq!(convert(r(0.0), t, c), Weight::Count(1));
        assert_eq!(convert(r(f32::INFINITY), t, c), Weight::Count(0));
        assert_eq!(convert(r(2.6), t, c), Weight::Count(3));
        assert_eq!(convert(r(-2.0), t, c), Weight::Invalid);
        assert_eq!(convert(Weight::Count(4), c, t), r(4.0));
        assert_eq!(convert(Weight::Count(1), c, log()), r(0.0));
        assert_eq!(convert(c.max(), c, t), r(f32::INFINITY));
        assert_eq!(convert(r(1.5), log(), t), r(1.5));
        assert_eq!(convert(r(1.5), t, e), Weight::Pair { score: 1.5, risk: 0.0 });
        assert_eq!(convert(Weight::Pair { score: 2.0, risk: 7.0 }, e, t), r(2.0));
        assert_eq!(convert(Weight::Invalid, t, c), Weight::Invalid);
    }
}
