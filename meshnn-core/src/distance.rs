//! Distance: the pluggable, pure comparison function the core is built
//! around.
//!
//! The core never computes distances itself for arbitrary vector
//! representations: it is handed a function `d(L, L) -> D` and treats `L`
//! as opaque. This module supplies the `D` bound (§3.1 of the expanded
//! spec) and, as a convenience for the common case `L = Vec<f32>`, a small
//! set of ready-made metrics. Custom `L` types (e.g. quantized vectors, raw
//! byte spans) simply provide their own `Fn(&L, &L) -> D`.

/// A totally-ordered-enough numeric distance type with a known maximum.
///
/// The core only ever needs `<`, `<=`, and a `MAX` sentinel (used to seed
/// "nothing found yet" comparisons in the beam search). Symmetry and the
/// triangle inequality are not required by the trait, only by recall.
pub trait Scalar: Copy + PartialOrd + Send + Sync + std::fmt::Debug + 'static {
    /// The largest representable value, used to seed worst-case comparisons.
    const MAX: Self;
    /// The additive identity, used by [`crate::connector`]'s "did the label
    /// actually change" (`Δ = 0`) check during `update`.
    const ZERO: Self;
}

impl Scalar for f32 {
    const MAX: Self = f32::MAX;
    const ZERO: Self = 0.0;
}

impl Scalar for f64 {
    const MAX: Self = f64::MAX;
    const ZERO: Self = 0.0;
}

/// The distance function contract: pure, total, and safe to call from any
/// thread. Must not panic: a panicking `d` would poison whichever
/// region-lock guard is held at the call site.
pub trait DistanceFn<L, D: Scalar>: Fn(&L, &L) -> D + Send + Sync {}

impl<L, D: Scalar, F> DistanceFn<L, D> for F where F: Fn(&L, &L) -> D + Send + Sync {}

/// Ready-made metrics over `&[f32]` vectors, for the common case where the
/// stored label is itself a dense float vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`. Lower is more similar. Best for normalized
    /// embeddings.
    Cosine,
    /// Squared Euclidean (L2²) distance. Avoids a `sqrt` per comparison;
    /// monotonic in the same order as plain Euclidean so ranking is
    /// unaffected.
    SquaredEuclidean,
    /// Negated dot product, so that "lower is better" holds uniformly
    /// across metrics for maximum inner product search.
    NegDotProduct,
}

impl DistanceMetric {
    /// Computes the configured distance between two equal-length vectors.
    ///
    /// # Panics
    ///
    /// Panics if `a.len() != b.len()`. Callers that accept external queries
    /// should validate dimensionality up front and return
    /// [`crate::Error::DimensionMismatch`] instead of reaching this.
    #[must_use]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");
        match self {
            Self::Cosine => Self::cosine(a, b),
            Self::SquaredEuclidean => Self::squared_euclidean(a, b),
            Self::NegDotProduct => -Self::dot(a, b),
        }
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 1.0;
        }
        1.0 - dot / (norm_a * norm_b)
    }

    fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    /// Returns a boxed closure suitable for [`crate::IndexParams`] /
    /// [`crate::Index::new`], closing over the metric by value.
    #[must_use]
    pub fn into_fn(self) -> impl Fn(&Vec<f32>, &Vec<f32>) -> f32 + Send + Sync + Copy {
        move |a: &Vec<f32>, b: &Vec<f32>| self.distance(a, b)
    }
}
