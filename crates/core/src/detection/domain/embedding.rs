/// Fixed-length identity descriptor produced by the inference provider.
///
/// Dimensionality is decided by the provider's recognition model; two
/// embeddings are only comparable when their lengths match.
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// An empty or all-zero vector carries no identity information and must
    /// never be enrolled as a reference.
    pub fn is_degenerate(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Euclidean distance; infinite when the dimensions differ.
    pub fn euclidean_distance(&self, other: &Embedding) -> f64 {
        if self.dimension() != other.dimension() {
            return f64::INFINITY;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = *a as f64 - *b as f64;
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}
