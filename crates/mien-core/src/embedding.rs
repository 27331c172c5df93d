//! Embedding normalization and cosine similarity.

use serde::{Deserialize, Serialize};

/// Face embedding vector. Stored embeddings have unit L2 norm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// L2-normalize a raw detector embedding.
    ///
    /// A zero-norm vector cannot be scaled to unit length; it is returned
    /// unchanged and logged as a data-quality signal rather than failing
    /// the caller.
    pub fn normalized(values: Vec<f32>) -> Self {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            tracing::warn!(dim = values.len(), "zero-norm embedding left unnormalized");
            return Self { values };
        }
        Self {
            values: values.iter().map(|v| v / norm).collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    ///
    /// Both sides are renormalized by the computation, so the result is
    /// correct for raw and unit-length inputs alike. Zero-norm operands
    /// yield 0.0.
    pub fn cosine(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_three_four() {
        let e = Embedding::normalized(vec![3.0, 4.0]);
        assert!((e.values[0] - 0.6).abs() < 1e-6);
        assert!((e.values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_has_unit_norm() {
        let e = Embedding::normalized(vec![1.0, -2.0, 3.0, 0.5]);
        let norm = e.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_norm_returned_unchanged() {
        let e = Embedding::normalized(vec![0.0, 0.0, 0.0]);
        assert_eq!(e.values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cosine_identical() {
        let a = Embedding { values: vec![1.0, 0.0] };
        assert!((a.cosine(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = Embedding { values: vec![1.0, 0.0] };
        let b = Embedding { values: vec![0.0, 1.0] };
        assert!(a.cosine(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = Embedding { values: vec![1.0, 0.0] };
        let b = Embedding { values: vec![-1.0, 0.0] };
        assert!((a.cosine(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_renormalizes_raw_inputs() {
        // Unnormalized inputs pointing in the same direction.
        let a = Embedding { values: vec![3.0, 4.0] };
        let b = Embedding { values: vec![30.0, 40.0] };
        assert!((a.cosine(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = Embedding { values: vec![0.0, 0.0] };
        let b = Embedding { values: vec![1.0, 0.0] };
        assert_eq!(a.cosine(&b), 0.0);
    }
}
