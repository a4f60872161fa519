//! Embedding dimensionality enforcement.

use crate::defaults::EMBED_DIMENSION;
use crate::error::{Error, Result};

/// Conform a raw model vector to the fixed template-index dimension.
///
/// Vectors longer than [`EMBED_DIMENSION`] are deterministically
/// truncated to the first `EMBED_DIMENSION` components (MRL-style
/// models emit a usable prefix). Shorter vectors are rejected: silently
/// padding would corrupt the similarity index.
pub fn conform_embedding(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    match vector.len() {
        n if n < EMBED_DIMENSION => Err(Error::DimensionMismatch {
            expected: EMBED_DIMENSION,
            actual: n,
        }),
        n if n > EMBED_DIMENSION => {
            vector.truncate(EMBED_DIMENSION);
            Ok(vector)
        }
        _ => Ok(vector),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_dimension_passes_through() {
        let v = vec![0.5_f32; EMBED_DIMENSION];
        assert_eq!(conform_embedding(v).unwrap().len(), EMBED_DIMENSION);
    }

    #[test]
    fn test_longer_vector_truncated() {
        let mut v = vec![0.0_f32; EMBED_DIMENSION + 512];
        v[0] = 1.0;
        let out = conform_embedding(v).unwrap();
        assert_eq!(out.len(), EMBED_DIMENSION);
        assert_eq!(out[0], 1.0);
    }

    #[test]
    fn test_shorter_vector_rejected() {
        let v = vec![0.1_f32; 768];
        match conform_embedding(v) {
            Err(Error::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, EMBED_DIMENSION);
                assert_eq!(actual, 768);
            }
            other => panic!("Expected DimensionMismatch, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_empty_vector_rejected() {
        assert!(conform_embedding(Vec::new()).is_err());
    }
}
