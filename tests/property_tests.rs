use proptest::prelude::*;

use pingu::inference::embeddings::{bytes_to_vec, cosine_similarity, vec_to_bytes};

proptest! {
    /// Packing to little-endian bytes and back is the identity for every
    /// finite float.
    #[test]
    fn test_vector_codec_round_trip(v in proptest::collection::vec(
        prop::num::f32::NORMAL | prop::num::f32::SUBNORMAL | prop::num::f32::ZERO,
        0..64,
    )) {
        let bytes = vec_to_bytes(&v);
        prop_assert_eq!(bytes.len(), v.len() * 4);
        prop_assert_eq!(bytes_to_vec(&bytes), v);
    }

    /// Decoding arbitrary bytes never panics and yields len/4 floats.
    #[test]
    fn test_bytes_to_vec_arbitrary_input(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let v = bytes_to_vec(&bytes);
        prop_assert_eq!(v.len(), bytes.len() / 4);
    }

    /// Cosine similarity of well-behaved vectors stays within [-1, 1]
    /// (modulo float error) and is symmetric.
    #[test]
    fn test_cosine_similarity_bounds(
        a in proptest::collection::vec(-1000.0f32..1000.0, 1..16),
        b in proptest::collection::vec(-1000.0f32..1000.0, 1..16),
    ) {
        let n = a.len().min(b.len());
        let (a, b) = (&a[..n], &b[..n]);
        let sim = cosine_similarity(a, b);
        prop_assert!(sim.abs() <= 1.0 + 1e-4, "similarity out of range: {}", sim);
        let reversed = cosine_similarity(b, a);
        prop_assert!((sim - reversed).abs() < 1e-5);
    }

    /// A vector is maximally similar to itself (unless zero).
    #[test]
    fn test_cosine_self_similarity(v in proptest::collection::vec(0.001f32..100.0, 1..16)) {
        let sim = cosine_similarity(&v, &v);
        prop_assert!((sim - 1.0).abs() < 1e-4, "self similarity was {}", sim);
    }
}
