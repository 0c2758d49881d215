//! Shamir secret sharing over the P-256 scalar field (spec component 4.D):
//! polynomial sampling, shard evaluation, Lagrange-at-zero combination, and
//! the partial-decryption/join operations used for threshold ElGamal
//! decryption.

use rand::{CryptoRng, RngCore};
use std::collections::HashSet;

use crate::group::{Point, Scalar};

/// Errors from sharing or reconstruction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ShamirError {
    /// Shard id zero is reserved: it would evaluate the polynomial at the
    /// secret itself.
    #[error("shard id 0 is reserved")]
    ZeroShardId,
    /// Two shards (or parts) presented for combination shared the same id.
    #[error("duplicate shard id {0} in reconstruction set")]
    DuplicateShardId(u64),
    /// Fewer shards than the threshold were supplied.
    #[error("not enough shards to reconstruct: need {need}, got {got}")]
    NotEnoughShards { need: usize, got: usize },
}

/// A polynomial over the scalar field, constant term first.
pub struct Polynomial(Vec<Scalar>);

impl Polynomial {
    /// Samples a random polynomial of degree `threshold - 1` whose constant
    /// term is `secret`.
    pub fn sample<R: RngCore + CryptoRng>(
        secret: Scalar,
        threshold: u8,
        rng: &mut R,
    ) -> Self {
        let mut coeffs = Vec::with_capacity(threshold as usize);
        coeffs.push(secret);
        for _ in 1..threshold {
            coeffs.push(Scalar::sample(rng));
        }
        Self(coeffs)
    }

    /// Evaluates the polynomial at `x` via Horner's method.
    pub fn evaluate(&self, x: Scalar) -> Scalar {
        let mut acc = Scalar::zero();
        for coeff in self.0.iter().rev() {
            acc = acc * x + *coeff;
        }
        acc
    }
}

/// A single party's share of a secret.
#[derive(Clone, Copy)]
pub struct Shard {
    pub id: u64,
    pub value: Scalar,
}

/// Splits `secret` into `n` shards at ids `1..=n`, any `threshold` of which
/// reconstruct it.
pub fn split<R: RngCore + CryptoRng>(
    secret: Scalar,
    n: u8,
    threshold: u8,
    rng: &mut R,
) -> Vec<Shard> {
    let poly = Polynomial::sample(secret, threshold, rng);
    (1..=n)
        .map(|id| Shard {
            id: id as u64,
            value: poly.evaluate(Scalar::from_u64(id as u64)),
        })
        .collect()
}

fn lagrange_coefficient(id: u64, others: &[u64]) -> Scalar {
    let xi = Scalar::from_u64(id);
    let mut num = Scalar::one();
    let mut den = Scalar::one();
    for &xj in others {
        if xj == id {
            continue;
        }
        let xj = Scalar::from_u64(xj);
        num = num * (Scalar::zero() - xj);
        den = den * (xi - xj);
    }
    num * den.invert().expect("distinct nonzero shard ids are never singular")
}

fn validate_ids(ids: &[u64]) -> Result<(), ShamirError> {
    let mut seen = HashSet::new();
    for &id in ids {
        if id == 0 {
            return Err(ShamirError::ZeroShardId);
        }
        if !seen.insert(id) {
            return Err(ShamirError::DuplicateShardId(id));
        }
    }
    Ok(())
}

/// Reconstructs the secret scalar from a set of shards. Primarily useful for
/// tests and key-generation ceremonies; the live decryption path never
/// reconstructs a secret key (see [`partial_decrypt`]/[`combine_parts`]).
pub fn combine_shards(shards: &[Shard]) -> Result<Scalar, ShamirError> {
    let ids: Vec<u64> = shards.iter().map(|s| s.id).collect();
    validate_ids(&ids)?;
    let mut acc = Scalar::zero();
    for shard in shards {
        let lambda = lagrange_coefficient(shard.id, &ids);
        acc = acc + lambda * shard.value;
    }
    Ok(acc)
}

/// A partial decryption: one shard holder's contribution `c^shard.value`
/// toward reconstructing `c^sk`.
#[derive(Clone, Copy)]
pub struct Part {
    pub id: u64,
    pub point: Point,
}

/// Computes shard `shard`'s partial decryption of `ciphertext_point`
/// (either layer's `c1`/`c2`).
pub fn partial_decrypt(ciphertext_point: &Point, shard: &Shard) -> Part {
    Part {
        id: shard.id,
        point: *ciphertext_point * shard.value,
    }
}

/// Combines partial decryptions into the shared DH point `c^sk`, without
/// ever reconstructing `sk`.
pub fn combine_parts(parts: &[Part]) -> Result<Point, ShamirError> {
    let ids: Vec<u64> = parts.iter().map(|p| p.id).collect();
    validate_ids(&ids)?;
    let mut acc = Point::identity();
    for part in parts {
        let lambda = lagrange_coefficient(part.id, &ids);
        acc = acc + part.point * lambda;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_threshold_subset_reconstructs_the_secret() {
        let mut rng = rand::thread_rng();
        let secret = Scalar::sample(&mut rng);
        let shards = split(secret, 5, 3, &mut rng);

        for subset in [
            &shards[0..3],
            &shards[1..4],
            &shards[2..5],
            &[shards[0], shards[2], shards[4]][..],
        ] {
            assert!(combine_shards(subset).unwrap() == secret);
        }
    }

    #[test]
    fn below_threshold_subset_does_not_generally_recover_the_secret() {
        let mut rng = rand::thread_rng();
        let secret = Scalar::sample(&mut rng);
        let shards = split(secret, 5, 3, &mut rng);
        let partial = combine_shards(&shards[0..2]).unwrap();
        assert!(partial != secret);
    }

    #[test]
    fn duplicate_shard_ids_are_rejected() {
        let mut rng = rand::thread_rng();
        let secret = Scalar::sample(&mut rng);
        let shards = split(secret, 3, 2, &mut rng);
        let dup = vec![shards[0], shards[0]];
        assert_eq!(
            combine_shards(&dup).unwrap_err(),
            ShamirError::DuplicateShardId(shards[0].id)
        );
    }

    #[test]
    fn partial_decryption_matches_direct_exponentiation() {
        let mut rng = rand::thread_rng();
        let secret = Scalar::sample(&mut rng);
        let shards = split(secret, 4, 2, &mut rng);
        let point = Point::from_scalar(&Scalar::sample(&mut rng));

        let parts: Vec<Part> = shards[0..2]
            .iter()
            .map(|s| partial_decrypt(&point, s))
            .collect();
        let combined = combine_parts(&parts).unwrap();
        let direct = point * secret;
        assert!(combined == direct);
    }
}
