//! The EC group component: scalars and points over NIST P-256.
//!
//! This module owns curve arithmetic only. Canonical minimal-byte big-endian
//! encoding is exposed here (`to_bytes`/`from_bytes`); the length-prefixed
//! wire framing around those bytes lives in `tresor_types::wire`.

use p256::elliptic_curve::group::Group as _;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::elliptic_curve::Field as _;
use p256::{EncodedPoint, FieldBytes, ProjectivePoint, Scalar as InnerScalar};
use rand_core::{CryptoRng, RngCore};
use std::ops::{Add, Mul, Neg, Sub};
use zeroize::Zeroize;

/// Size in bytes of a full-width P-256 field element or scalar.
pub const FIELD_BYTES: usize = 32;

/// Errors produced while decoding group elements.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    /// The supplied byte string does not fit in a field element.
    #[error("encoded value longer than {FIELD_BYTES} bytes")]
    TooLong,
    /// The supplied coordinates do not describe a point on the curve.
    #[error("point is not on the curve")]
    NotOnCurve,
    /// The supplied bytes are not a valid scalar (out of range mod the group order).
    #[error("invalid scalar encoding")]
    InvalidScalar,
    /// A non-identity point was given without a y-coordinate.
    #[error("missing y-coordinate for non-identity point")]
    MissingY,
}

fn left_pad(bytes: &[u8]) -> Result<[u8; FIELD_BYTES], GroupError> {
    if bytes.len() > FIELD_BYTES {
        return Err(GroupError::TooLong);
    }
    let mut out = [0u8; FIELD_BYTES];
    out[FIELD_BYTES - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first_nonzero = bytes.iter().position(|b| *b != 0);
    match first_nonzero {
        Some(idx) => bytes[idx..].to_vec(),
        None => Vec::new(),
    }
}

/// A scalar in `Z_q`, `q` being the order of the P-256 group.
///
/// Zeroized on drop: scalars are frequently private key material or shards.
#[derive(Clone, Copy, PartialEq, Eq, zeroize::ZeroizeOnDrop)]
pub struct Scalar(#[zeroize(skip)] InnerScalar);

impl std::fmt::Debug for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Scalar(..)")
    }
}

impl Scalar {
    /// The additive identity.
    pub fn zero() -> Self {
        Self(InnerScalar::ZERO)
    }

    /// The multiplicative identity.
    pub fn one() -> Self {
        Self(InnerScalar::ONE)
    }

    /// Samples a uniformly random, nonzero scalar.
    pub fn sample<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let candidate = InnerScalar::random(&mut *rng);
            if bool::from(!candidate.is_zero()) {
                return Self(candidate);
            }
        }
    }

    /// Builds a scalar from a small integer, primarily for shard indices.
    pub fn from_u64(value: u64) -> Self {
        Self(InnerScalar::from(value))
    }

    /// `true` iff this is the additive identity.
    pub fn is_zero(&self) -> bool {
        bool::from(self.0.is_zero())
    }

    /// Multiplicative inverse. `None` iff `self` is zero.
    pub fn invert(&self) -> Option<Self> {
        let inv = self.0.invert();
        if bool::from(inv.is_some()) {
            Some(Self(inv.unwrap()))
        } else {
            None
        }
    }

    /// Canonical minimal-length big-endian encoding. The zero scalar encodes
    /// to an empty byte string.
    pub fn to_bytes(&self) -> Vec<u8> {
        trim_leading_zeros(&self.0.to_bytes())
    }

    /// Decodes a canonical big-endian scalar. An empty slice decodes to zero.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GroupError> {
        let padded = left_pad(bytes)?;
        let repr = FieldBytes::clone_from_slice(&padded);
        let candidate = InnerScalar::from_repr(repr);
        if bool::from(candidate.is_some()) {
            Ok(Self(candidate.unwrap()))
        } else {
            Err(GroupError::InvalidScalar)
        }
    }
}

impl Add for Scalar {
    type Output = Scalar;
    fn add(self, rhs: Self) -> Scalar {
        Scalar(self.0 + rhs.0)
    }
}

impl Sub for Scalar {
    type Output = Scalar;
    fn sub(self, rhs: Self) -> Scalar {
        Scalar(self.0 - rhs.0)
    }
}

impl Mul for Scalar {
    type Output = Scalar;
    fn mul(self, rhs: Self) -> Scalar {
        Scalar(self.0 * rhs.0)
    }
}

impl Neg for Scalar {
    type Output = Scalar;
    fn neg(self) -> Scalar {
        Scalar(-self.0)
    }
}

/// A point in the P-256 group, represented internally in projective
/// coordinates so the identity element has a native representation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Point(ProjectivePoint);

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Point").field(&self.x_bytes()).finish()
    }
}

impl Point {
    /// The group's distinguished generator.
    pub fn generator() -> Self {
        Self(ProjectivePoint::GENERATOR)
    }

    /// The identity element (point at infinity).
    pub fn identity() -> Self {
        Self(ProjectivePoint::IDENTITY)
    }

    /// `true` iff this is the identity element.
    pub fn is_identity(&self) -> bool {
        bool::from(self.0.is_identity())
    }

    /// Raises the generator to `scalar`, i.e. `generator() * scalar`.
    pub fn from_scalar(scalar: &Scalar) -> Self {
        Self::generator() * scalar
    }

    /// Minimal-length big-endian x-coordinate. Empty for the identity.
    pub fn x_bytes(&self) -> Vec<u8> {
        if self.is_identity() {
            return Vec::new();
        }
        let encoded = self.0.to_affine().to_encoded_point(false);
        trim_leading_zeros(encoded.x().expect("uncompressed point carries x"))
    }

    /// Minimal-length big-endian y-coordinate. `None` for the identity.
    pub fn y_bytes(&self) -> Option<Vec<u8>> {
        if self.is_identity() {
            return None;
        }
        let encoded = self.0.to_affine().to_encoded_point(false);
        Some(trim_leading_zeros(
            encoded.y().expect("uncompressed point carries y"),
        ))
    }

    /// Reconstructs a point from its coordinates. `y = None` denotes the
    /// identity and requires `x` to be empty.
    pub fn from_coords(x: &[u8], y: Option<&[u8]>) -> Result<Self, GroupError> {
        match y {
            None => {
                if x.is_empty() {
                    Ok(Self::identity())
                } else {
                    Err(GroupError::MissingY)
                }
            }
            Some(y) => {
                let x = left_pad(x)?;
                let y = left_pad(y)?;
                let encoded = EncodedPoint::from_affine_coordinates(&x.into(), &y.into(), false);
                let affine = p256::AffinePoint::from_encoded_point(&encoded);
                if bool::from(affine.is_some()) {
                    Ok(Self(ProjectivePoint::from(affine.unwrap())))
                } else {
                    Err(GroupError::NotOnCurve)
                }
            }
        }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Self) -> Point {
        Point(self.0 + rhs.0)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point(-self.0)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Self) -> Point {
        self + (-rhs)
    }
}

impl Mul<&Scalar> for Point {
    type Output = Point;
    fn mul(self, rhs: &Scalar) -> Point {
        Point(self.0 * rhs.0)
    }
}

impl Mul<Scalar> for Point {
    type Output = Point;
    fn mul(self, rhs: Scalar) -> Point {
        self * &rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trips_through_bytes() {
        let mut rng = rand::thread_rng();
        let s = Scalar::sample(&mut rng);
        let decoded = Scalar::from_bytes(&s.to_bytes()).unwrap();
        assert!(s == decoded);
    }

    #[test]
    fn zero_scalar_encodes_to_empty() {
        assert!(Scalar::zero().to_bytes().is_empty());
        assert_eq!(Scalar::from_bytes(&[]).unwrap(), Scalar::zero());
    }

    #[test]
    fn identity_point_round_trips() {
        let id = Point::identity();
        assert!(id.x_bytes().is_empty());
        assert!(id.y_bytes().is_none());
        let decoded = Point::from_coords(&[], None).unwrap();
        assert!(decoded.is_identity());
    }

    #[test]
    fn generator_point_round_trips_through_coords() {
        let g = Point::generator();
        let x = g.x_bytes();
        let y = g.y_bytes().unwrap();
        let decoded = Point::from_coords(&x, Some(&y)).unwrap();
        assert!(decoded == g);
    }

    #[test]
    fn scalar_mult_and_add_are_consistent() {
        let mut rng = rand::thread_rng();
        let a = Scalar::sample(&mut rng);
        let b = Scalar::sample(&mut rng);
        let lhs = Point::from_scalar(&(a + b));
        let rhs = Point::from_scalar(&a) + Point::from_scalar(&b);
        assert!(lhs == rhs);
    }

    #[test]
    fn invert_is_multiplicative_inverse() {
        let mut rng = rand::thread_rng();
        let a = Scalar::sample(&mut rng);
        let inv = a.invert().unwrap();
        assert!(a * inv == Scalar::one());
    }
}
