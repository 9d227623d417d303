//! Shamir secret sharing over GF(256)
//!
//! Used to split a private key between notaries so it can be rebuilt when
//! the device holding it is lost. Each byte of the secret is shared with an
//! independent random polynomial of degree `threshold - 1`; a partition is
//! the evaluation of every polynomial at the partition's `x`.

/// Errors that can occur while splitting or combining partitions
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ShamirError {
    #[error("threshold must be between 1 and the partition count, got {threshold} of {count}")]
    InvalidThreshold { threshold: u8, count: u8 },
    #[error("not enough partitions, need {needed}, got {got}")]
    NotEnoughPartitions { needed: u8, got: usize },
    #[error("partitions disagree on threshold or length")]
    Inconsistent,
    #[error("duplicate partition index {0}")]
    DuplicateIndex(u8),
    #[error("malformed partition: {0}")]
    Malformed(String),
}

/// One share of a split secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub threshold: u8,
    /// Evaluation point, never zero
    pub x: u8,
    pub y: Vec<u8>,
}

impl Partition {
    /// `x || y` hex encoded. The threshold travels separately.
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(self.y.len() + 1);
        bytes.push(self.x);
        bytes.extend_from_slice(&self.y);
        hex::encode(bytes)
    }

    pub fn from_hex(threshold: u8, hex: &str) -> Result<Self, ShamirError> {
        let bytes = hex::decode(hex).map_err(|e| ShamirError::Malformed(e.to_string()))?;
        match bytes.split_first() {
            Some((0, _)) => Err(ShamirError::Malformed("partition index 0".to_string())),
            Some((x, y)) if !y.is_empty() => Ok(Partition {
                threshold,
                x: *x,
                y: y.to_vec(),
            }),
            _ => Err(ShamirError::Malformed("empty partition".to_string())),
        }
    }
}

/// Split `secret` into `count` partitions, any `threshold` of which rebuild it
pub fn split(secret: &[u8], threshold: u8, count: u8) -> Result<Vec<Partition>, ShamirError> {
    if threshold == 0 || threshold > count {
        return Err(ShamirError::InvalidThreshold { threshold, count });
    }

    let mut partitions: Vec<Partition> = (1..=count)
        .map(|x| Partition {
            threshold,
            x,
            y: Vec::with_capacity(secret.len()),
        })
        .collect();

    let mut coefficients = vec![0u8; threshold as usize];
    for byte in secret {
        coefficients[0] = *byte;
        getrandom::getrandom(&mut coefficients[1..]).expect("failed to generate random bytes");
        for partition in partitions.iter_mut() {
            partition.y.push(evaluate(&coefficients, partition.x));
        }
    }

    Ok(partitions)
}

/// Rebuild a secret from at least `threshold` partitions
pub fn combine(partitions: &[Partition]) -> Result<Vec<u8>, ShamirError> {
    let first = partitions
        .first()
        .ok_or(ShamirError::NotEnoughPartitions { needed: 1, got: 0 })?;
    if partitions.len() < first.threshold as usize {
        return Err(ShamirError::NotEnoughPartitions {
            needed: first.threshold,
            got: partitions.len(),
        });
    }
    if partitions
        .iter()
        .any(|p| p.threshold != first.threshold || p.y.len() != first.y.len())
    {
        return Err(ShamirError::Inconsistent);
    }
    for (i, p) in partitions.iter().enumerate() {
        if partitions[..i].iter().any(|q| q.x == p.x) {
            return Err(ShamirError::DuplicateIndex(p.x));
        }
    }

    let used = &partitions[..first.threshold as usize];
    let mut secret = vec![0u8; first.y.len()];
    for (i, p) in used.iter().enumerate() {
        // Lagrange basis polynomial evaluated at zero
        let mut basis = 1u8;
        for (j, q) in used.iter().enumerate() {
            if i != j {
                basis = gf_mul(basis, gf_div(q.x, q.x ^ p.x));
            }
        }
        for (out, y) in secret.iter_mut().zip(p.y.iter()) {
            *out ^= gf_mul(*y, basis);
        }
    }
    Ok(secret)
}

fn evaluate(coefficients: &[u8], x: u8) -> u8 {
    coefficients
        .iter()
        .rev()
        .fold(0u8, |acc, c| gf_mul(acc, x) ^ c)
}

fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    product
}

fn gf_inv(a: u8) -> u8 {
    // a^254 == a^-1 in GF(256)
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp != 0 {
        if exp & 1 != 0 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

fn gf_div(a: u8, b: u8) -> u8 {
    gf_mul(a, gf_inv(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_inverse() {
        for a in 1..=255u8 {
            assert_eq!(gf_mul(a, gf_inv(a)), 1, "inverse of {}", a);
        }
    }

    #[test]
    fn test_any_threshold_subset_recovers() {
        let secret = b"thirty-two bytes of private key!".to_vec();
        let partitions = split(&secret, 3, 5).unwrap();

        assert_eq!(combine(&partitions[0..3]).unwrap(), secret);
        assert_eq!(combine(&partitions[2..5]).unwrap(), secret);
        let mixed = vec![
            partitions[4].clone(),
            partitions[0].clone(),
            partitions[2].clone(),
        ];
        assert_eq!(combine(&mixed).unwrap(), secret);
    }

    #[test]
    fn test_below_threshold_is_rejected() {
        let partitions = split(b"secret", 3, 5).unwrap();
        assert_eq!(
            combine(&partitions[0..2]),
            Err(ShamirError::NotEnoughPartitions { needed: 3, got: 2 })
        );
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(split(b"secret", 0, 3).is_err());
        assert!(split(b"secret", 4, 3).is_err());
    }

    #[test]
    fn test_duplicate_index_is_rejected() {
        let partitions = split(b"secret", 2, 3).unwrap();
        let dup = vec![partitions[1].clone(), partitions[1].clone()];
        assert_eq!(combine(&dup), Err(ShamirError::DuplicateIndex(2)));
    }

    #[test]
    fn test_partition_hex_roundtrip() {
        let partitions = split(b"secret", 2, 2).unwrap();
        let hex = partitions[1].to_hex();
        assert_eq!(Partition::from_hex(2, &hex).unwrap(), partitions[1]);
        assert!(Partition::from_hex(2, "00ff").is_err());
    }
}
