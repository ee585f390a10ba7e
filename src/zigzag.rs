//! Signed/unsigned residual mapping.
//!
//! Prediction residuals are small signed values; the entropy coders want
//! small unsigned symbols. The zig-zag map interleaves negatives and
//! positives: 0, -1, 1, -2, 2, ... The wraparound variant additionally
//! reflects mapped values that fall outside a compacted value domain back
//! into it, which keeps residuals dense after gap removal.

/// Map a signed residual to an unsigned symbol.
#[inline]
pub fn zigzag(x: i16) -> u16 {
    ((x << 1) ^ (x >> 15)) as u16
}

/// Inverse of [`zigzag`].
#[inline]
pub fn unzigzag(u: u16) -> i16 {
    ((u >> 1) as i16) ^ -((u & 1) as i16)
}

/// [`zigzag`] with reflection into `[0, modulus)`.
///
/// `modulus` is the number of distinct values in the compacted domain; 0
/// disables the reflection. Callers only enable it for `modulus <= 32768`
/// so the residual always fits `i16` exactly.
#[inline]
pub fn zigzag_wrap(x: i16, modulus: u16) -> u16 {
    let ux = zigzag(x);
    if modulus > 1 && ux >= modulus {
        // ux < 2*modulus, so this stays in [0, modulus) even when
        // 2*modulus wraps at 65536.
        modulus
            .wrapping_mul(2)
            .wrapping_sub(ux)
            .wrapping_sub(1)
    } else {
        ux
    }
}

/// Inverse of [`zigzag_wrap`]: apply the residual to a prediction inside
/// `[0, modulus)`.
///
/// The reflected map is two-to-one on symbols, but exactly one of the two
/// candidate pixel values lands inside the domain, so the prediction
/// disambiguates.
#[inline]
pub fn unzigzag_wrap(u: u16, pred: u16, modulus: u16) -> u16 {
    if modulus > 1 {
        let mut v = i32::from(pred) + i32::from(unzigzag(u));
        let m = i32::from(modulus);
        if v < 0 {
            v += m;
        } else if v >= m {
            v -= m;
        }
        v as u16
    } else {
        pred.wrapping_add(unzigzag(u) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zigzag_small_values() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        assert_eq!(zigzag(2), 4);
        assert_eq!(zigzag(i16::MIN), 65535);
        assert_eq!(zigzag(i16::MAX), 65534);
    }

    #[test]
    fn test_unzigzag_small_values() {
        assert_eq!(unzigzag(0), 0);
        assert_eq!(unzigzag(1), -1);
        assert_eq!(unzigzag(2), 1);
        assert_eq!(unzigzag(65535), i16::MIN);
        assert_eq!(unzigzag(65534), i16::MAX);
    }

    #[test]
    fn test_wrap_reflects_into_domain() {
        // modulus 10: zigzag(6) = 12 >= 10 reflects to 2*10 - 12 - 1 = 7.
        assert_eq!(zigzag_wrap(6, 10), 7);
        assert_eq!(zigzag_wrap(-6, 10), 8);
        // In-range values pass through.
        assert_eq!(zigzag_wrap(4, 10), 8 + 0);
        assert_eq!(zigzag_wrap(-4, 10), 7 + 0);
    }

    #[test]
    fn test_wrap_roundtrip_exhaustive_small_domain() {
        for m in [2u16, 3, 5, 10, 255] {
            for pred in 0..m {
                for v in 0..m {
                    let diff = (i32::from(v) - i32::from(pred)) as i16;
                    let u = zigzag_wrap(diff, m);
                    assert!(u < m, "symbol {} outside domain {}", u, m);
                    assert_eq!(unzigzag_wrap(u, pred, m), v, "m={} pred={} v={}", m, pred, v);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn prop_zigzag_bijection(x in i16::MIN..=i16::MAX) {
            prop_assert_eq!(unzigzag(zigzag(x)), x);
        }

        #[test]
        fn prop_zigzag_orders_by_magnitude(x in -16384i16..=16384) {
            // |zigzag| grows with |x|, which is what makes the delta codes
            // cheap for small residuals.
            prop_assert!(u32::from(zigzag(x)) <= 2 * (x.unsigned_abs() as u32));
        }

        #[test]
        fn prop_wrap_roundtrip(pred in 0u16..32768, v in 0u16..32768, m in 2u16..=32768) {
            let pred = pred % m;
            let v = v % m;
            let diff = (i32::from(v) - i32::from(pred)) as i16;
            let u = zigzag_wrap(diff, m);
            prop_assert!(u < m);
            prop_assert_eq!(unzigzag_wrap(u, pred, m), v);
        }
    }
}
