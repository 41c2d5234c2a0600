use crate::prelude::{SignalError, SignalResult};

/// Factors `n` positions into the (nx, ny) pair closest to square, with
/// `nx <= ny`.
pub fn infer_grid(n: usize) -> SignalResult<(usize, usize)> {
    if n == 0 {
        return Err(SignalError::InvalidShape(
            "cannot infer a grid for zero positions".into(),
        ));
    }
    // Scanning upward to floor(sqrt(n)) keeps the last divisor, which is the
    // pair with the smallest |i - n/i|.
    let mut best = 1;
    let mut i = 1;
    while i * i <= n {
        if n % i == 0 {
            best = i;
        }
        i += 1;
    }
    Ok((best, n / best))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_square_is_square() {
        assert_eq!(infer_grid(400).unwrap(), (20, 20));
    }

    #[test]
    fn picks_closest_factor_pair() {
        assert_eq!(infer_grid(20).unwrap(), (4, 5));
        assert_eq!(infer_grid(12).unwrap(), (3, 4));
    }

    #[test]
    fn prime_counts_become_a_strip() {
        assert_eq!(infer_grid(7).unwrap(), (1, 7));
        assert_eq!(infer_grid(1).unwrap(), (1, 1));
    }

    #[test]
    fn zero_positions_fail() {
        assert!(matches!(infer_grid(0), Err(SignalError::InvalidShape(_))));
    }
}
