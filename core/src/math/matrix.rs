use ndarray::{Array2, ArrayView2};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Multiply two 2D arrays.
    pub fn multiply(lhs: ArrayView2<f64>, rhs: ArrayView2<f64>) -> Array2<f64> {
        lhs.dot(&rhs)
    }

    /// Gauss-Jordan inverse with partial pivoting. `None` for non-square or
    /// singular input.
    pub fn invert(matrix: ArrayView2<f64>) -> Option<Array2<f64>> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return None;
        }
        let n = rows;
        let mut aug = Array2::<f64>::zeros((n, 2 * n));
        for i in 0..n {
            for j in 0..n {
                aug[[i, j]] = matrix[[i, j]];
            }
            aug[[i, n + i]] = 1.0;
        }

        for col in 0..n {
            let pivot_row = (col..n).max_by(|&a, &b| {
                aug[[a, col]].abs().total_cmp(&aug[[b, col]].abs())
            })?;
            if aug[[pivot_row, col]].abs() < 1e-12 {
                return None;
            }
            if pivot_row != col {
                for j in 0..2 * n {
                    aug.swap([col, j], [pivot_row, j]);
                }
            }

            let pivot = aug[[col, col]];
            for j in 0..2 * n {
                aug[[col, j]] /= pivot;
            }

            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = aug[[row, col]];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }

        Some(aug.slice(ndarray::s![.., n..]).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn invert_recovers_identity() {
        let m = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = MatrixHelper::invert(m.view()).unwrap();
        let product = MatrixHelper::multiply(m.view(), inv.view());
        for ((i, j), value) in product.indexed_iter() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!((value - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn invert_rejects_singular_matrix() {
        let m = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(MatrixHelper::invert(m.view()).is_none());
    }
}
