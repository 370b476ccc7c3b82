//! Householder QR decomposition with column pivoting.

/// Pivot order and R diagonal from a pivoted QR decomposition.
///
/// `pivots[k]` is the original index of the column processed at step `k`;
/// indices past the number of decomposition steps keep their relative input
/// order. `r_diag[k]` is `|R[k][k]|` for step `k` and there are
/// `min(n_rows, n_cols)` entries.
#[derive(Debug, Clone)]
pub(crate) struct PivotedQr {
    pub(crate) pivots: Vec<usize>,
    pub(crate) r_diag: Vec<f64>,
}

impl PivotedQr {
    /// Numerical rank at relative tolerance `tol`: the number of diagonal
    /// entries with `|r_kk| > tol * |r_00|`. An all-zero matrix has rank 0.
    pub(crate) fn rank(&self, tol: f64) -> usize {
        let Some(&first) = self.r_diag.first() else {
            return 0;
        };
        if first == 0.0 {
            return 0;
        }
        self.r_diag.iter().take_while(|&&d| d > tol * first).count()
    }
}

/// Decompose `columns` (column-major) in place, greedily pivoting the column
/// with the largest residual norm to the front at each step.
///
/// Columns whose residual vanishes lie in the span of the columns already
/// processed; they end up past the numerical rank in the pivot order with a
/// (near-)zero R diagonal.
pub(crate) fn pivoted_qr(columns: &mut [Vec<f64>]) -> PivotedQr {
    let n_cols = columns.len();
    let n_rows = columns.first().map_or(0, Vec::len);
    let steps = n_cols.min(n_rows);

    let mut pivots: Vec<usize> = (0..n_cols).collect();
    let mut r_diag = vec![0.0; steps];

    for k in 0..steps {
        // Exact residual norms are cheap at this scale and avoid the
        // instability of downdating running norms.
        let mut best = k;
        let mut best_norm_sq = residual_norm_sq(&columns[k], k);
        for j in (k + 1)..n_cols {
            let norm_sq = residual_norm_sq(&columns[j], k);
            if norm_sq > best_norm_sq {
                best = j;
                best_norm_sq = norm_sq;
            }
        }
        columns.swap(k, best);
        pivots.swap(k, best);

        let norm = best_norm_sq.sqrt();
        r_diag[k] = norm;
        if norm == 0.0 {
            // Every remaining column is spanned by the processed ones;
            // the remaining diagonal entries are all zero.
            break;
        }

        // Householder reflector for rows k.. of column k, sign chosen to
        // avoid cancellation.
        let mut v: Vec<f64> = columns[k][k..].to_vec();
        let alpha = if v[0] >= 0.0 { norm } else { -norm };
        v[0] += alpha;
        let v_norm_sq: f64 = v.iter().map(|x| x * x).sum();

        for j in (k + 1)..n_cols {
            let dot: f64 = v
                .iter()
                .zip(&columns[j][k..])
                .map(|(vi, ci)| vi * ci)
                .sum();
            let scale = 2.0 * dot / v_norm_sq;
            for (vi, ci) in v.iter().zip(columns[j][k..].iter_mut()) {
                *ci -= scale * vi;
            }
        }

        // Column k is now upper-triangular: R[k][k] = -alpha, zeros below.
        columns[k][k] = -alpha;
        for value in columns[k][(k + 1)..].iter_mut() {
            *value = 0.0;
        }
    }

    PivotedQr { pivots, r_diag }
}

/// Squared norm of rows `k..` of a column (the part not yet reduced).
fn residual_norm_sq(column: &[f64], k: usize) -> f64 {
    column[k..].iter().map(|x| x * x).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build column-major columns from row-major literals.
    fn columns(rows: &[&[f64]]) -> Vec<Vec<f64>> {
        let n_cols = rows[0].len();
        (0..n_cols)
            .map(|j| rows.iter().map(|r| r[j]).collect())
            .collect()
    }

    #[test]
    fn full_rank_identity() {
        let mut cols = columns(&[
            &[1.0, 0.0, 0.0],
            &[0.0, 1.0, 0.0],
            &[0.0, 0.0, 1.0],
        ]);
        let qr = pivoted_qr(&mut cols);
        assert_eq!(qr.rank(1e-7), 3);
        for d in &qr.r_diag {
            assert!((d - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn duplicate_column_drops_rank() {
        // Third column equals the first.
        let mut cols = columns(&[
            &[1.0, 0.0, 1.0],
            &[2.0, 1.0, 2.0],
            &[3.0, 0.0, 3.0],
            &[4.0, 1.0, 4.0],
        ]);
        let qr = pivoted_qr(&mut cols);
        assert_eq!(qr.rank(1e-7), 2);
        // The deficient pivot is one of the duplicated columns.
        let last = qr.pivots[2];
        assert!(last == 0 || last == 2, "unexpected pivot {last}");
    }

    #[test]
    fn scaled_column_drops_rank() {
        // Second column is -3x the first.
        let mut cols = columns(&[&[1.0, -3.0], &[2.0, -6.0], &[5.0, -15.0]]);
        let qr = pivoted_qr(&mut cols);
        assert_eq!(qr.rank(1e-7), 1);
    }

    #[test]
    fn zero_matrix_has_rank_zero() {
        let mut cols = columns(&[&[0.0, 0.0], &[0.0, 0.0]]);
        let qr = pivoted_qr(&mut cols);
        assert_eq!(qr.rank(1e-7), 0);
    }

    #[test]
    fn pivot_order_starts_with_largest_column() {
        // Second column has much larger norm, so it is pivoted first.
        let mut cols = columns(&[&[1.0, 10.0], &[0.0, 10.0], &[0.0, 10.0]]);
        let qr = pivoted_qr(&mut cols);
        assert_eq!(qr.pivots[0], 1);
    }

    #[test]
    fn diagonal_is_non_increasing() {
        let mut cols = columns(&[
            &[2.0, 1.0, 0.5, 0.1],
            &[0.0, 1.0, 0.5, 0.2],
            &[1.0, 0.0, 0.5, 0.3],
            &[3.0, 1.0, 0.0, 0.4],
            &[0.5, 2.0, 1.0, 0.5],
        ]);
        let qr = pivoted_qr(&mut cols);
        for pair in qr.r_diag.windows(2) {
            assert!(pair[0] >= pair[1] - 1e-9, "diagonal increased: {pair:?}");
        }
    }

    #[test]
    fn wide_matrix_rank_capped_by_rows() {
        // 2 rows, 4 columns: rank can be at most 2.
        let mut cols = columns(&[&[1.0, 0.0, 1.0, 2.0], &[0.0, 1.0, 1.0, 3.0]]);
        let qr = pivoted_qr(&mut cols);
        assert_eq!(qr.r_diag.len(), 2);
        assert_eq!(qr.rank(1e-7), 2);
        assert_eq!(qr.pivots.len(), 4);
    }
}
