// Mask algebra: moving data between the dense (N, R) region grid and the
// flattened subset of slots a boolean mask selects.
//
// Flattened order is always row-major over (image, region). `compact_*` and
// `scatter_*` are inverses on the mask's true positions; scatter fills the
// rest with a caller-provided default. Shape mismatches are typed errors,
// never silently broadcast.

use ndarray::{s, Array2, Array3};

use crate::core::errors::{MaskError, MaskResult};

/// Row-major (image, region) positions where the mask is true.
pub fn flat_indices(mask: &Array2<bool>) -> Vec<(usize, usize)> {
    let (n, r) = mask.dim();
    let mut out = Vec::new();
    for i in 0..n {
        for j in 0..r {
            if mask[[i, j]] {
                out.push((i, j));
            }
        }
    }
    out
}

/// Number of true positions.
pub fn count(mask: &Array2<bool>) -> usize {
    mask.iter().filter(|&&v| v).count()
}

/// Elementwise logical AND of two masks of identical shape.
pub fn and(a: &Array2<bool>, b: &Array2<bool>) -> MaskResult<Array2<bool>> {
    if a.dim() != b.dim() {
        return Err(MaskError::ShapeMismatch {
            left: a.dim(),
            right: b.dim(),
        });
    }
    let mut out = a.clone();
    out.zip_mut_with(b, |x, &y| *x = *x && y);
    Ok(out)
}

/// Compact an (N, R, D) feature grid to the (K, D) rows the mask selects.
pub fn compact_features(features: &Array3<f32>, mask: &Array2<bool>) -> MaskResult<Array2<f32>> {
    let (n, r, d) = features.dim();
    if (n, r) != mask.dim() {
        return Err(MaskError::GridMismatch {
            grid: (n, r),
            mask: mask.dim(),
        });
    }

    let indices = flat_indices(mask);
    let mut out = Array2::zeros((indices.len(), d));
    for (row, &(i, j)) in indices.iter().enumerate() {
        out.slice_mut(s![row, ..]).assign(&features.slice(s![i, j, ..]));
    }
    Ok(out)
}

/// Compact an (N*R, L) row grid (token ids, attention masks) to the K rows
/// the mask selects. Row `i * r + j` of the grid belongs to slot (i, j).
pub fn compact_rows(rows: &Array2<i64>, mask: &Array2<bool>) -> MaskResult<Array2<i64>> {
    let (n, r) = mask.dim();
    let (total, width) = rows.dim();
    if total != n * r {
        return Err(MaskError::RowCountMismatch {
            selected: n * r,
            got: total,
        });
    }

    let indices = flat_indices(mask);
    let mut out = Array2::zeros((indices.len(), width));
    for (row, &(i, j)) in indices.iter().enumerate() {
        out.slice_mut(s![row, ..]).assign(&rows.slice(s![i * r + j, ..]));
    }
    Ok(out)
}

/// Scatter K compacted rows back into a dense (N*R, L) grid, filling
/// non-selected rows with `default`. Left inverse of [`compact_rows`].
pub fn scatter_rows(flat: &Array2<i64>, mask: &Array2<bool>, default: i64) -> MaskResult<Array2<i64>> {
    let (n, r) = mask.dim();
    let indices = flat_indices(mask);
    let (k, width) = flat.dim();
    if k != indices.len() {
        return Err(MaskError::RowCountMismatch {
            selected: indices.len(),
            got: k,
        });
    }

    let mut out = Array2::from_elem((n * r, width), default);
    for (row, &(i, j)) in indices.iter().enumerate() {
        out.slice_mut(s![i * r + j, ..]).assign(&flat.slice(s![row, ..]));
    }
    Ok(out)
}

/// Scatter K flattened values back into per-image, per-region slots:
/// `Some(value)` where the mask is true, `None` elsewhere. Used to regroup
/// generated sentences per image in region order.
pub fn scatter_values<T: Clone>(flat: &[T], mask: &Array2<bool>) -> MaskResult<Vec<Vec<Option<T>>>> {
    let (n, r) = mask.dim();
    let indices = flat_indices(mask);
    if flat.len() != indices.len() {
        return Err(MaskError::RowCountMismatch {
            selected: indices.len(),
            got: flat.len(),
        });
    }

    let mut out: Vec<Vec<Option<T>>> = vec![vec![None; r]; n];
    for (value, &(i, j)) in flat.iter().zip(indices.iter()) {
        out[i][j] = Some(value.clone());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn mask_2x3(values: [[bool; 3]; 2]) -> Array2<bool> {
        array![
            [values[0][0], values[0][1], values[0][2]],
            [values[1][0], values[1][1], values[1][2]]
        ]
    }

    #[test]
    fn test_flat_indices_row_major() {
        let mask = mask_2x3([[false, true, false], [true, false, true]]);
        assert_eq!(flat_indices(&mask), vec![(0, 1), (1, 0), (1, 2)]);
        assert_eq!(count(&mask), 3);
    }

    #[test]
    fn test_and_rejects_shape_mismatch() {
        let a = Array2::from_elem((2, 3), true);
        let b = Array2::from_elem((3, 2), true);
        assert!(matches!(and(&a, &b), Err(MaskError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_and_is_elementwise() {
        let a = mask_2x3([[true, true, false], [false, true, true]]);
        let b = mask_2x3([[true, false, false], [true, true, false]]);
        let c = and(&a, &b).unwrap();
        assert_eq!(c, mask_2x3([[true, false, false], [false, true, false]]));
    }

    #[test]
    fn test_compact_features_selects_masked_rows() {
        let mut features = Array3::zeros((2, 3, 2));
        for i in 0..2 {
            for j in 0..3 {
                features[[i, j, 0]] = (i * 3 + j) as f32;
                features[[i, j, 1]] = 10.0 + (i * 3 + j) as f32;
            }
        }
        let mask = mask_2x3([[false, true, false], [true, false, true]]);

        let compact = compact_features(&features, &mask).unwrap();
        assert_eq!(compact.dim(), (3, 2));
        assert_eq!(compact[[0, 0]], 1.0);
        assert_eq!(compact[[1, 0]], 3.0);
        assert_eq!(compact[[2, 0]], 5.0);
    }

    #[test]
    fn test_compact_features_rejects_grid_mismatch() {
        let features = Array3::<f32>::zeros((2, 3, 4));
        let mask = Array2::from_elem((2, 4), true);
        assert!(matches!(
            compact_features(&features, &mask),
            Err(MaskError::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_rows_round_trip_restores_selected_and_defaults_rest() {
        let rows = Array2::from_shape_fn((6, 2), |(i, j)| (i * 2 + j) as i64);
        let mask = mask_2x3([[true, false, true], [false, false, true]]);

        let compact = compact_rows(&rows, &mask).unwrap();
        assert_eq!(compact.dim(), (3, 2));

        let dense = scatter_rows(&compact, &mask, -1).unwrap();
        for &(i, j) in &flat_indices(&mask) {
            let row = i * 3 + j;
            assert_eq!(dense[[row, 0]], rows[[row, 0]]);
            assert_eq!(dense[[row, 1]], rows[[row, 1]]);
        }
        // Non-selected rows hold the default
        assert_eq!(dense[[1, 0]], -1);
        assert_eq!(dense[[3, 1]], -1);
    }

    #[test]
    fn test_round_trip_all_false_mask() {
        let rows = Array2::from_shape_fn((6, 2), |(i, j)| (i + j) as i64);
        let mask = Array2::from_elem((2, 3), false);

        let compact = compact_rows(&rows, &mask).unwrap();
        assert_eq!(compact.dim(), (0, 2));

        let dense = scatter_rows(&compact, &mask, 7).unwrap();
        assert!(dense.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_round_trip_all_true_mask() {
        let rows = Array2::from_shape_fn((6, 2), |(i, j)| (i * 10 + j) as i64);
        let mask = Array2::from_elem((2, 3), true);

        let compact = compact_rows(&rows, &mask).unwrap();
        let dense = scatter_rows(&compact, &mask, 0).unwrap();
        assert_eq!(dense, rows);
    }

    #[test]
    fn test_scatter_rows_rejects_wrong_row_count() {
        let mask = mask_2x3([[true, false, false], [false, false, false]]);
        let flat = Array2::<i64>::zeros((2, 4));
        assert!(matches!(
            scatter_rows(&flat, &mask, 0),
            Err(MaskError::RowCountMismatch { selected: 1, got: 2 })
        ));
    }

    #[test]
    fn test_scatter_values_regroups_per_slot() {
        let mask = mask_2x3([[false, true, false], [true, false, true]]);
        let flat = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let grouped = scatter_values(&flat, &mask).unwrap();
        assert_eq!(grouped[0], vec![None, Some("a".to_string()), None]);
        assert_eq!(
            grouped[1],
            vec![Some("b".to_string()), None, Some("c".to_string())]
        );
    }
}
