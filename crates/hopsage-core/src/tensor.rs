//! Backend-neutral index operations.
//!
//! The sampling and structuring code only ever needs a handful of tensor
//! primitives: reshape, split along an axis, row gather, unique-with-inverse
//! and segment reduction. They are implemented once here over `ndarray`;
//! other numeric backends convert at the edge (see [`crate::backend`]).

use crate::error::{Error, Result};
use ndarray::{concatenate, Array2, ArrayD, ArrayView2, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reshape into `shape`, copying only when the input is not in standard layout.
pub fn reshape<T: Clone>(array: ArrayD<T>, shape: &[usize]) -> Result<ArrayD<T>> {
    let array = if array.is_standard_layout() {
        array
    } else {
        array.as_standard_layout().into_owned()
    };
    Ok(array.into_shape_with_order(IxDyn(shape))?)
}

/// Elements in row-major order.
pub fn flat_values<T: Clone>(array: &ArrayD<T>) -> Vec<T> {
    array.iter().cloned().collect()
}

/// Sorted unique values plus, for every input element, its index in the
/// unique vector.
///
/// ```rust
/// use hopsage_core::tensor::unique_inverse;
///
/// let (unique, inverse) = unique_inverse(&[7, 3, 7, 9, 3]);
/// assert_eq!(unique, vec![3, 7, 9]);
/// assert_eq!(inverse, vec![1, 0, 1, 2, 0]);
/// ```
pub fn unique_inverse(values: &[i64]) -> (Vec<i64>, Vec<usize>) {
    let mut unique = values.to_vec();
    unique.sort_unstable();
    unique.dedup();
    let position: HashMap<i64, usize> = unique.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let inverse = values.iter().map(|v| position[v]).collect();
    (unique, inverse)
}

/// Split `array` along `axis` into consecutive chunks of the given widths.
pub fn split_axis<T: Clone>(array: &ArrayD<T>, axis: usize, widths: &[usize]) -> Result<Vec<ArrayD<T>>> {
    if axis >= array.ndim() {
        return Err(Error::ShapeMismatch(format!(
            "cannot split axis {} of a {}-d tensor",
            axis,
            array.ndim()
        )));
    }
    let len = array.len_of(Axis(axis));
    let total: usize = widths.iter().sum();
    if len != total {
        return Err(Error::ShapeMismatch(format!(
            "axis {} has length {}, split widths sum to {}",
            axis, len, total
        )));
    }
    let mut start = 0;
    let mut parts = Vec::with_capacity(widths.len());
    for &w in widths {
        parts.push(
            array
                .slice_axis(Axis(axis), Slice::from(start..start + w))
                .to_owned(),
        );
        start += w;
    }
    Ok(parts)
}

/// Gather rows of `table` and lay them out as `lead_shape + [table.ncols()]`.
pub fn gather_rows<T: Clone>(table: &Array2<T>, indices: &[usize], lead_shape: &[usize]) -> Result<ArrayD<T>> {
    let rows = table.nrows();
    if let Some(&bad) = indices.iter().find(|&&i| i >= rows) {
        return Err(Error::ShapeMismatch(format!(
            "gather index {} out of range for {} rows",
            bad, rows
        )));
    }
    let expected: usize = lead_shape.iter().product();
    if expected != indices.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} gather indices cannot fill shape {:?}",
            indices.len(),
            lead_shape
        )));
    }
    let gathered = table.select(Axis(0), indices);
    let mut shape = lead_shape.to_vec();
    shape.push(table.ncols());
    reshape(gathered.into_dyn(), &shape)
}

/// Concatenate same-typed `[n, d_i]` blocks along the last axis.
pub fn concat_columns<T: Clone>(blocks: &[Array2<T>]) -> Result<Array2<T>> {
    let views: Vec<ArrayView2<'_, T>> = blocks.iter().map(|b| b.view()).collect();
    concatenate(Axis(1), &views).map_err(Error::from)
}

/// Order of `keys` ascending.
///
/// A stable sort keeps equal keys in their original order; the unstable
/// variant is still deterministic for a given input.
pub fn argsort(keys: &[i64], stable: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    if stable {
        order.sort_by_key(|&i| keys[i]);
    } else {
        order.sort_unstable_by_key(|&i| keys[i]);
    }
    order
}

/// Segment reduction applied by [`segment_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduce {
    Sum,
    Mean,
    Max,
}

/// Reduce rows of `values` into `num_segments` buckets by `segment_ids`.
///
/// Buckets that receive no rows are zero for every reduction, which is what
/// scatter-style aggregation expects for vertices without sampled children.
pub fn segment_reduce(
    values: ArrayView2<'_, f32>,
    segment_ids: &[usize],
    num_segments: usize,
    reduce: Reduce,
) -> Result<Array2<f32>> {
    if values.nrows() != segment_ids.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} rows but {} segment ids",
            values.nrows(),
            segment_ids.len()
        )));
    }
    if let Some(&bad) = segment_ids.iter().find(|&&s| s >= num_segments) {
        return Err(Error::ShapeMismatch(format!(
            "segment id {} out of range for {} segments",
            bad, num_segments
        )));
    }
    let dim = values.ncols();
    let init = match reduce {
        Reduce::Max => f32::NEG_INFINITY,
        Reduce::Sum | Reduce::Mean => 0.0,
    };
    let mut out = Array2::from_elem((num_segments, dim), init);
    let mut counts = vec![0usize; num_segments];
    for (row, &seg) in values.outer_iter().zip(segment_ids) {
        counts[seg] += 1;
        let mut target = out.row_mut(seg);
        match reduce {
            Reduce::Max => target.zip_mut_with(&row, |t, &v| *t = t.max(v)),
            Reduce::Sum | Reduce::Mean => target += &row,
        }
    }
    for (seg, &count) in counts.iter().enumerate() {
        let mut target = out.row_mut(seg);
        if count == 0 {
            target.fill(0.0);
        } else if reduce == Reduce::Mean {
            target /= count as f32;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    #[test]
    fn test_unique_inverse_recovers_values() {
        let values = vec![5, -1, 5, 2, 2, 9];
        let (unique, inverse) = unique_inverse(&values);
        assert_eq!(unique, vec![-1, 2, 5, 9]);
        let recovered: Vec<i64> = inverse.iter().map(|&i| unique[i]).collect();
        assert_eq!(recovered, values);
    }

    #[test]
    fn test_split_axis() {
        let a = Array::from_shape_vec(IxDyn(&[2, 9]), (0..18i64).collect()).unwrap();
        let parts = split_axis(&a, 1, &[1, 2, 6]).unwrap();
        assert_eq!(parts[0].shape(), &[2, 1]);
        assert_eq!(parts[1].shape(), &[2, 2]);
        assert_eq!(parts[2].shape(), &[2, 6]);
        assert_eq!(parts[1][[1, 0]], 10);
        assert!(split_axis(&a, 1, &[1, 2]).is_err());
        assert!(split_axis(&a, 2, &[1]).is_err());
    }

    #[test]
    fn test_gather_rows() {
        let table = array![[0.0f32, 0.5], [1.0, 1.5], [2.0, 2.5]];
        let out = gather_rows(&table, &[2, 0, 0, 1], &[2, 2]).unwrap();
        assert_eq!(out.shape(), &[2, 2, 2]);
        assert_eq!(out[[0, 0, 1]], 2.5);
        assert_eq!(out[[1, 1, 0]], 1.0);
        assert!(gather_rows(&table, &[3], &[1]).is_err());
        assert!(gather_rows(&table, &[0, 1], &[3]).is_err());
    }

    #[test]
    fn test_concat_columns() {
        let a = array![[1i64], [2]];
        let b = array![[3i64, 4], [5, 6]];
        let c = concat_columns(&[a, b]).unwrap();
        assert_eq!(c, array![[1, 3, 4], [2, 5, 6]]);
    }

    #[test]
    fn test_argsort_stable_keeps_ties() {
        let keys = [3, 1, 3, 0, 1];
        assert_eq!(argsort(&keys, true), vec![3, 1, 4, 0, 2]);
        let unstable = argsort(&keys, false);
        let sorted: Vec<i64> = unstable.iter().map(|&i| keys[i]).collect();
        assert_eq!(sorted, vec![0, 1, 1, 3, 3]);
    }

    #[test]
    fn test_segment_reduce() {
        let values = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, -6.0]];
        let ids = [0, 0, 2];
        let sum = segment_reduce(values.view(), &ids, 3, Reduce::Sum).unwrap();
        assert_eq!(sum, array![[4.0, 6.0], [0.0, 0.0], [5.0, -6.0]]);
        let mean = segment_reduce(values.view(), &ids, 3, Reduce::Mean).unwrap();
        assert_eq!(mean, array![[2.0, 3.0], [0.0, 0.0], [5.0, -6.0]]);
        let max = segment_reduce(values.view(), &ids, 3, Reduce::Max).unwrap();
        assert_eq!(max, array![[3.0, 4.0], [0.0, 0.0], [5.0, -6.0]]);
        assert!(segment_reduce(values.view(), &[0, 1], 3, Reduce::Sum).is_err());
        assert!(segment_reduce(values.view(), &[0, 1, 3], 3, Reduce::Sum).is_err());
    }
}
