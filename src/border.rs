//! Epoch border marking.
//!
//! Concatenated epochs are not continuous in time, so a transition from the
//! last sample of one epoch to the first sample of the next is meaningless.
//! [`mark_borders`] overwrites the first and last label of every epoch with a
//! sentinel outside the label range; [`split_at_borders`] then yields the
//! sentinel-free stretches that sequence statistics are computed over.

use crate::error::{MicrostateError, Result};

/// Sentinel written at epoch borders.
pub const BORDER_SENTINEL: usize = 88;

/// Copy of `labels` with the first and last sample of each epoch set to
/// [`BORDER_SENTINEL`].
///
/// # Errors
///
/// * `InvalidShape` if `labels.len() != n_epochs * epoch_len` or
///   `epoch_len < 2`.
/// * `InvalidParameter` if `n_states` reaches the sentinel value.
pub fn mark_borders(labels: &[usize], n_epochs: usize, epoch_len: usize, n_states: usize) -> Result<Vec<usize>> {
    mark_borders_with(labels, n_epochs, epoch_len, n_states, BORDER_SENTINEL)
}

/// [`mark_borders`] with a caller-chosen sentinel.
pub fn mark_borders_with(
    labels: &[usize],
    n_epochs: usize,
    epoch_len: usize,
    n_states: usize,
    sentinel: usize,
) -> Result<Vec<usize>> {
    if sentinel < n_states {
        return Err(MicrostateError::invalid_param(
            "sentinel",
            format!("{sentinel} collides with labels of {n_states} states"),
        ));
    }
    if epoch_len < 2 {
        return Err(MicrostateError::shape(format!("epochs of {epoch_len} sample(s) have no interior")));
    }
    if labels.len() != n_epochs * epoch_len {
        return Err(MicrostateError::shape(format!(
            "{} labels for {n_epochs} epochs × {epoch_len} samples",
            labels.len()
        )));
    }
    let mut marked = labels.to_vec();
    for e in 0..n_epochs {
        marked[e * epoch_len] = sentinel;
        marked[(e + 1) * epoch_len - 1] = sentinel;
    }
    Ok(marked)
}

/// Flat copy of `marked` with every sentinel removed.
pub fn strip_borders(marked: &[usize], sentinel: usize) -> Vec<usize> {
    marked.iter().copied().filter(|&l| l != sentinel).collect()
}

/// Maximal sentinel-free stretches of `marked`, in order. Empty stretches
/// (e.g. between the two sentinels at an epoch join) are skipped.
pub fn split_at_borders(marked: &[usize], sentinel: usize) -> Vec<&[usize]> {
    marked.split(|&l| l == sentinel).filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_first_and_last_of_each_epoch() {
        let labels = vec![0, 1, 2, 1, 0, 2, 2, 1, 0];
        let marked = mark_borders(&labels, 3, 3, 3).unwrap();
        assert_eq!(marked, vec![88, 1, 88, 88, 0, 88, 88, 1, 88]);
    }

    #[test]
    fn strip_restores_length_minus_two_per_epoch() {
        let labels = vec![1; 20];
        let marked = mark_borders(&labels, 4, 5, 2).unwrap();
        assert_eq!(marked.iter().filter(|&&l| l == BORDER_SENTINEL).count(), 8);
        assert_eq!(strip_borders(&marked, BORDER_SENTINEL).len(), 12);
    }

    #[test]
    fn split_keeps_epoch_interiors_apart() {
        let marked = vec![88, 0, 1, 88, 88, 1, 1, 88];
        let parts = split_at_borders(&marked, 88);
        assert_eq!(parts, vec![&[0_usize, 1][..], &[1_usize, 1][..]]);
    }

    #[test]
    fn length_mismatch_rejected() {
        assert!(matches!(
            mark_borders(&[0; 7], 2, 4, 2),
            Err(MicrostateError::InvalidShape(_))
        ));
    }

    #[test]
    fn sentinel_must_lie_outside_labels() {
        assert!(mark_borders_with(&[0; 8], 2, 4, 5, 3).is_err());
        assert!(mark_borders(&[0; 8], 2, 4, 89).is_err());
    }
}
