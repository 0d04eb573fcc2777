use approx::assert_abs_diff_eq;
use microstates::sequence::{
    durations, stationary_distribution, symmetry_test, symmetry_test_counts, transition_matrix,
};
use microstates::{mark_borders, MicrostateError, SequenceStats, BORDER_SENTINEL};
use ndarray::array;

#[test]
fn alternating_sequence() {
    let labels: Vec<usize> = (0..100).map(|t| t % 2).collect();
    let t = transition_matrix(&[&labels], 2).unwrap();
    assert_eq!(t, array![[0.0, 1.0], [1.0, 0.0]]);

    let p = stationary_distribution(&[&labels], 2).unwrap();
    assert_abs_diff_eq!(p[0], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(p[1], 0.5, epsilon = 1e-12);

    // 50 transitions 0→1, 49 transitions 1→0: nearly symmetric.
    let test = symmetry_test(&[&labels], 2, 0.01).unwrap();
    assert_eq!(test.df, 1);
    assert!(!test.reject_symmetry);
}

#[test]
fn constant_sequence_is_one_run() {
    let labels = vec![2; 37];
    let stats = SequenceStats::from_labels(&labels, 3, 10.0, 0.05).unwrap();
    assert_eq!(stats.transition.row(2).to_vec(), vec![0.0, 0.0, 1.0]);
    assert_eq!(stats.transition.row(0).to_vec(), vec![0.0, 0.0, 0.0]);
    assert_eq!(stats.durations.runs[2], vec![37]);
    assert!(stats.durations.runs[0].is_empty());
    assert_abs_diff_eq!(stats.durations.mean[2], 3.7, epsilon = 1e-12);
    assert_eq!(stats.durations.mean[0], 0.0);
    assert_abs_diff_eq!(stats.entropy, 0.0, epsilon = 1e-12);
}

#[test]
fn symmetric_counts_give_zero_statistic() {
    let counts = array![[5.0, 3.0, 2.0], [3.0, 0.0, 7.0], [2.0, 7.0, 1.0]];
    let test = symmetry_test_counts(counts.view(), 0.01).unwrap();
    assert_abs_diff_eq!(test.statistic, 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(test.p_value, 1.0, epsilon = 1e-12);
    assert_eq!(test.df, 3);
    assert!(!test.reject_symmetry);
}

#[test]
fn directed_cycle_rejects_symmetry() {
    let labels: Vec<usize> = (0..600).map(|t| (t / 2) % 3).collect();
    let stats = SequenceStats::from_labels(&labels, 3, 100.0, 0.01).unwrap();
    assert!(stats.symmetry.reject_symmetry);
    assert!(stats.symmetry.p_value < 1e-10);
    // Each state holds for exactly two samples.
    for k in 0..3 {
        assert!(stats.durations.runs[k].iter().all(|&r| r == 2));
        assert_abs_diff_eq!(stats.durations.mean[k], 0.02, epsilon = 1e-12);
    }
    assert_abs_diff_eq!(stats.entropy, stats.max_entropy, epsilon = 1e-12);
}

#[test]
fn transition_rows_sum_to_one_or_zero() {
    let labels = vec![0, 0, 1, 3, 3, 1, 0, 1, 1, 3];
    let t = transition_matrix(&[&labels], 5).unwrap();
    for (i, row) in t.rows().into_iter().enumerate() {
        let s = row.sum();
        if i == 2 || i == 4 {
            assert_eq!(s, 0.0);
        } else {
            assert_abs_diff_eq!(s, 1.0, epsilon = 1e-12);
        }
    }
}

#[test]
fn border_marked_sequence_has_no_cross_epoch_transition() {
    // Two epochs of 5 samples: state 0 throughout the first, 1 in the second.
    let labels = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
    let marked = mark_borders(&labels, 2, 5, 2).unwrap();
    assert_eq!(marked, vec![88, 0, 0, 0, 88, 88, 1, 1, 1, 88]);

    let stats = SequenceStats::from_marked(&marked, BORDER_SENTINEL, 2, 5.0, 0.01).unwrap();
    assert_eq!(stats.n_samples, 6);
    assert_eq!(stats.transition_counts[[0, 1]], 0.0);
    assert_eq!(stats.transition, array![[1.0, 0.0], [0.0, 1.0]]);
    assert_eq!(stats.durations.runs, vec![vec![3], vec![3]]);
}

#[test]
fn durations_are_split_at_chunk_ends() {
    let a = [1, 1, 0];
    let b = [0, 0, 1];
    let d = durations(&[&a, &b], 2, 1.0).unwrap();
    assert_eq!(d.runs[0], vec![1, 2]);
    assert_eq!(d.runs[1], vec![2, 1]);
    assert_eq!(d.counts(), vec![2, 2]);
}

#[test]
fn label_outside_states_rejected() {
    let labels = vec![0, 1, 4];
    assert!(matches!(
        SequenceStats::from_labels(&labels, 3, 1.0, 0.01),
        Err(MicrostateError::InvalidParameter { .. })
    ));
}

#[test]
fn occurrence_rate_counts_only_analysed_samples() {
    // 10 samples at 5 Hz, 4 of them sentinels: 6 analysed samples = 1.2 s.
    let marked = [88, 0, 0, 0, 88, 88, 1, 1, 1, 88];
    let stats = SequenceStats::from_marked(&marked, BORDER_SENTINEL, 2, 5.0, 0.01).unwrap();
    assert_eq!(stats.n_samples, 6);
    for k in 0..2 {
        assert_abs_diff_eq!(stats.occurrences_per_second[k], 1.0 / 1.2, epsilon = 1e-12);
    }
}
