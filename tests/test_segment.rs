mod common;
use common::{match_maps, orthogonal_maps, synthetic_recording};
use microstates::{backfit, cluster, gfp_peaks, segment, MicrostateConfig, MicrostateError, Recording};
use ndarray::Array2;

fn cfg(n_states: usize, seed: u64) -> MicrostateConfig {
    MicrostateConfig { n_states, n_inits: 10, seed: Some(seed), ..MicrostateConfig::default() }
}

#[test]
fn recovers_generating_maps() {
    let truth = orthogonal_maps(3, 8);
    let syn = synthetic_recording(&truth, 1, 3000, 20, 0.05, 7);
    let model = segment(&syn.recording, &cfg(3, 11)).unwrap();

    assert_eq!(model.n_states(), 3);
    let matches = match_maps(&truth, &model.maps);
    for (k, &(_, r)) in matches.iter().enumerate() {
        assert!(r > 0.95, "map {k} recovered with |r| = {r:.3}");
    }
    // Every true map found a different fitted map.
    let mut idx: Vec<usize> = matches.iter().map(|&(i, _)| i).collect();
    idx.sort_unstable();
    idx.dedup();
    assert_eq!(idx.len(), 3);

    assert!(model.gev > 0.8, "GEV {:.3}", model.gev);
    assert!(model.cluster_gev > 0.8, "cluster GEV {:.3}", model.cluster_gev);
}

#[test]
fn strong_samples_get_their_generating_label() {
    let truth = orthogonal_maps(3, 8);
    let syn = synthetic_recording(&truth, 1, 3000, 20, 0.05, 3);
    let model = segment(&syn.recording, &cfg(3, 5)).unwrap();
    let matches = match_maps(&truth, &model.maps);

    let (mut agree, mut total) = (0, 0);
    for t in 0..syn.truth.len() {
        if syn.envelope[t] < 0.5 {
            continue;
        }
        total += 1;
        if model.segmentation[t] == matches[syn.truth[t]].0 {
            agree += 1;
        }
    }
    let frac = agree as f64 / total as f64;
    assert!(frac > 0.95, "only {frac:.3} of strong samples labelled correctly");
}

#[test]
fn labels_in_range_and_one_per_sample() {
    let truth = orthogonal_maps(4, 10);
    let syn = synthetic_recording(&truth, 5, 400, 25, 0.1, 1);
    let model = segment(&syn.recording, &cfg(4, 2)).unwrap();
    assert_eq!(model.segmentation.len(), syn.recording.n_samples());
    assert!(model.segmentation.iter().all(|&l| l < 4));
}

#[test]
fn backfit_is_idempotent() {
    let truth = orthogonal_maps(3, 8);
    let syn = synthetic_recording(&truth, 2, 500, 15, 0.2, 9);
    let model = segment(&syn.recording, &cfg(3, 4)).unwrap();

    let first = backfit(&syn.recording, model.maps.view()).unwrap();
    let second = backfit(&syn.recording, model.maps.view()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.labels, model.segmentation);
}

#[test]
fn segmentation_ignores_polarity() {
    let truth = orthogonal_maps(3, 8);
    let syn = synthetic_recording(&truth, 1, 600, 20, 0.1, 21);
    let model = segment(&syn.recording, &cfg(3, 8)).unwrap();

    let flipped = Recording::continuous(syn.recording.data().mapv(|v| -v), 250.0).unwrap();
    let seg = backfit(&flipped, model.maps.view()).unwrap();
    assert_eq!(seg.labels, model.segmentation);

    let neg_maps = model.maps.mapv(|v| -v);
    let seg = backfit(&syn.recording, neg_maps.view()).unwrap();
    assert_eq!(seg.labels, model.segmentation);
}

#[test]
fn same_seed_same_model() {
    let truth = orthogonal_maps(4, 8);
    let syn = synthetic_recording(&truth, 3, 300, 12, 0.3, 5);
    let a = segment(&syn.recording, &cfg(4, 99)).unwrap();
    let b = segment(&syn.recording, &cfg(4, 99)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.seed, 99);
}

#[test]
fn peaks_avoid_epoch_edges() {
    let truth = orthogonal_maps(2, 6);
    let syn = synthetic_recording(&truth, 6, 50, 7, 0.2, 13);
    let peaks = gfp_peaks(&syn.recording, &MicrostateConfig::default().peaks, 0).unwrap();
    assert!(!peaks.is_empty());
    for &p in &peaks {
        let i = p % 50;
        assert!(i != 0 && i != 49, "peak {p} sits on an epoch edge");
    }
    assert!(peaks.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn too_few_peaks_is_insufficient_data() {
    // A single hump has exactly one GFP peak.
    let data = Array2::from_shape_fn((4, 9), |(c, t)| {
        let env = (std::f64::consts::PI * t as f64 / 8.0).sin();
        env * [1.0, -1.0, 0.5, -0.5][c]
    });
    let rec = Recording::continuous(data, 100.0).unwrap();
    assert!(matches!(
        segment(&rec, &cfg(2, 0)),
        Err(MicrostateError::InsufficientData(_))
    ));
}

#[test]
fn invalid_config_rejected() {
    let truth = orthogonal_maps(2, 6);
    let syn = synthetic_recording(&truth, 1, 100, 10, 0.1, 0);
    let bad = MicrostateConfig { n_inits: 0, ..cfg(2, 0) };
    assert!(matches!(
        segment(&syn.recording, &bad),
        Err(MicrostateError::InvalidParameter { .. })
    ));
}

#[test]
fn kmeans_iteration_cap_can_be_made_fatal() {
    let truth = orthogonal_maps(3, 8);
    let syn = synthetic_recording(&truth, 1, 600, 20, 0.2, 2);
    let capped = MicrostateConfig { max_iter: 1, tol: 0.0, ..cfg(3, 1) };
    let res = cluster(&syn.recording, &capped).unwrap();
    assert!(!res.converged);
    assert_eq!(res.n_iter, 1);
    assert!(matches!(
        res.ensure_converged(capped.max_iter),
        Err(MicrostateError::ConvergenceFailure { stage: "modified k-means", max_iter: 1 })
    ));

    let res = cluster(&syn.recording, &cfg(3, 1)).unwrap();
    assert!(res.converged);
    assert!(res.ensure_converged(1000).is_ok());
}
