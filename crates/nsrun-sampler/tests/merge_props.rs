use nsrun_sampler::{log_weights, merge_threads, DeadPoint};
use proptest::prelude::*;

fn thread(mut logls: Vec<f64>) -> Vec<DeadPoint> {
    logls.sort_by(f64::total_cmp);
    let n = logls.len();
    logls
        .into_iter()
        .enumerate()
        .map(|(index, logl)| DeadPoint {
            logl,
            nlive: (n - index) as u64,
            theta: Vec::new(),
        })
        .collect()
}

proptest! {
    #[test]
    fn merged_thread_is_sorted_and_complete(
        a in prop::collection::vec(-50.0f64..0.0, 1..40),
        b in prop::collection::vec(-50.0f64..0.0, 1..40),
    ) {
        let first = thread(a);
        let second = thread(b);
        let merged = merge_threads(&first, &second);
        prop_assert_eq!(merged.len(), first.len() + second.len());
        prop_assert!(merged.windows(2).all(|w| w[0].logl <= w[1].logl));
        prop_assert_eq!(merged[0].nlive, first[0].nlive + second[0].nlive);
        prop_assert_eq!(merged.last().map(|p| p.nlive), Some(1));
        let (log_z, _) = log_weights(&merged);
        prop_assert!(log_z.is_finite());
    }
}
