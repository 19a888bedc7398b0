use nsrun_core::rng::{RngHandle, UNSEEDED};
use rand::RngCore;

#[test]
fn rng_emits_reproducible_sequence() {
    let mut rng_a = RngHandle::from_seed(1000);
    let mut rng_b = RngHandle::for_job_seed(1000);

    let seq_a: Vec<u64> = (0..100).map(|_| rng_a.next_u64()).collect();
    let seq_b: Vec<u64> = (0..100).map(|_| rng_b.next_u64()).collect();

    assert_eq!(seq_a, seq_b);
    assert!(rng_b.is_seeded());
}

#[test]
fn unseeded_jobs_draw_from_entropy() {
    let rng = RngHandle::for_job_seed(UNSEEDED);
    assert!(!rng.is_seeded());
}

#[test]
fn distinct_job_seeds_give_distinct_streams() {
    let mut first = RngHandle::for_job_seed(1000);
    let mut second = RngHandle::for_job_seed(2000);
    let a: Vec<u64> = (0..8).map(|_| first.next_u64()).collect();
    let b: Vec<u64> = (0..8).map(|_| second.next_u64()).collect();
    assert_ne!(a, b);
}
