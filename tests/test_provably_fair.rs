use battle_arena_core::rng::{self, RngStreams};

#[test]
fn generated_commitment_verifies_and_is_stable_across_repeated_checks() {
    let commitment = rng::generate_commitment();
    assert!(rng::verify(&commitment.seed_hex, &commitment.nonce_hex, &commitment.commit_hex).unwrap());
    assert!(rng::verify(&commitment.seed_hex, &commitment.nonce_hex, &commitment.commit_hex).unwrap());
}

#[test]
fn tampered_seed_fails_verification() {
    let commitment = rng::generate_commitment();
    let mut tampered_seed = commitment.seed_hex.clone();
    tampered_seed.replace_range(0..2, if &tampered_seed[0..2] == "ff" { "00" } else { "ff" });
    assert!(!rng::verify(&tampered_seed, &commitment.nonce_hex, &commitment.commit_hex).unwrap());
}

#[test]
fn rng_streams_reproduce_the_same_spawn_positions_for_a_known_seed() {
    let seed_hex = hex::encode([42u8; 32]);
    let mut a = RngStreams::new(&seed_hex).unwrap();
    let mut b = RngStreams::new(&seed_hex).unwrap();
    let pa = a.stream(RngStreams::SPAWN).unwrap().next_point_in_disk(700.0);
    let pb = b.stream(RngStreams::SPAWN).unwrap().next_point_in_disk(700.0);
    assert_eq!(pa.0.to_bits(), pb.0.to_bits());
    assert_eq!(pa.1.to_bits(), pb.1.to_bits());
}
