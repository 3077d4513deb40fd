//! Random stack names for deployments that do not supply one.

use rand::Rng;

const ADJECTIVES: [&str; 24] = [
    "amber", "bold", "brisk", "calm", "clever", "crisp", "deep", "eager", "fleet", "gentle",
    "keen", "lively", "lucid", "mellow", "nimble", "proud", "quiet", "rapid", "solid", "steady",
    "swift", "tidy", "vivid", "warm",
];

const NOUNS: [&str; 24] = [
    "anchor", "beacon", "bridge", "canyon", "cedar", "comet", "delta", "ember", "falcon", "fjord",
    "glacier", "harbor", "heron", "isle", "lagoon", "maple", "meadow", "orchid", "osprey", "quarry",
    "reef", "ridge", "sparrow", "summit",
];

/// Generate a `adjective_noun` stack name.
pub fn random_stack_name() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    format!("{adjective}_{noun}")
}
