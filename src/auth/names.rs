//! Human-readable display names for hosts that register without one

use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brisk", "calm", "clever", "crisp", "eager", "fleet",
    "gentle", "glad", "keen", "lively", "lucid", "mellow", "nimble", "noble",
    "polished", "quiet", "rapid", "rustic", "silent", "steady", "swift",
    "vivid",
];

const NOUNS: &[&str] = &[
    "badger", "bison", "crane", "falcon", "ferret", "finch", "heron", "ibis",
    "lynx", "marmot", "marten", "osprey", "otter", "owl", "petrel", "plover",
    "raven", "seal", "shrew", "stoat", "swift", "tern", "walrus", "wren",
];

/// Synthesize a two-word name like "brisk-otter".
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    // both lists are non-empty, choose cannot fail
    let adjective = ADJECTIVES.choose(&mut rng).unwrap();
    let noun = NOUNS.choose(&mut rng).unwrap();
    format!("{adjective}-{noun}")
}
