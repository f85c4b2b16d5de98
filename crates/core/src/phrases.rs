use rand::Rng;

/// Farewells spoken when the user leaves the conversation.
pub const GOODBYE_PHRASES: [&str; 4] = [
    "Cool cool, see ya next time",
    "Okay, see ya",
    "Until next time, take care!",
    "Peace out, see you soon!",
];

/// Picks a farewell uniformly at random using the thread-local generator.
pub fn goodbye_phrase() -> &'static str {
    goodbye_phrase_with(&mut rand::rng())
}

/// Picks a farewell using the supplied generator.
pub fn goodbye_phrase_with<R: Rng>(rng: &mut R) -> &'static str {
    GOODBYE_PHRASES[rng.random_range(0..GOODBYE_PHRASES.len())]
}
