//! Genres offered for browsing, as shown to the listener.

/// Display labels, in presentation order.
pub const GENRES: &[&str] = &[
    "Pop",
    "Rock",
    "Jazz",
    "Classical",
    "Electronic",
    "Hip Hop",
    "Country",
    "R&B",
    "Blues",
    "Folk",
];

/// Directory tag for a genre label (`"Hip Hop"` → `"hip hop"`).
pub fn genre_tag(label: &str) -> String {
    label.trim().to_lowercase()
}
