use unicode_normalization::UnicodeNormalization;

/// Converts text to an ASCII, lowercase, hyphen-separated slug.
///
/// Accents are folded (`Medellín` becomes `medellin`), characters without an
/// ASCII decomposition are dropped and runs of whitespace or hyphens collapse
/// into a single `-`.
pub fn slugify(text: &str) -> String {
    let folded: String = text
        .nfkd()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .to_lowercase();

    folded
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .trim_matches('_')
        .to_string()
}
