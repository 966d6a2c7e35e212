//! Entity class name to storage identifier conversion.
//!
//! Table names and migration tokens are both derived here so that the two
//! never drift apart.

/// Separator placed between name segments.
pub const SEGMENT_SEPARATOR: char = '_';

/// Convert an entity class name into its storage identifier.
///
/// The name is split before every uppercase letter (except a leading one),
/// each segment is lower-cased and the segments are joined with `_`:
/// `ArticleTag` becomes `article_tag`.
pub fn table_name(class_name: &str) -> String {
    let mut table = String::with_capacity(class_name.len() + 4);

    for (i, ch) in class_name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            table.push(SEGMENT_SEPARATOR);
        }
        table.extend(ch.to_lowercase());
    }

    table
}

/// Convert a storage identifier back into an entity class name.
///
/// Inverse of [`table_name`] for names whose segments start with an
/// uppercase letter: `article_tag` becomes `ArticleTag`.
pub fn class_name(table: &str) -> String {
    table
        .split(SEGMENT_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
