//! # Name Validation and Path Tokenization
//!
//! Entries are addressed by names like `network.proxy.port`: local segments
//! joined by the store's delimiter character. A valid name
//!
//! - is not empty,
//! - does not start or end with the delimiter,
//! - contains no two adjacent delimiters.
//!
//! Validation is character-exact: no Unicode normalization or case folding
//! is performed before comparison or storage, so `NAME`, `Name` and `name`
//! are three different entries.
//!
//! The empty string is not a valid name; read-side APIs accept it as a
//! stand-in for the root entry, everything else rejects it with
//! [`InvalidName`](crate::Error::InvalidName).

/// Returns whether `name` is a valid entry path for the given delimiter.
///
/// ```rust
/// use conftree::name::is_valid_name;
///
/// assert!(is_valid_name("a.b.c", '.'));
/// assert!(!is_valid_name("", '.'));
/// assert!(!is_valid_name(".a", '.'));
/// assert!(!is_valid_name("a.", '.'));
/// assert!(!is_valid_name("a..b", '.'));
/// ```
pub fn is_valid_name(name: &str, delimiter: char) -> bool {
    if name.is_empty() {
        return false;
    }

    if name.starts_with(delimiter) || name.ends_with(delimiter) {
        return false;
    }

    // No two consecutive delimiters.
    let mut previous_was_delimiter = false;
    for c in name.chars() {
        if c == delimiter {
            if previous_was_delimiter {
                return false;
            }
            previous_was_delimiter = true;
        } else {
            previous_was_delimiter = false;
        }
    }

    true
}

/// Splits a name into its local segments at delimiter boundaries.
///
/// The caller must have validated the name first: validation guarantees the
/// result is non-empty and contains no empty segments.
pub(crate) fn split_name(name: &str, delimiter: char) -> Vec<String> {
    name.split(delimiter).map(str::to_owned).collect()
}

/// Joins local segments back into a full name with the delimiter.
pub(crate) fn join_path(path: &[String], delimiter: char) -> String {
    let mut name = String::new();
    for segment in path {
        if !name.is_empty() {
            name.push(delimiter);
        }
        name.push_str(segment);
    }
    name
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Every printable ASCII character except the delimiter, plus a few
    /// characters beyond ASCII. Names built from this set must validate.
    fn name_charset(delimiter: char) -> String {
        let template = "!\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                        [\\]^_`abcdefghijklmnopqrstuvwxyz{|}~äöüß€";
        template.chars().filter(|&c| c != delimiter).collect()
    }

    #[test]
    fn test_rejects_empty_and_delimiter_misuse() {
        assert!(!is_valid_name("", '.'));

        assert!(!is_valid_name(".", '.'));
        assert!(!is_valid_name("..", '.'));
        assert!(!is_valid_name("...", '.'));
        assert!(!is_valid_name(".name1.name2", '.'));
        assert!(!is_valid_name("name1.name2.", '.'));
        assert!(!is_valid_name("..name1.name2", '.'));
        assert!(!is_valid_name("name1.name2..", '.'));
        assert!(!is_valid_name("name1..name2", '.'));
        assert!(!is_valid_name("name1...name2", '.'));
        assert!(!is_valid_name(".1.2", '.'));
        assert!(!is_valid_name("1.2.", '.'));
        assert!(!is_valid_name("1..2", '.'));
    }

    #[test]
    fn test_accepts_well_formed_names() {
        assert!(is_valid_name("name", '.'));
        assert!(is_valid_name("name.name", '.'));
        assert!(is_valid_name("name.name.name", '.'));
        assert!(is_valid_name("1", '.'));
        assert!(is_valid_name("2.2", '.'));
        assert!(is_valid_name("1.3.1", '.'));

        // A segment may contain every character except the delimiter.
        assert!(is_valid_name(&name_charset('.'), '.'));
    }

    /// Validation must follow whatever delimiter is in effect, not just '.'.
    #[test]
    fn test_every_charset_character_works_as_delimiter() {
        for delimiter in name_charset('\0').chars() {
            assert!(!is_valid_name("", delimiter));
            assert!(!is_valid_name(&delimiter.to_string(), delimiter));
            assert!(
                !is_valid_name(&format!("{delimiter}{delimiter}"), delimiter),
                "double delimiter '{delimiter}' must be invalid"
            );

            let segment: String = name_charset(delimiter);
            assert!(is_valid_name(&segment, delimiter));
            assert!(is_valid_name(
                &format!("{segment}{delimiter}{segment}"),
                delimiter
            ));
        }
    }

    #[test]
    fn test_split_and_join_are_inverse() {
        let path = split_name("a.b.c", '.');
        assert_eq!(path, vec!["a", "b", "c"]);
        assert_eq!(join_path(&path, '.'), "a.b.c");

        let path = split_name("single", '.');
        assert_eq!(path, vec!["single"]);
        assert_eq!(join_path(&path, '.'), "single");

        // Round trip with a non-default delimiter; '.' is just a character.
        let path = split_name("a.b/c.d", '/');
        assert_eq!(path, vec!["a.b", "c.d"]);
        assert_eq!(join_path(&path, '/'), "a.b/c.d");
    }
}
