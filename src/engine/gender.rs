use crate::models::Gender;

/// Common Italian-Latin first names the suffix rule alone gets wrong
/// (checked before falling back to the suffix heuristic). Not authoritative
/// — see spec §4.2: this only gates `genderRestriction`, it never blocks
/// play outright.
const MALE_EXCEPTIONS: &[&str] = &["andrea", "luca", "nicola", "elia", "mattia", "gianluca"];
const FEMALE_EXCEPTIONS: &[&str] = &[
    "beatrice",
    "alice",
    "noemi",
    "jessica",
    "carol",
    "rebecca",
];

/// Detects gender from an already-trimmed, case-normalized first name.
/// Rules are consulted in order; first match wins (spec §4.2):
/// 1. curated dictionary lookup
/// 2. suffix rule (`a` → F, `o`/`i` → M — the Italian-Latin default locale)
/// 3. otherwise `Unknown`
pub fn detect_gender(first_name: &str) -> Gender {
    let normalized = first_name.trim().to_lowercase();
    if normalized.is_empty() {
        return Gender::Unknown;
    }

    if MALE_EXCEPTIONS.contains(&normalized.as_str()) {
        return Gender::M;
    }
    if FEMALE_EXCEPTIONS.contains(&normalized.as_str()) {
        return Gender::F;
    }

    match normalized.chars().last() {
        Some('a') => Gender::F,
        Some('o') | Some('i') => Gender::M,
        _ => Gender::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_a_is_female() {
        assert_eq!(detect_gender("Maria"), Gender::F);
        assert_eq!(detect_gender("giulia"), Gender::F);
    }

    #[test]
    fn suffix_o_and_i_are_male() {
        assert_eq!(detect_gender("Marco"), Gender::M);
        assert_eq!(detect_gender("Luigi"), Gender::M);
    }

    #[test]
    fn dictionary_exceptions_win_over_suffix() {
        assert_eq!(detect_gender("Andrea"), Gender::M);
        assert_eq!(detect_gender("Beatrice"), Gender::F);
    }

    #[test]
    fn unmatched_suffix_is_unknown() {
        assert_eq!(detect_gender("Alex"), Gender::Unknown);
        assert_eq!(detect_gender(""), Gender::Unknown);
    }

    #[test]
    fn normalization_is_case_and_whitespace_insensitive() {
        assert_eq!(detect_gender("  MARCO  "), Gender::M);
    }
}
