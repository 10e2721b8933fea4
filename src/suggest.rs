/// Returns the first candidate within a small edit distance of `given`.
/// Candidates are tried in order, so earlier ones win ties.
pub fn name_suggestion<S: AsRef<str>>(given: &str, candidates: &[S]) -> Option<String> {
    candidates
        .iter()
        .map(AsRef::as_ref)
        .find(|candidate| strsim::levenshtein(given, candidate) < 3)
        .map(str::to_string)
}
