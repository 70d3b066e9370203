/// Text-to-image prompt for one request.
///
/// The wording is fixed; downstream analytics match on it.
pub fn build_prompt(genre: &str, summary: &str, token: &str, gender: &str) -> String {
    format!(
        "A image of a {genre} music album cover that visualizes a {summary} atmosphere. a {token} {gender} is in image."
    )
}
