/// Sentinel the model is told to answer when a page lacks the field.
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Instruction sent with each page when searching for `field_name`.
pub fn build_field_prompt(field_name: &str, special_instructions: Option<&str>) -> String {
    let mut prompt = format!(
        "Please extract the value for the field '{field_name}' from this document page. \
         Return only the extracted value, or '{NOT_FOUND}' if the field is not present on this page. \
         Be precise and extract only the specific value requested."
    );
    if let Some(instructions) = special_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\n\nSpecial instructions: ");
        prompt.push_str(instructions);
    }
    prompt
}

/// True when an answer means "not on this page": empty after trimming, or
/// the sentinel in any case.
pub fn is_not_found(answer: &str) -> bool {
    let trimmed = answer.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_FOUND)
}

/// Split a comma-separated field list. Names are trimmed and duplicates
/// dropped, keeping the first occurrence.
pub fn parse_field_list(raw: &str) -> Vec<String> {
    normalize_fields(raw.split(','))
}

/// Trim and deduplicate already split names, preserving order. Empty names
/// are not rejected.
pub fn normalize_fields<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    fields
        .into_iter()
        .map(|f| f.as_ref().trim().to_string())
        .filter(|f| seen.insert(f.clone()))
        .collect()
}
