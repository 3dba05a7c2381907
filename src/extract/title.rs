use regex::Regex;
use std::sync::LazyLock;

/// Placeholder for pages without any usable title
pub const UNTITLED: &str = "Untitled";

/// Long-form feature availability notices that leak into headings
const STATUS_PATTERNS: &[&str] = &[
    r"\s*This feature is available in the latest.*?React\s*",
    r"\s*This feature is available in the latest Canary\s*",
    r"\s*This feature is available in the latest Experimental version of React\s*",
];

/// Trailing "separator + site name" suffixes
const BRANDING_PATTERNS: &[&str] = &[
    r"\s*–\s*React\s*$",
    r"\s*-\s*React\s*$",
    r"\s*\|\s*React\s*$",
    r"\s*–\s*Stripe\s*$",
    r"\s*-\s*Stripe\s*$",
    r"\s*\|\s*Stripe\s*$",
    r"\s*\|\s*.*Documentation\s*$",
    r"\s*\|\s*.*Docs\s*$",
];

static STATUS_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(STATUS_PATTERNS));
static BRANDING_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(BRANDING_PATTERNS));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("title pattern should be valid"))
        .collect()
}

/// Clean a raw page title.
///
/// Removes feature-status boilerplate, then trailing site branding, then
/// collapses immediately repeated words ("Hooks Hooks" -> "Hooks") compared
/// case-insensitively. Repeats separated by other words are kept.
pub fn clean_title(title: &str) -> String {
    let mut cleaned = title.trim().to_string();

    for re in STATUS_REGEXES.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    for re in BRANDING_REGEXES.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }

    let mut words: Vec<&str> = Vec::new();
    for word in cleaned.split_whitespace() {
        let repeated = words
            .last()
            .is_some_and(|prev| prev.to_lowercase() == word.to_lowercase());
        if !repeated {
            words.push(word);
        }
    }

    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_react_experimental_title() {
        let title =
            "useEffect – React This feature is available in the latest Experimental version of React";
        assert_eq!(clean_title(title), "useEffect");
    }

    #[test]
    fn test_canary_notice() {
        assert_eq!(
            clean_title("use This feature is available in the latest Canary"),
            "use"
        );
    }

    #[test]
    fn test_branding_suffixes() {
        assert_eq!(clean_title("Quick Start - React"), "Quick Start");
        assert_eq!(clean_title("Payments | Stripe"), "Payments");
        assert_eq!(clean_title("Routing | Next.js Documentation"), "Routing");
        assert_eq!(clean_title("Install | Tool Docs"), "Install");
    }

    #[test]
    fn test_consecutive_duplicates_collapsed() {
        assert_eq!(clean_title("Hooks hooks Reference"), "Hooks Reference");
        assert_eq!(clean_title("API  API   API"), "API");
    }

    #[test]
    fn test_separated_duplicates_kept() {
        assert_eq!(clean_title("State and State"), "State and State");
    }

    #[test]
    fn test_plain_title_untouched() {
        assert_eq!(clean_title("  Getting Started  "), "Getting Started");
    }
}
