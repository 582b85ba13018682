use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_LEN: usize = 5;

/// Short appointment tracking code: `A`, two-digit year, five base-36 characters (`A25K3Z9Q`).
pub fn generate_reference_number(year: i32) -> String {
    let mut rng = rand::thread_rng();
    let random_part: String = (0..RANDOM_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    format!("A{:02}{}", year.rem_euclid(100), random_part)
}

fn reference_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^A\d{2}[0-9A-Z]{5}$").ok())
        .as_ref()
}

pub fn is_valid_reference_number(reference: &str) -> bool {
    reference_pattern().is_some_and(|pattern| pattern.is_match(reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_match_the_published_format() {
        for _ in 0..50 {
            let code = generate_reference_number(2025);
            assert!(is_valid_reference_number(&code), "bad code {}", code);
            assert!(code.starts_with("A25"));
        }
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert!(is_valid_reference_number("A25ZZ001"));
        assert!(!is_valid_reference_number("A2ZZ001"));
        assert!(!is_valid_reference_number("a25zz001"));
        assert!(!is_valid_reference_number("R25ZZ001"));
    }
}
