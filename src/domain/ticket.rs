use rand::Rng;

/// Alphabet for ticket codes. No `0/O` or `1/I/L` so codes survive being read
/// aloud at the registration desk.
const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
const CODE_LEN: usize = 8;
pub const CODE_PREFIX: &str = "TKT-";

pub fn generate_ticket_code() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{CODE_PREFIX}{body}")
}

/// Normalizes user input that may be a ticket code (`tkt-ab12 cd34` -> `TKT-AB12CD34`).
pub fn normalize_ticket_code(input: &str) -> Option<String> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let body = cleaned.strip_prefix(CODE_PREFIX).unwrap_or(&cleaned);
    if body.len() == CODE_LEN && body.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
        Some(format!("{CODE_PREFIX}{body}"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_format() {
        for _ in 0..100 {
            let code = generate_ticket_code();
            assert!(code.starts_with(CODE_PREFIX));
            assert_eq!(code.len(), CODE_PREFIX.len() + CODE_LEN);
            assert_eq!(normalize_ticket_code(&code), Some(code.clone()));
        }
    }

    #[test]
    fn test_normalize_ticket_code() {
        assert_eq!(
            normalize_ticket_code("tkt-ab23 cd45"),
            Some("TKT-AB23CD45".to_string())
        );
        assert_eq!(
            normalize_ticket_code("AB23CD45"),
            Some("TKT-AB23CD45".to_string())
        );
        assert_eq!(normalize_ticket_code("TKT-AB23CD4"), None);
        assert_eq!(normalize_ticket_code("awa@example.sn"), None);
        assert_eq!(normalize_ticket_code("TKT-AB23CD40"), None);
    }
}
