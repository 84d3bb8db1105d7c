//! Contact normalization for conversation identity.
//!
//! Any unordered pair of addresses maps to exactly one ordered
//! `(customer_contact, business_contact)` pair, whichever side sent first and
//! however a phone number was formatted.

/// Characters stripped from phone-like addresses before comparison.
const FORMATTING_CHARS: [char; 4] = ['-', ' ', '(', ')'];

/// Remove phone formatting characters (`-`, space, `(`, `)`).
pub fn strip_formatting(address: &str) -> String {
    address
        .chars()
        .filter(|c| !FORMATTING_CHARS.contains(c))
        .collect()
}

fn is_email_pair(a: &str, b: &str) -> bool {
    a.contains('@') && b.contains('@')
}

/// Order an address pair deterministically, returning the original strings.
///
/// Two emails sort lexicographically as given. Anything else (phones, and a
/// mixed email/phone pair) sorts by the stripped forms while returning the
/// unstripped addresses.
pub fn normalize_contacts(a: &str, b: &str) -> (String, String) {
    let stripped_a = strip_formatting(a);
    let stripped_b = strip_formatting(b);

    let a_first = if is_email_pair(&stripped_a, &stripped_b) {
        a <= b
    } else {
        // Originals break ties between formatting variants of one number.
        (&stripped_a, a) <= (&stripped_b, b)
    };

    if a_first {
        (a.to_owned(), b.to_owned())
    } else {
        (b.to_owned(), a.to_owned())
    }
}

/// The pair a conversation is stored under.
///
/// Same ordering as [`normalize_contacts`], but phone-like addresses are
/// reduced to their stripped form so `+1 (201) 666-1234` and `+12016661234`
/// land in the same conversation. Every path that resolves a conversation
/// goes through here.
pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
    let (first, second) = normalize_contacts(a, b);
    if is_email_pair(&first, &second) {
        (first, second)
    } else {
        (strip_formatting(&first), strip_formatting(&second))
    }
}
