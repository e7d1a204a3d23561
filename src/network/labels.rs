/// Output alphabet in the fixed order the output layer is wired in:
/// digits, then uppercase, then lowercase letters.
pub const ALPHABET: [char; 62] = alphabet();

const fn alphabet() -> [char; 62] {
    let mut out = ['\0'; 62];
    let mut i = 0;
    while i < 10 {
        out[i] = (b'0' + i as u8) as char;
        i += 1;
    }
    while i < 36 {
        out[i] = (b'A' + (i - 10) as u8) as char;
        i += 1;
    }
    while i < 62 {
        out[i] = (b'a' + (i - 36) as u8) as char;
        i += 1;
    }
    out
}

/// Position of `label` in [`ALPHABET`].
pub fn label_index(label: char) -> Option<usize> {
    match label {
        '0'..='9' => Some(label as usize - '0' as usize),
        'A'..='Z' => Some(label as usize - 'A' as usize + 10),
        'a'..='z' => Some(label as usize - 'a' as usize + 36),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_digits_upper_lower() {
        assert_eq!(ALPHABET[0], '0');
        assert_eq!(ALPHABET[9], '9');
        assert_eq!(ALPHABET[10], 'A');
        assert_eq!(ALPHABET[35], 'Z');
        assert_eq!(ALPHABET[36], 'a');
        assert_eq!(ALPHABET[61], 'z');
    }

    #[test]
    fn index_inverts_alphabet() {
        for (i, &c) in ALPHABET.iter().enumerate() {
            assert_eq!(label_index(c), Some(i));
        }
        assert_eq!(label_index('#'), None);
    }
}
