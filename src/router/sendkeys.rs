//! `send-keys` token-to-byte translation (spec.md §4.2.6).

/// Translates symbolic key names to bytes; unrecognised tokens are
/// appended as literal UTF-8 bytes. Empty input produces empty output.
pub fn translate_send_keys(tokens: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for token in tokens {
        match token.as_str() {
            "Enter" => out.push(b'\r'),
            "C-c" => out.push(0x03),
            "C-d" => out.push(0x04),
            "C-z" => out.push(0x1a),
            "Escape" => out.push(0x1b),
            "Space" => out.push(0x20),
            "Tab" => out.push(b'\t'),
            "BSpace" => out.push(0x7f),
            other => out.extend_from_slice(other.as_bytes()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bootstrap_sequence_translates_correctly() {
        let bytes = translate_send_keys(&toks(&["echo", "Space", "ok", "Enter"]));
        assert_eq!(bytes, b"echo ok\r".to_vec());
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(translate_send_keys(&[]).is_empty());
    }

    #[test]
    fn control_keys_translate_to_their_bytes() {
        let bytes = translate_send_keys(&toks(&["C-c", "C-d", "C-z", "Escape", "Tab", "BSpace"]));
        assert_eq!(bytes, vec![0x03, 0x04, 0x1a, 0x1b, b'\t', 0x7f]);
    }
}
