/// Parse a human readable byte size such as `16M`, `512 KiB`, `2.5MB` or `1024`.
///
/// Single letter units are binary (`16M` is 16 MiB), two letter units are
/// decimal (`16MB` is 16 000 000 bytes) and `iB` units are binary.
pub fn parse_byte_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.parse().ok()?;
    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kib" => 1 << 10,
        "m" | "mib" => 1 << 20,
        "g" | "gib" => 1 << 30,
        "t" | "tib" => 1 << 40,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        "tb" => 1_000_000_000_000,
        _ => return None,
    };
    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return None;
    }
    return Some(bytes as u64);
}

/// Escape text for embedding in an HTML fragment.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    return escaped;
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    #[test_case("16M", Some(16 * 1024 * 1024); "single letter is binary")]
    #[test_case("16MB", Some(16_000_000); "two letters are decimal")]
    #[test_case("512 KiB", Some(512 * 1024); "iec unit with space")]
    #[test_case("2.5k", Some(2560); "fractional")]
    #[test_case("1024", Some(1024); "plain bytes")]
    #[test_case(" 3 gb ", Some(3_000_000_000); "surrounding whitespace")]
    #[test_case("M", None; "missing number")]
    #[test_case("12 parsecs", None; "unknown unit")]
    fn parse_byte_size(input: &str, output: Option<u64>) {
        assert_eq!(super::parse_byte_size(input), output);
    }

    #[test_case("main.c", "main.c"; "plain")]
    #[test_case("<b>\"x\" & 'y'</b>", "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;"; "markup")]
    fn escape_html(input: &str, output: &str) {
        assert_eq!(super::escape_html(input), output);
    }
}
