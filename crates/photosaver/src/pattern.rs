/// Substitutes `number` into the first `%d`, `%Nd` or `%0Nd` of `pattern`.
/// `%%` becomes `%`; anything else after a `%` is copied as is.
pub fn format_pattern(pattern: &str, number: i64) -> String {
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut substituted = false;
    let mut rest = pattern;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let conv = &rest[pos + 1..];

        if let Some(after) = conv.strip_prefix('%') {
            out.push('%');
            rest = after;
            continue;
        }

        match parse_conversion(conv) {
            Some((zero_pad, width, len)) if !substituted => {
                if zero_pad {
                    out.push_str(&format!("{number:0width$}"));
                } else {
                    out.push_str(&format!("{number:width$}"));
                }
                substituted = true;
                rest = &conv[len..];
            }
            _ => {
                out.push('%');
                rest = conv;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Returns (zero padded, width, consumed bytes) for `[0][N]d`.
fn parse_conversion(conv: &str) -> Option<(bool, usize, usize)> {
    let zero_pad = conv.starts_with('0');
    let digits_start = usize::from(zero_pad);
    let digits_len = conv[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    let digits_end = digits_start + digits_len;
    if conv.as_bytes().get(digits_end) != Some(&b'd') {
        return None;
    }
    let width = match digits_len {
        0 => 0,
        _ => conv[digits_start..digits_end].parse().ok()?,
    };
    Some((zero_pad, width, digits_end + 1))
}
