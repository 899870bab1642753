//! Symbol normalization.

/// Base asset of a venue symbol, uppercased.
///
/// `FOO/USDT:USDT`, `foo_usdt`, `FOO-USDT` and `FOOUSDT` all map to `FOO`.
pub fn base_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    let head = upper
        .split(['/', '_', ':', '-'])
        .next()
        .unwrap_or_default();

    if head != upper {
        return head.to_string();
    }
    match upper.strip_suffix("USDT") {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => upper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_symbol_variants() {
        assert_eq!(base_symbol("FOO/USDT:USDT"), "FOO");
        assert_eq!(base_symbol("foo_usdt"), "FOO");
        assert_eq!(base_symbol("FOO-USDT"), "FOO");
        assert_eq!(base_symbol("FOOUSDT"), "FOO");
        assert_eq!(base_symbol("FOO"), "FOO");
    }

    #[test]
    fn test_stablecoin_itself_kept() {
        assert_eq!(base_symbol("USDT"), "USDT");
    }
}
