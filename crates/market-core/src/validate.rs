use crate::MarketError;

const MAX_SYMBOL_LEN: usize = 10;

/// Validate a ticker symbol before any network call.
///
/// Accepts uppercase ASCII letters and digits plus `.` and `-` for
/// exchange-qualified symbols (BRK.B, RDS-A). Lowercase input is rejected
/// rather than coerced so callers learn about malformed identifiers.
pub fn validate_symbol(symbol: &str) -> Result<(), MarketError> {
    if symbol.is_empty() {
        return Err(MarketError::InvalidSymbol("symbol is empty".to_string()));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(MarketError::InvalidSymbol(format!(
            "symbol '{}' exceeds {} characters",
            symbol, MAX_SYMBOL_LEN
        )));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(MarketError::InvalidSymbol(format!(
            "symbol '{}' contains invalid characters",
            symbol
        )));
    }
    if symbol.starts_with('.') || symbol.starts_with('-') {
        return Err(MarketError::InvalidSymbol(format!(
            "symbol '{}' must start with a letter or digit",
            symbol
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_and_qualified_symbols() {
        for sym in ["AAPL", "MSFT", "BRK.B", "RDS-A", "005930.KS"] {
            assert!(validate_symbol(sym).is_ok(), "{} should be valid", sym);
        }
    }

    #[test]
    fn test_rejects_malformed_symbols() {
        for sym in ["", "aapl", "TOOLONGSYMBOL", "AA PL", ".AAPL", "AAPL$"] {
            assert!(validate_symbol(sym).is_err(), "{} should be invalid", sym);
        }
    }
}
