//! Field-name slugification for ad-hoc custom fields.
//!
//! Compilers add custom fields by label; the label is slugified into a
//! camelCase field name that serves as the stable join key between the
//! analysis result and the confirmed set.

/// Slugify a human-entered label into a camelCase field name.
///
/// Rules: strip non-alphanumeric characters (keeping word boundaries),
/// split on whitespace, lowercase the first token, capitalize subsequent
/// tokens, concatenate.
///
/// ```
/// use docflow_core::fields::slugify_label;
///
/// assert_eq!(slugify_label("Invoice Date!!"), "invoiceDate");
/// assert_eq!(slugify_label("Grand Total"), "grandTotal");
/// ```
pub fn slugify_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut out = String::with_capacity(cleaned.len());
    for (i, word) in cleaned.split_whitespace().enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify_label("Invoice Date!!"), "invoiceDate");
        assert_eq!(slugify_label("Grand Total"), "grandTotal");
        assert_eq!(slugify_label("total"), "total");
    }

    #[test]
    fn test_slugify_deterministic() {
        let a = slugify_label("Tax Amount (AUD)");
        let b = slugify_label("Tax Amount (AUD)");
        assert_eq!(a, b);
        assert_eq!(a, "taxAmountAud");
    }

    #[test]
    fn test_slugify_punctuation_as_boundary() {
        // Punctuation splits words rather than gluing them together.
        assert_eq!(slugify_label("PO#Number"), "poNumber");
        assert_eq!(slugify_label("net/gross weight"), "netGrossWeight");
    }

    #[test]
    fn test_slugify_collapses_whitespace() {
        assert_eq!(slugify_label("  Due   Date  "), "dueDate");
    }

    #[test]
    fn test_slugify_digits_preserved() {
        assert_eq!(slugify_label("N10 Form Number"), "n10FormNumber");
    }

    #[test]
    fn test_slugify_empty_and_symbol_only() {
        assert_eq!(slugify_label(""), "");
        assert_eq!(slugify_label("!!!"), "");
    }

    #[test]
    fn test_slugify_unicode_uppercase() {
        assert_eq!(slugify_label("Müller Rabatt"), "müllerRabatt");
    }
}
