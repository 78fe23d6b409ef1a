use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::ParseConfig;

/// One `quantity x length x width` match pulled out of recognized text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Measurement {
    pub quantity: u32,
    pub length: u32,
    pub width: u32,
    /// The normalized text fragment this measurement was matched from.
    pub matched: String,
}

/// Quantity separators that collapse to whitespace before matching.
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=:\-]+").unwrap());

/// Optional 1-2 digit quantity (optionally followed by an `x` separator),
/// then a 2-4 digit length, `x`, and a 2-4 digit width.
static MEASUREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\b(\d{1,2})\b\s*(?:x\s*)?)?(\d{2,4})\s*x\s*(\d{2,4})").unwrap());

/// Extracts all plausible measurements from free-form OCR output.
///
/// Pure and deterministic: no I/O, no engine calls. Matches whose
/// dimensions fall outside the plausibility window, or whose quantity is
/// outside 1..=max, are dropped as misreads. A missing quantity defaults
/// to 1. One text can yield several measurements (multi-line cells).
pub fn parse(text: &str, cfg: &ParseConfig) -> Vec<Measurement> {
    let normalized = normalize(text);
    let mut out = Vec::new();
    for caps in MEASUREMENT.captures_iter(&normalized) {
        let quantity = match caps.get(1) {
            Some(q) => match q.as_str().parse::<u32>() {
                Ok(q) => q,
                Err(_) => continue,
            },
            None => 1,
        };
        let (Ok(length), Ok(width)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
            continue;
        };

        if quantity < 1 || quantity > cfg.max_quantity {
            continue;
        }
        if !plausible(length, cfg) || !plausible(width, cfg) {
            continue;
        }

        out.push(Measurement {
            quantity,
            length,
            width,
            matched: caps[0].trim().to_string(),
        });
    }
    out
}

fn plausible(dimension: u32, cfg: &ParseConfig) -> bool {
    dimension >= cfg.min_dimension && dimension <= cfg.max_dimension
}

/// Canonicalizes multiplication glyphs and quantity separators.
fn normalize(text: &str) -> String {
    let canonical: String = text
        .chars()
        .map(|c| match c {
            'X' | '\u{00d7}' => 'x',
            _ => c,
        })
        .collect();
    SEPARATORS.replace_all(&canonical, " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(text: &str) -> Vec<(u32, u32, u32)> {
        parse(text, &ParseConfig::default())
            .into_iter()
            .map(|m| (m.quantity, m.length, m.width))
            .collect()
    }

    #[test]
    fn quantity_with_equals_separator() {
        assert_eq!(parse_default("3=400x500"), vec![(3, 400, 500)]);
    }

    #[test]
    fn quantity_with_x_separator() {
        assert_eq!(parse_default("3 x 400x500"), vec![(3, 400, 500)]);
        assert_eq!(parse_default("2x700x400"), vec![(2, 700, 400)]);
    }

    #[test]
    fn missing_quantity_defaults_to_one() {
        assert_eq!(parse_default("400 x 500"), vec![(1, 400, 500)]);
        assert_eq!(parse_default("700X400"), vec![(1, 700, 400)]);
    }

    #[test]
    fn out_of_range_dimensions_are_rejected() {
        assert_eq!(parse_default("40000x500"), Vec::<(u32, u32, u32)>::new());
        assert_eq!(parse_default("5 4500x300"), Vec::<(u32, u32, u32)>::new());
        assert_eq!(parse_default("12x10"), Vec::<(u32, u32, u32)>::new());
    }

    #[test]
    fn zero_quantity_is_treated_as_a_misread() {
        assert_eq!(parse_default("0 400x500"), Vec::<(u32, u32, u32)>::new());
    }

    #[test]
    fn several_measurements_in_one_text() {
        assert_eq!(
            parse_default("1 700x400  2 500x300"),
            vec![(1, 700, 400), (2, 500, 300)]
        );
    }

    #[test]
    fn separators_and_glyph_variants_normalize() {
        assert_eq!(parse_default("2:700\u{00d7}400"), vec![(2, 700, 400)]);
        assert_eq!(parse_default("2-700x400"), vec![(2, 700, 400)]);
    }

    #[test]
    fn matched_fragment_is_preserved() {
        let out = parse("3=400x500", &ParseConfig::default());
        assert_eq!(out[0].matched, "3 400x500");
    }

    #[test]
    fn full_boundary_values_are_accepted() {
        assert_eq!(parse_default("99 30x4000"), vec![(99, 30, 4000)]);
    }
}
