use thiserror::Error;

/// Canonical plate length — both Brazilian layouts are 7 characters.
pub const PLATE_LEN: usize = 7;

/// Index inspected to tell the two layouts apart: Mercosul plates carry a
/// letter there (`AAA1A23`), legacy plates a digit (`AAA1234`).
const LAYOUT_INDEX: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlateError {
    /// The raw string is too short to classify — layout inference needs the
    /// character at index 4.
    #[error("plate string too short: got {0} characters, need at least 5")]
    TooShort(usize),
}

/// Expected letter/digit pattern of a plate, inferred from one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateLayout {
    /// `AAA1234` — letters at 0–2, digits everywhere else.
    LegacyNumeric,
    /// `AAA1A23` — letters at 0–2 and 4, digits everywhere else.
    MercosulMixed,
}

impl PlateLayout {
    /// Whether position `i` should hold a letter under this layout.
    /// Positions past the canonical length count as digit slots; they are
    /// truncated away afterwards.
    fn expects_letter(self, i: usize) -> bool {
        match self {
            PlateLayout::LegacyNumeric => i <= 2,
            PlateLayout::MercosulMixed => i <= 2 || i == LAYOUT_INDEX,
        }
    }
}

/// Digit misread in a letter slot → the letter it usually was.
const DIGIT_TO_LETTER: &[(char, char)] =
    &[('0', 'O'), ('1', 'I'), ('2', 'Z'), ('5', 'S'), ('8', 'B')];

/// Letter misread in a digit slot → the digit it usually was.
const LETTER_TO_DIGIT: &[(char, char)] = &[
    ('O', '0'),
    ('Q', '0'),
    ('I', '1'),
    ('L', '1'),
    ('Z', '2'),
    ('S', '5'),
    ('B', '8'),
    ('G', '6'),
];

fn lookup(table: &[(char, char)], c: char) -> Option<char> {
    table.iter().find(|(k, _)| *k == c).map(|(_, v)| *v)
}

/// Normalize a raw OCR string to a canonical 7-character plate.
///
/// The layout is inferred from the character at index 4; every position is
/// then checked against the expected letter/digit class and visually
/// confusable characters are substituted (`O`↔`0`, `I`↔`1`, …). Characters
/// with no substitution become `X` in letter slots and `0` in digit slots.
/// If the character at index 4 is neither a letter nor a digit the string
/// passes through untouched. Either way the result is truncated or
/// right-padded with `X` to exactly 7 characters.
///
/// Inputs shorter than 5 characters cannot be classified and are rejected.
pub fn normalize(raw: &str) -> Result<String, PlateError> {
    let plate: Vec<char> = raw.chars().map(|c| c.to_ascii_uppercase()).collect();
    if plate.len() <= LAYOUT_INDEX {
        return Err(PlateError::TooShort(plate.len()));
    }

    let pivot = plate[LAYOUT_INDEX];
    let layout = if pivot.is_ascii_alphabetic() {
        Some(PlateLayout::MercosulMixed)
    } else if pivot.is_ascii_digit() {
        Some(PlateLayout::LegacyNumeric)
    } else {
        None // OCR noise at the pivot — no correction possible
    };

    let corrected: String = match layout {
        Some(layout) => plate
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                if layout.expects_letter(i) {
                    if c.is_ascii_alphabetic() {
                        c
                    } else {
                        lookup(DIGIT_TO_LETTER, c).unwrap_or('X')
                    }
                } else if c.is_ascii_digit() {
                    c
                } else {
                    lookup(LETTER_TO_DIGIT, c).unwrap_or('0')
                }
            })
            .collect(),
        None => plate.into_iter().collect(),
    };

    let mut out: String = corrected.chars().take(PLATE_LEN).collect();
    while out.chars().count() < PLATE_LEN {
        out.push('X');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_correct_mercosul_is_untouched() {
        assert_eq!(normalize("ABC1D23").unwrap(), "ABC1D23");
    }

    #[test]
    fn already_correct_legacy_is_untouched() {
        assert_eq!(normalize("ABC1234").unwrap(), "ABC1234");
    }

    #[test]
    fn output_is_always_seven_chars() {
        for raw in ["ABC1D23", "AB31D", "ABC12345EXTRA", "AB?CD", "O0O0O0O0"] {
            assert_eq!(normalize(raw).unwrap().chars().count(), PLATE_LEN);
        }
    }

    #[test]
    fn legacy_digit_in_letter_slot_is_substituted() {
        // index 4 is a digit → legacy layout; '8' at position 1 maps to 'B'
        assert_eq!(normalize("A8C1234").unwrap(), "ABC1234");
    }

    #[test]
    fn legacy_letter_in_digit_slot_is_substituted() {
        // 'O' and 'S' in the numeric block map to '0' and '5'
        assert_eq!(normalize("ABCO23S").unwrap(), "ABC0235");
    }

    #[test]
    fn mercosul_unmapped_digit_in_letter_slot_becomes_x() {
        // index 4 is 'D' → Mercosul; '3' at position 2 has no letter mapping
        assert_eq!(normalize("AB31D23").unwrap(), "ABX1D23");
    }

    #[test]
    fn mercosul_unmapped_letter_in_digit_slot_becomes_zero() {
        // 'W' at position 3 (digit slot) has no digit mapping
        assert_eq!(normalize("ABCWD23").unwrap(), "ABC0D23");
    }

    #[test]
    fn lowercase_input_is_uppercased() {
        assert_eq!(normalize("abc1d23").unwrap(), "ABC1D23");
    }

    #[test]
    fn long_input_is_truncated_to_seven() {
        assert_eq!(normalize("ABC1D23EXTRA").unwrap(), "ABC1D23");
    }

    #[test]
    fn short_corrected_input_is_padded_with_x() {
        // 5 chars, legacy layout ('3' at index 4); '1' in a letter slot → 'I'
        assert_eq!(normalize("AB123").unwrap(), "ABI23XX");
    }

    #[test]
    fn symbol_at_pivot_passes_through_then_pads() {
        // '?' at index 4: no layout, no substitutions, padded to 7
        assert_eq!(normalize("AB12?").unwrap(), "AB12?XX");
    }

    #[test]
    fn symbol_at_pivot_passes_through_then_truncates() {
        assert_eq!(normalize("AB12?CDEF").unwrap(), "AB12?CD");
    }

    #[test]
    fn too_short_input_is_rejected() {
        assert_eq!(normalize("AB12"), Err(PlateError::TooShort(4)));
        assert_eq!(normalize(""), Err(PlateError::TooShort(0)));
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["A8C1234", "AB31D23", "QB3IS2B", "ABC12345EXTRA"] {
            let once = normalize(raw).unwrap();
            assert_eq!(normalize(&once).unwrap(), once);
        }
    }
}
