use crate::{bus::Word, error::ProtocolError};

/// Whether `value` is representable in `width` bits.
pub fn fits(value: u64, width: u32) -> bool {
    width >= u64::BITS || value >> width == 0
}

/// Keep the low `width` bits of `value`.
pub fn mask(value: u64, width: u32) -> u64 {
    if width >= u64::BITS {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

pub fn check_field(field: &'static str, value: u64, width: u32) -> Result<(), ProtocolError> {
    if fits(value, width) {
        Ok(())
    } else {
        Err(ProtocolError::FieldOverflow {
            field,
            value,
            width,
        })
    }
}

/// Check a data vector carries exactly `count` words of `width` bits.
pub fn check_words(
    field: &'static str,
    words: &[Word],
    count: usize,
    width: u32,
) -> Result<(), ProtocolError> {
    if words.len() != count {
        return Err(ProtocolError::OperandCount {
            field,
            expected: count,
            found: words.len(),
        });
    }
    words
        .iter()
        .try_for_each(|word| check_field(field, *word, width))
}

/// `[0x1, 0xff]` style rendering of a data vector.
pub fn fmt_words(words: &[Word]) -> String {
    let items: Vec<String> = words.iter().map(|w| format!("{w:#x}")).collect();
    format!("[{}]", items.join(", "))
}
