use super::{ConversionFailed, Unsigned12Bit, Unsigned4Bit, Unsigned5Bit, Unsigned7Bit};

#[test]
fn test_unsigned_max() {
    assert_eq!(Unsigned4Bit::MAX.bits, 0o17);
    assert_eq!(Unsigned5Bit::MAX.bits, 0o37);
    assert_eq!(Unsigned7Bit::MAX.bits, 0o177);
    assert_eq!(Unsigned12Bit::MAX.bits, 0o7777);
}

#[test]
fn test_try_from_u16_unsigned7bit() {
    assert_eq!(Unsigned7Bit::try_from(0_u16), Ok(Unsigned7Bit::ZERO));
    assert_eq!(Unsigned7Bit::try_from(127_u16), Ok(Unsigned7Bit::MAX));
    assert_eq!(
        Unsigned7Bit::try_from(128_u16),
        Err(ConversionFailed::TooLarge)
    );
    assert_eq!(Unsigned7Bit::try_from(-1_i32), Err(ConversionFailed::TooSmall));
}

#[test]
fn test_try_from_unsigned12bit_u8() {
    assert_eq!(u8::try_from(Unsigned12Bit::from(0o377_u8)), Ok(0o377_u8));
    assert_eq!(
        u8::try_from(Unsigned12Bit::try_from(0o400_u16).unwrap()),
        Err(ConversionFailed::TooLarge)
    );
}

#[test]
fn test_truncating_from() {
    assert_eq!(Unsigned4Bit::truncating_from(0o177).bits, 0o17);
    assert_eq!(Unsigned12Bit::truncating_from(0o170005).bits, 5);
}

#[test]
fn test_word_count_rollover() {
    let (next, rolled) = Unsigned12Bit::MAX.overflowing_increment();
    assert_eq!(next, Unsigned12Bit::ZERO);
    assert!(rolled);

    let (next, rolled) = Unsigned12Bit::try_from(0o7776_u16)
        .unwrap()
        .overflowing_increment();
    assert_eq!(next, Unsigned12Bit::MAX);
    assert!(!rolled);
}

#[test]
fn test_widening_conversions() {
    let bank = Unsigned4Bit::try_from(9_u8).unwrap();
    assert_eq!(Unsigned5Bit::from(bank).bits, 9);
    let device = Unsigned7Bit::try_from(100_u8).unwrap();
    assert_eq!(u16::from(Unsigned12Bit::from(device)), 100);
}

#[test]
fn test_display_is_octal() {
    assert_eq!(Unsigned12Bit::MAX.to_string(), "7777");
    assert_eq!(format!("{:?}", Unsigned7Bit::MAX), "Unsigned7Bit{bits: 0o177}");
}

#[cfg(test)]
mod u12_proptests {
    use super::super::Unsigned12Bit;
    use test_strategy::{proptest, Arbitrary};

    #[derive(Debug, Arbitrary)]
    struct U12SubtractionTestInput {
        #[strategy(0..0o10000u16)]
        greater: u16,
        #[strategy(0..=#greater)]
        lesser: u16,
    }

    #[proptest]
    fn wrapping_sub_and_checked_sub_give_same_result(input: U12SubtractionTestInput) {
        let lesser = Unsigned12Bit::try_from(input.lesser).unwrap();
        let greater = Unsigned12Bit::try_from(input.greater).unwrap();

        if let Some(diff) = greater.checked_sub(lesser) {
            let wdiff: Unsigned12Bit = greater.wrapping_sub(lesser);
            assert_eq!(diff, wdiff);
        }
    }

    #[proptest]
    fn increment_rolls_over_only_at_max(#[strategy(0..0o10000u16)] n: u16) {
        let value = Unsigned12Bit::try_from(n).unwrap();
        let (next, rolled) = value.overflowing_increment();
        assert_eq!(rolled, value == Unsigned12Bit::MAX);
        assert_eq!(u16::from(next), (n + 1) & 0o7777);
    }
}
