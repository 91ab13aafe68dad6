//! Range classification of a single reading.

use crate::models::{Product, ReadingState, Temperature};

// ---

/// Classify a temperature against the range of the product holding its tag.
///
/// `product` is `None` when no product claims the tag. Rules are applied in
/// order and the first match wins:
///
/// 1. unparsable temperature: [`ReadingState::InvalidData`]
/// 2. no temperature: [`ReadingState::NoData`]
/// 3. no product: [`ReadingState::Unregistered`]
/// 4. a missing bound: [`ReadingState::NoRange`]
/// 5. inside `[min, max]` (bounds swapped if inverted, both inclusive):
///    [`ReadingState::Ok`], otherwise [`ReadingState::Alert`]
pub fn classify(temperature: Temperature, product: Option<&Product>) -> ReadingState {
    // ---
    let t = match temperature {
        Temperature::Invalid => return ReadingState::InvalidData,
        Temperature::Absent => return ReadingState::NoData,
        Temperature::Celsius(t) => t,
    };

    let Some(product) = product else {
        return ReadingState::Unregistered;
    };

    let range = product.acceptable_range;
    let (Some(a), Some(b)) = (
        range.min.filter(|v| v.is_finite()),
        range.max.filter(|v| v.is_finite()),
    ) else {
        return ReadingState::NoRange;
    };

    let (lo, hi) = if a > b { (b, a) } else { (a, b) };
    if lo <= t && t <= hi {
        ReadingState::Ok
    } else {
        ReadingState::Alert
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::TemperatureRange;
    use uuid::Uuid;

    fn product(min: Option<f64>, max: Option<f64>) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Frozen peas".to_string(),
            tag_id: Some("T1".to_string()),
            acceptable_range: TemperatureRange { min, max },
        }
    }

    #[test]
    fn test_precedence_of_data_errors() {
        // ---
        // Data problems win over a missing product.
        assert_eq!(classify(Temperature::Invalid, None), ReadingState::InvalidData);
        assert_eq!(classify(Temperature::Absent, None), ReadingState::NoData);

        let p = product(Some(0.0), Some(5.0));
        assert_eq!(
            classify(Temperature::Invalid, Some(&p)),
            ReadingState::InvalidData
        );
        assert_eq!(classify(Temperature::Absent, Some(&p)), ReadingState::NoData);
    }

    #[test]
    fn test_unregistered_beats_missing_range() {
        // ---
        assert_eq!(
            classify(Temperature::Celsius(3.0), None),
            ReadingState::Unregistered
        );
    }

    #[test]
    fn test_missing_bounds() {
        // ---
        let t = Temperature::Celsius(3.0);
        assert_eq!(classify(t, Some(&product(None, None))), ReadingState::NoRange);
        assert_eq!(classify(t, Some(&product(Some(0.0), None))), ReadingState::NoRange);
        assert_eq!(classify(t, Some(&product(None, Some(9.0)))), ReadingState::NoRange);
        assert_eq!(
            classify(t, Some(&product(Some(f64::NAN), Some(9.0)))),
            ReadingState::NoRange
        );
    }

    #[test]
    fn test_inclusive_boundaries() {
        // ---
        let p = product(Some(-10.0), Some(0.0));

        assert_eq!(classify(Temperature::Celsius(-10.0), Some(&p)), ReadingState::Ok);
        assert_eq!(classify(Temperature::Celsius(0.0), Some(&p)), ReadingState::Ok);
        assert_eq!(classify(Temperature::Celsius(-5.0), Some(&p)), ReadingState::Ok);

        assert_eq!(
            classify(Temperature::Celsius(-10.001), Some(&p)),
            ReadingState::Alert
        );
        assert_eq!(
            classify(Temperature::Celsius(0.001), Some(&p)),
            ReadingState::Alert
        );
    }

    #[test]
    fn test_inverted_range_is_swapped() {
        // ---
        let inverted = product(Some(8.0), Some(2.0));
        let ordered = product(Some(2.0), Some(8.0));

        for t in [1.9, 2.0, 5.0, 8.0, 8.1] {
            assert_eq!(
                classify(Temperature::Celsius(t), Some(&inverted)),
                classify(Temperature::Celsius(t), Some(&ordered)),
                "inverted range disagrees at {t}"
            );
        }
        assert_eq!(
            classify(Temperature::Celsius(2.0), Some(&inverted)),
            ReadingState::Ok
        );
    }

    #[test]
    fn test_degenerate_range() {
        // ---
        let p = product(Some(4.0), Some(4.0));
        assert_eq!(classify(Temperature::Celsius(4.0), Some(&p)), ReadingState::Ok);
        assert_eq!(classify(Temperature::Celsius(4.5), Some(&p)), ReadingState::Alert);
    }
}
