use num_traits::Float;
use std::cmp::Ordering;

/// Median of `values`, reordering the slice in place.
///
/// Even lengths average the two middle values. `None` when empty.
pub fn median<T: Float>(values: &mut [T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / (T::one() + T::one()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_even_and_empty() {
        assert_eq!(median(&mut [3.0f32, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0f64, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median::<f64>(&mut []), None);
    }
}
