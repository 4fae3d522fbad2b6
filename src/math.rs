/// Sum of pairwise products. Stops at the end of the shorter slice.
pub fn dot_product(vector1: &[f64], vector2: &[f64]) -> f64 {
    vector1.iter().zip(vector2).map(|(a, b)| a * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product() {
        assert_eq!(dot_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
    }

    #[test]
    fn test_dot_product_uneven_lengths() {
        assert_eq!(dot_product(&[1.0, 2.0, 3.0], &[4.0]), 4.0);
        assert_eq!(dot_product(&[], &[1.0]), 0.0);
    }
}
