//! Device batching for provider wire limits.

/// Split `devices` into ordered groups of at most `size` devices.
///
/// An empty device list still yields a single empty batch, so a message with
/// no devices produces one (empty) job and one response. A `size` of zero is
/// treated as one.
pub fn batches(devices: &[String], size: usize) -> Vec<&[String]> {
    if devices.is_empty() {
        return vec![devices];
    }
    devices.chunks(size.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("device-{i}")).collect()
    }

    #[test]
    fn test_batches_cover_input_in_order() {
        for len in [1, 2, 999, 1000, 1001, 2500] {
            for size in [1, 3, 1000] {
                let input = devices(len);
                let groups = batches(&input, size);

                assert!(groups.iter().all(|g| !g.is_empty() && g.len() <= size));
                assert_eq!(groups.len(), len.div_ceil(size));
                assert_eq!(groups.concat(), input);
            }
        }
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_batch() {
        let input = devices(2000);
        let groups = batches(&input, 1000);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].len(), 1000);
    }

    #[test]
    fn test_empty_input_yields_one_empty_batch() {
        let groups = batches(&[], 1000);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_empty());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let input = vec!["a".to_string(), "a".to_string(), "b".to_string()];
        let groups = batches(&input, 2);
        assert_eq!(groups, vec![&input[..2], &input[2..]]);
    }

    #[test]
    fn test_zero_size_is_one() {
        let input = devices(3);
        assert_eq!(batches(&input, 0).len(), 3);
    }
}
