use num_traits::ToPrimitive;

/// Counts the vertices assigned to each part of a given partition.
///
/// Entries outside `0..num_parts` are ignored.
pub fn compute_parts_load(partition: &[usize], num_parts: usize) -> Vec<usize> {
    let mut loads = vec![0; num_parts];

    for &part in partition {
        if part < num_parts {
            loads[part] += 1;
        }
    }

    loads
}

/// Compute the max/average imbalance after passing part loads.
///
/// `1.0` is a perfect balance and `num_parts` means every vertex sits in a single part.
pub fn compute_imbalance_from_part_loads(num_parts: usize, part_loads: &[usize]) -> f64 {
    let total_load: usize = part_loads.iter().sum();
    if total_load == 0 {
        return 0.0;
    }

    let max_load = part_loads.iter().copied().max().unwrap_or(0);

    max_load.to_f64().unwrap_or(0.0) * num_parts.to_f64().unwrap_or(0.0)
        / total_load.to_f64().unwrap_or(1.0)
}

/// Compute the imbalance of the given partition.
pub fn imbalance(num_parts: usize, partition: &[usize]) -> f64 {
    if num_parts == 0 {
        return 0.0;
    }

    let part_loads = compute_parts_load(partition, num_parts);

    compute_imbalance_from_part_loads(num_parts, &part_loads)
}
