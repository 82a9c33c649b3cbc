//! Per-object statistics computed from the finished label map.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rayon::prelude::*;

use crate::constants::NO_OBJECT;
use crate::number::Number;
use crate::objects::ObjectDetection;

/// Aggregates over the pixels labelled with one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStats<T: Number> {
    /// The node index of the object.
    pub id: i32,

    /// The number of pixels labelled with it.
    pub area: usize,

    /// The sum of the labelled intensities.
    pub flux: f64,

    /// The brightest labelled intensity.
    pub peak: T,

    /// The row-major index of the brightest labelled pixel; the first such
    /// pixel wins ties.
    pub arg_peak: i32,
}

/// Collects per-object statistics from the label map, accumulating image
/// rows in parallel. Results come back sorted by object id; `NO_OBJECT`
/// pixels contribute nothing.
pub fn object_stats<T: Number>(detection: &ObjectDetection<'_, T>) -> Vec<ObjectStats<T>> {
    let image = detection.tree().image();
    let width = image.width() as usize;

    let stats = detection
        .object_ids()
        .par_chunks(width)
        .enumerate()
        .fold(
            HashMap::new,
            |mut stats: HashMap<i32, ObjectStats<T>>, (row, labels)| {
                for (col, &id) in labels.iter().enumerate() {
                    if id == NO_OBJECT {
                        continue;
                    }

                    let index = (row * width + col) as i32;
                    let value = image.value(index);
                    let entry = stats.entry(id).or_insert_with(|| ObjectStats {
                        id,
                        area: 0,
                        flux: 0.0,
                        peak: value,
                        arg_peak: index,
                    });
                    entry.area += 1;
                    entry.flux += value.as_f64();
                    if value > entry.peak {
                        entry.peak = value;
                        entry.arg_peak = index;
                    }
                }
                stats
            },
        )
        .reduce(HashMap::new, |mut left, right| {
            for (id, stats) in right {
                match left.entry(id) {
                    Entry::Vacant(slot) => {
                        slot.insert(stats);
                    }
                    Entry::Occupied(mut slot) => {
                        let merged = slot.get_mut();
                        merged.area += stats.area;
                        merged.flux += stats.flux;
                        if stats.peak > merged.peak {
                            merged.peak = stats.peak;
                            merged.arg_peak = stats.arg_peak;
                        }
                    }
                }
            }
            left
        });

    let mut stats: Vec<_> = stats.into_values().collect();
    stats.sort_by_key(|s| s.id);
    stats
}
