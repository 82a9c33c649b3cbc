//! The object selector: orders level roots, establishes significant
//! ancestry, elects one object per significant maximal chain, optionally
//! moves markers deeper into the tree, and stamps per-pixel object ids.

use bitvec::prelude::*;
use log::debug;
use log::info;
use ndarray::Array2;

use crate::constants::{NO_OBJECT, NO_PARENT};
use crate::error::Error;
use crate::heap::PixelHeap;
use crate::maxtree::MaxTree;
use crate::number::Number;
use crate::parameters::Parameters;
use crate::significance::SignificanceTest;

/// One boolean per pixel, bit-packed.
#[derive(Debug)]
struct Flag(BitVec);

impl Flag {
    fn new(size: usize) -> Self {
        Flag(bitvec![0; size])
    }

    fn get(&self, index: i32) -> bool {
        self.0[index as usize]
    }

    fn set(&mut self, index: i32) {
        self.0.set(index as usize, true);
    }

    fn unset(&mut self, index: i32) {
        self.0.set(index as usize, false);
    }
}

/// The per-pixel labelling of a finished tree: each pixel maps to the node
/// index of the smallest detected object containing it, or to `NO_OBJECT`.
///
/// The tree is read-only here; all mutable state is owned by the selector.
#[derive(Debug)]
pub struct ObjectDetection<'a, T: Number> {
    tree: &'a MaxTree<T>,
    parameters: &'a Parameters,

    significant: Flag,
    have_significant_descendant: Flag,
    object: Flag,
    have_descendant: Flag,
    dont_move: Flag,
    checked_for_object: Flag,

    closest_significant_ancestors: Vec<i32>,
    main_branches: Vec<i32>,
    main_power_branches: Vec<i32>,
    object_ids: Vec<i32>,
    relevant_indices: Vec<i32>,

    num_significant_nodes: i32,
    num_objects: i32,
    num_objects_nested: i32,
}

impl<'a, T: Number> ObjectDetection<'a, T> {
    /// Runs the full selection over a finished tree.
    ///
    /// # Errors
    ///
    /// Parameter validation errors, surfaced before anything is allocated.
    /// Finding no significant node is not an error: the labelling comes
    /// back all `NO_OBJECT` with zero counts.
    pub fn detect(
        tree: &'a MaxTree<T>,
        parameters: &'a Parameters,
        test: &dyn SignificanceTest<T>,
    ) -> Result<Self, Error> {
        parameters.validate()?;

        let size = tree.len();
        let mut detection = ObjectDetection {
            tree,
            parameters,
            significant: Flag::new(size),
            have_significant_descendant: Flag::new(size),
            object: Flag::new(size),
            have_descendant: Flag::new(size),
            dont_move: Flag::new(size),
            checked_for_object: Flag::new(size),
            closest_significant_ancestors: vec![NO_PARENT; size],
            main_branches: vec![NO_PARENT; size],
            main_power_branches: vec![NO_PARENT; size],
            object_ids: vec![NO_OBJECT; size],
            relevant_indices: Vec::new(),
            num_significant_nodes: 0,
            num_objects: 0,
            num_objects_nested: 0,
        };

        detection.collect_relevant_nodes();
        detection.test_significant_nodes(test);
        detection.find_objects();

        if parameters.move_factor != 0.0 {
            detection.find_main_power_branches();
            detection.move_objects_up();
        }

        detection.assign_object_ids();

        Ok(detection)
    }

    /// Collects the level roots, sorted ascending by image value so that
    /// parents precede children in the significance walk.
    fn collect_relevant_nodes(&mut self) {
        let image = self.tree.image();
        let mut heap = PixelHeap::new();

        for y in 0..image.height() {
            for x in 0..image.width() {
                let pixel = image.pixel(x, y);
                if self.tree.is_level_root(pixel.index(image.width())) {
                    heap.insert(pixel);
                }
            }
        }

        if self.parameters.verbosity_level > 1 {
            debug!("Number of nodes to be tested: {}.", heap.len());
        }

        // Drain back to front: the heap pops maxima, the array fills from
        // the end, and the result is ascending.
        self.relevant_indices = vec![0; heap.len()];
        for slot in (0..self.relevant_indices.len()).rev() {
            self.relevant_indices[slot] = heap.remove().index(image.width());
        }
    }

    /// Walks the relevant nodes from faint to bright, inheriting closest
    /// significant ancestors and flagging the nodes the test accepts.
    fn test_significant_nodes(&mut self, test: &dyn SignificanceTest<T>) {
        let mut num_significant = 0;

        for i in 0..self.relevant_indices.len() {
            let node = self.relevant_indices[i];
            let parent = self.tree.parent(node);

            if self.significant.get(parent) {
                self.closest_significant_ancestors[node as usize] = parent;
            } else if self.closest_significant_ancestors[parent as usize] != NO_PARENT {
                self.closest_significant_ancestors[node as usize] =
                    self.closest_significant_ancestors[parent as usize];
            }

            if test.is_significant(self, node) {
                self.significant.set(node);
                num_significant += 1;
                self.update_parent_main_branch(node);
            }
        }

        if self.parameters.verbosity_level > 1 {
            debug!("{num_significant} significant nodes.");
        }
        self.num_significant_nodes = num_significant;
    }

    /// Records this node as its ancestor's main branch when it is the
    /// largest significant descendant seen so far; earlier picks win ties.
    fn update_parent_main_branch(&mut self, node: i32) {
        let ancestor = self.closest_significant_ancestors[node as usize];
        if ancestor == NO_PARENT {
            return;
        }

        if self.have_significant_descendant.get(ancestor) {
            if self.tree.area(self.main_branches[ancestor as usize]) < self.tree.area(node) {
                self.main_branches[ancestor as usize] = node;
            }
        } else {
            self.have_significant_descendant.set(ancestor);
            self.main_branches[ancestor as usize] = node;
        }
    }

    /// Elects objects: every top-level significant node, and every
    /// significant node that does not continue its ancestor's main chain.
    fn find_objects(&mut self) {
        let mut num_objects = 0;
        let mut num_nested = 0;

        for index in 0..self.tree.len() as i32 {
            if !self.significant.get(index) {
                continue;
            }

            let ancestor = self.closest_significant_ancestors[index as usize];
            if ancestor == NO_PARENT {
                num_objects += 1;
                self.object.set(index);
                continue;
            }

            if self.main_branches[ancestor as usize] != index {
                num_nested += 1;
                self.object.set(index);
            }
            // A significant node that is its ancestor's main branch carries
            // the same feature; it is not an object of its own.
        }

        num_objects += num_nested;
        if self.parameters.verbosity_level > 0 {
            info!("Found {num_objects} objects (including {num_nested} nested).");
        }

        self.num_objects = num_objects;
        self.num_objects_nested = num_nested;
    }

    /// Finds, for every node with descendants, the child subtree with the
    /// highest power. Used as the fallback path when moving markers.
    fn find_main_power_branches(&mut self) {
        for index in 0..self.tree.len() as i32 {
            if self.tree.is_root(index) {
                continue;
            }

            let parent = self.tree.parent(index);
            if self.have_descendant.get(parent) {
                if self.tree.power(self.main_power_branches[parent as usize])
                    < self.tree.power(index)
                {
                    self.main_power_branches[parent as usize] = index;
                }
            } else {
                self.have_descendant.set(parent);
                self.main_power_branches[parent as usize] = index;
            }
        }
    }

    /// Re-seats each object marker deeper into the tree, following main
    /// branches (power branches as fallback) until the brightness offset is
    /// reached. Re-seated markers are pinned so a single pass moves each
    /// marker once.
    fn move_objects_up(&mut self) {
        let image = self.tree.image();

        for index in 0..self.tree.len() as i32 {
            if !self.object.get(index) || self.dont_move.get(index) {
                continue;
            }

            self.object.unset(index);

            let base = image.value(index).as_f64() - self.distance(index);
            let base = base
                + self.parameters.move_factor
                    * (base.max(0.0) / self.parameters.gain + self.parameters.bg_variance).sqrt();

            let mut next = index;
            while image.value(next).as_f64() < base {
                if self.have_significant_descendant.get(next) {
                    next = self.main_branches[next as usize];
                } else if self.have_descendant.get(next) {
                    next = self.main_power_branches[next as usize];
                } else {
                    break;
                }
            }

            self.object.set(next);
            self.dont_move.set(next);
        }
    }

    /// Labels every pixel with the smallest enclosing object by walking up
    /// to the first object, already-labelled pixel, or the root boundary,
    /// then back-filling the visited chain.
    fn assign_object_ids(&mut self) {
        for index in 0..self.tree.len() as i32 {
            if self.checked_for_object.get(index) {
                continue;
            }

            let mut next = index;
            while next != NO_PARENT
                && !self.object.get(next)
                && !self.checked_for_object.get(next)
            {
                self.checked_for_object.set(next);
                next = self.tree.parent(next);
            }

            let (object_id, end) = if next == NO_PARENT {
                (NO_OBJECT, next)
            } else if self.checked_for_object.get(next) {
                (self.object_ids[next as usize], next)
            } else {
                // The walk can only have stopped on an object; label it
                // with its own id and stop the back-fill one above it.
                debug_assert!(self.object.get(next));
                self.checked_for_object.set(next);
                (next, self.tree.parent(next))
            };

            let mut cursor = index;
            loop {
                self.object_ids[cursor as usize] = object_id;
                cursor = self.tree.parent(cursor);
                if cursor == end {
                    break;
                }
            }
        }
    }

    /// `image[i]` minus the value at the closest significant ancestor, or
    /// the raw value when no ancestor is significant.
    pub fn distance(&self, index: i32) -> f64 {
        let image = self.tree.image();
        let ancestor = self.closest_significant_ancestors[index as usize];
        if ancestor == NO_PARENT {
            image.value(index).as_f64()
        } else {
            image.value(index).as_f64() - image.value(ancestor).as_f64()
        }
    }

    /// The local noise variance at a node: the background variance plus the
    /// Poisson term of the closest significant ancestor.
    ///
    /// When `max_normalized_distance` is given and the node sits further
    /// above its ancestor than that many standard deviations, the variance
    /// is re-derived under the assumption that it does not.
    pub fn noise_variance(&self, index: i32, max_normalized_distance: Option<f64>) -> f64 {
        let image = self.tree.image();
        let parameters = self.parameters;

        let mut variance = parameters.bg_variance;
        let ancestor = self.closest_significant_ancestors[index as usize];
        if ancestor != NO_PARENT {
            variance += image.value(ancestor).as_f64() / parameters.gain;
        }

        if let Some(max_distance) = max_normalized_distance {
            if self.distance(index) / variance.sqrt() > max_distance {
                let max_distance_sqr = max_distance * max_distance;
                let gain_sqr = parameters.gain * parameters.gain;
                let b = 2.0 * image.value(index).as_f64() * parameters.gain;

                let f_a = (b + max_distance_sqr
                    - max_distance
                        * (4.0 * parameters.bg_variance * gain_sqr + 2.0 * b + max_distance_sqr)
                            .sqrt())
                    / (2.0 * parameters.gain);

                variance = f_a / parameters.gain + parameters.bg_variance;
            }
        }

        variance
    }

    /// The power the subtree would have measured relative to the closest
    /// significant ancestor (or absolute zero when none), with the same
    /// optional distance clipping as [`ObjectDetection::noise_variance`].
    pub fn alternative_power(&self, index: i32, max_normalized_distance: Option<f64>) -> f64 {
        let image = self.tree.image();
        let parent = self.tree.parent(index);
        let ancestor = self.closest_significant_ancestors[index as usize];

        let mut delta = if ancestor == NO_PARENT {
            image.value(parent).as_f64()
        } else {
            image.value(parent).as_f64() - image.value(ancestor).as_f64()
        };

        if let Some(max_distance) = max_normalized_distance {
            let rms = self.noise_variance(index, max_normalized_distance).sqrt();
            if self.distance(index) / rms > max_distance {
                delta = max_distance * rms - image.value(parent).as_f64();
            }
        }

        let area = f64::from(self.tree.area(index));
        self.tree.power(index).as_f64()
            + delta * (2.0 * self.tree.volume(index).as_f64() + delta * area)
    }

    pub fn tree(&self) -> &MaxTree<T> {
        self.tree
    }

    pub fn parameters(&self) -> &Parameters {
        self.parameters
    }

    /// The per-pixel labelling: a node index or `NO_OBJECT`.
    pub fn object_ids(&self) -> &[i32] {
        &self.object_ids
    }

    /// The labelling as a 2D array matching the image shape.
    pub fn label_array(&self) -> Array2<i32> {
        let image = self.tree.image();
        Array2::from_shape_vec(
            (image.height() as usize, image.width() as usize),
            self.object_ids.clone(),
        )
        .unwrap()
    }

    /// The level roots, ascending by image value.
    pub fn relevant_indices(&self) -> &[i32] {
        &self.relevant_indices
    }

    /// The nearest significant ancestor of a node, or `NO_PARENT`.
    pub fn closest_significant_ancestor(&self, index: i32) -> i32 {
        self.closest_significant_ancestors[index as usize]
    }

    pub fn is_significant(&self, index: i32) -> bool {
        self.significant.get(index)
    }

    pub fn is_object(&self, index: i32) -> bool {
        self.object.get(index)
    }

    pub fn num_significant_nodes(&self) -> i32 {
        self.num_significant_nodes
    }

    /// The number of detected objects, nested ones included.
    pub fn num_objects(&self) -> i32 {
        self.num_objects
    }

    pub fn num_nested_objects(&self) -> i32 {
        self.num_objects_nested
    }
}

#[cfg(test)]
mod tests {
    use crate::connectivity::Connectivity;
    use crate::image::Image;
    use crate::significance::PowerTest;

    use super::*;

    fn detect(
        data: Vec<f32>,
        height: usize,
        width: usize,
        parameters: &Parameters,
    ) -> (MaxTree<f32>, Vec<i32>, i32, i32) {
        let _ = env_logger::builder().is_test(true).try_init();
        let image = Image::new(data, height, width).unwrap();
        let tree = MaxTree::flood(image, &Connectivity::four(), 0);
        let test = PowerTest::new(parameters).unwrap();
        let detection = ObjectDetection::detect(&tree, parameters, &test).unwrap();
        let ids = detection.object_ids().to_vec();
        let objects = detection.num_objects();
        let significant = detection.num_significant_nodes();
        (tree, ids, objects, significant)
    }

    #[test]
    fn test_flat_image_finds_nothing() {
        let parameters = Parameters::new(1.0, 1.0).unwrap();
        let (_, ids, objects, significant) = detect(vec![5.0; 9], 3, 3, &parameters);

        assert_eq!(significant, 0);
        assert_eq!(objects, 0);
        assert_eq!(ids, vec![NO_OBJECT; 9]);
    }

    #[test]
    fn test_single_peak_is_detected() {
        let parameters = Parameters::new(1.0, 1.0).unwrap();
        let (_, ids, objects, significant) = detect(
            vec![
                0.0, 0.0, 0.0, //
                0.0, 9.0, 0.0, //
                0.0, 0.0, 0.0,
            ],
            3,
            3,
            &parameters,
        );

        // The peak's normalized power (81) clears the rejection boundary at
        // area 1 (~3.89).
        assert_eq!(significant, 1);
        assert_eq!(objects, 1);

        let expected: Vec<i32> = (0..9).map(|i| if i == 4 { 4 } else { NO_OBJECT }).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_faint_peak_is_not_detected() {
        let parameters = Parameters::new(1.0, 1.0).unwrap();
        let (_, ids, objects, _) = detect(
            vec![
                0.0, 0.0, 0.0, //
                0.0, 1.5, 0.0, //
                0.0, 0.0, 0.0,
            ],
            3,
            3,
            &parameters,
        );

        // Normalized power 2.25 stays under the boundary at area 1.
        assert_eq!(objects, 0);
        assert_eq!(ids, vec![NO_OBJECT; 9]);
    }

    #[test]
    fn test_nested_peaks_label_the_main_chain() {
        let parameters = Parameters::new(1.0, 1.0).unwrap();
        let (_, ids, objects, significant) =
            detect(vec![0.0, 1.0, 2.0, 5.0, 2.0, 1.0, 0.0], 1, 7, &parameters);

        // Nodes 1 and 3 are significant; node 3 continues node 1's main
        // chain, so a single object is elected at node 1.
        assert_eq!(significant, 2);
        assert_eq!(objects, 1);
        assert_eq!(
            ids,
            vec![NO_OBJECT, 1, 1, 1, 1, 1, NO_OBJECT]
        );
    }

    #[test]
    fn test_min_distance_suppresses_everything() {
        let parameters = Parameters::new(1.0, 1.0).unwrap().with_min_distance(100.0);
        let (_, ids, objects, significant) = detect(
            vec![
                0.0, 0.0, 0.0, //
                0.0, 9.0, 0.0, //
                0.0, 0.0, 0.0,
            ],
            3,
            3,
            &parameters,
        );

        assert_eq!(significant, 0);
        assert_eq!(objects, 0);
        assert_eq!(ids, vec![NO_OBJECT; 9]);
    }

    #[test]
    fn test_move_up_keeps_plateau_marker_in_place() {
        let parameters = Parameters::new(1.0, 1.0).unwrap().with_move_factor(1.0);
        let image = Image::new(vec![0.0, 3.0, 3.0, 3.0, 0.0], 1, 5).unwrap();
        let tree = MaxTree::flood(image, &Connectivity::four(), 0);
        let test = PowerTest::new(&parameters).unwrap();
        let detection = ObjectDetection::detect(&tree, &parameters, &test).unwrap();

        // The plateau node is the object; its base after the offset is 1.0,
        // already below its own value, so the marker stays and is pinned.
        assert!(detection.is_object(1));
        assert_eq!(detection.num_objects(), 1);
        assert_eq!(
            detection.object_ids(),
            &[NO_OBJECT, 1, 1, 1, NO_OBJECT]
        );
    }

    #[test]
    fn test_move_up_descends_to_brighter_levels() {
        // A faint skirt around a bright core: without moving, the object
        // marker sits on the skirt's level root at 0.5. The offset base is
        // `0 + 1.0 * sqrt(0 / 1 + 4) = 2`, so the marker walks the main
        // branch onto the core.
        let parameters = Parameters::new(4.0, 1.0).unwrap().with_move_factor(1.0);
        let image = Image::new(vec![0.0, 0.5, 6.0, 6.0, 6.0, 0.5, 0.0], 1, 7).unwrap();
        let tree = MaxTree::flood(image, &Connectivity::four(), 0);
        let test = PowerTest::new(&parameters).unwrap();
        let detection = ObjectDetection::detect(&tree, &parameters, &test).unwrap();

        assert_eq!(detection.num_objects(), 1);
        assert!(detection.is_object(2));
        assert_eq!(
            detection.object_ids(),
            &[NO_OBJECT, NO_OBJECT, 2, 2, 2, NO_OBJECT, NO_OBJECT]
        );
    }

    #[test]
    fn test_verbose_run_reports_through_the_log() {
        let _ = env_logger::builder().is_test(true).try_init();

        let parameters = Parameters::new(1.0, 1.0).unwrap().with_verbosity_level(2);
        let image = Image::new(
            vec![
                0.0, 0.0, 0.0, //
                0.0, 9.0, 0.0, //
                0.0, 0.0, 0.0,
            ],
            3,
            3,
        )
        .unwrap();
        let tree = MaxTree::flood(image, &Connectivity::four(), 2);
        let test = PowerTest::new(&parameters).unwrap();
        let detection = ObjectDetection::detect(&tree, &parameters, &test).unwrap();

        // Logging is observational only: the verbose run detects exactly
        // what a silent one does.
        assert_eq!(detection.num_objects(), 1);
        assert_eq!(detection.num_significant_nodes(), 1);
    }

    #[test]
    fn test_object_phase_is_idempotent() {
        let parameters = Parameters::new(1.0, 1.0).unwrap().with_move_factor(0.5);
        let image = Image::new(vec![0.0, 1.0, 2.0, 5.0, 2.0, 1.0, 0.0], 1, 7).unwrap();
        let tree = MaxTree::flood(image, &Connectivity::four(), 0);
        let test = PowerTest::new(&parameters).unwrap();

        let first = ObjectDetection::detect(&tree, &parameters, &test).unwrap();
        let second = ObjectDetection::detect(&tree, &parameters, &test).unwrap();

        assert_eq!(first.object_ids(), second.object_ids());
        assert_eq!(first.num_objects(), second.num_objects());
        assert_eq!(first.num_significant_nodes(), second.num_significant_nodes());
    }

    #[test]
    fn test_labels_cover_exactly_the_object_chains() {
        let parameters = Parameters::new(1.0, 1.0).unwrap();
        let image = Image::new(
            vec![
                0.0, 0.0, 0.0, 0.0, 0.0, //
                0.0, 8.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 9.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, 0.0,
            ],
            4,
            5,
        )
        .unwrap();
        let tree = MaxTree::flood(image, &Connectivity::four(), 0);
        let test = PowerTest::new(&parameters).unwrap();
        let detection = ObjectDetection::detect(&tree, &parameters, &test).unwrap();

        assert_eq!(detection.num_objects(), 2);

        // A pixel is labelled iff an object lies on its parent chain.
        for index in 0..tree.len() as i32 {
            let mut cursor = index;
            let mut enclosing = NO_OBJECT;
            loop {
                if detection.is_object(cursor) {
                    enclosing = cursor;
                    break;
                }
                cursor = tree.parent(cursor);
                if cursor == NO_PARENT {
                    break;
                }
            }
            assert_eq!(detection.object_ids()[index as usize], enclosing);
        }
    }

    #[test]
    fn test_ancestry_statistics() {
        let parameters = Parameters::new(1.0, 1.0).unwrap();
        let image = Image::new(vec![0.0, 1.0, 2.0, 5.0, 2.0, 1.0, 0.0], 1, 7).unwrap();
        let tree = MaxTree::flood(image, &Connectivity::four(), 0);
        let test = PowerTest::new(&parameters).unwrap();
        let detection = ObjectDetection::detect(&tree, &parameters, &test).unwrap();

        // Node 1 is the faintest significant node; node 3 hangs below it.
        assert_eq!(detection.closest_significant_ancestor(1), NO_PARENT);
        assert_eq!(detection.closest_significant_ancestor(3), 1);
        assert_eq!(detection.distance(1), 1.0);
        assert_eq!(detection.distance(3), 4.0);
        assert_eq!(detection.noise_variance(3, None), 2.0);
    }

    #[test]
    fn test_distance_clipping_engages_beyond_threshold() {
        let parameters = Parameters::new(1.0, 1.0).unwrap();
        let image = Image::new(
            vec![
                0.0, 0.0, 0.0, //
                0.0, 9.0, 0.0, //
                0.0, 0.0, 0.0,
            ],
            3,
            3,
        )
        .unwrap();
        let tree = MaxTree::flood(image, &Connectivity::four(), 0);
        let test = PowerTest::new(&parameters).unwrap();
        let detection = ObjectDetection::detect(&tree, &parameters, &test).unwrap();

        // The peak sits 9 standard deviations up. A generous bound changes
        // nothing; a tight one re-derives a larger variance consistent with
        // the clipped distance.
        let unclipped = detection.noise_variance(4, None);
        assert_eq!(detection.noise_variance(4, Some(100.0)), unclipped);
        assert!(detection.noise_variance(4, Some(2.0)) > unclipped);

        assert_eq!(
            detection.alternative_power(4, Some(100.0)),
            detection.alternative_power(4, None)
        );
    }

    #[test]
    fn test_relevant_indices_are_ascending_level_roots() {
        let parameters = Parameters::new(1.0, 1.0).unwrap();
        let image = Image::new(vec![0.0, 1.0, 2.0, 5.0, 2.0, 1.0, 0.0], 1, 7).unwrap();
        let tree = MaxTree::flood(image.clone(), &Connectivity::four(), 0);
        let test = PowerTest::new(&parameters).unwrap();
        let detection = ObjectDetection::detect(&tree, &parameters, &test).unwrap();

        let expected = (0..tree.len() as i32)
            .filter(|&i| tree.is_level_root(i))
            .count();
        assert_eq!(detection.relevant_indices().len(), expected);

        let values: Vec<f32> = detection
            .relevant_indices()
            .iter()
            .map(|&i| image.value(i))
            .collect();
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, sorted);
    }
}
