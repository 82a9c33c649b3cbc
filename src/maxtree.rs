//! The max-tree: a parent-pointer forest over the image, built by flooding.
//!
//! Nodes live in one contiguous arena indexed like the image. Parent slots
//! double as state markers through the reserved sentinels `UNASSIGNED`,
//! `IN_QUEUE` and `NO_PARENT`.

use log::debug;

use crate::connectivity::Connectivity;
use crate::constants::{IN_QUEUE, NO_PARENT, UNASSIGNED};
use crate::heap::PixelHeap;
use crate::helpers;
use crate::image::{Image, Pixel};
use crate::number::Number;
use crate::stack::PixelStack;

/// One node per pixel: the parent index (or a sentinel) and the number of
/// pixels in the subtree rooted here.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub parent: i32,
    pub area: i32,
}

/// Aggregates maintained incrementally while merging.
///
/// After the flooding has merged a node into its parent, `volume` is the
/// subtree sum of `value - parent_value` and `power` the sum of its square;
/// for the root both are relative to the root's own value. The object
/// selector's alternative-power shift relies on this convention.
#[derive(Debug, Clone, Copy)]
pub struct NodeAttributes<T> {
    pub volume: T,
    pub power: T,
}

/// The hierarchical decomposition of an image into nested level-set
/// components. Built once by [`MaxTree::flood`], then read-only.
#[derive(Debug)]
pub struct MaxTree<T: Number> {
    image: Image<T>,
    nodes: Vec<Node>,
    attributes: Vec<NodeAttributes<T>>,
    root: i32,
}

impl<T: Number> MaxTree<T> {
    /// Builds the max-tree by flooding from the global minimum.
    ///
    /// Pixels are explored in order of increasing value through a max-heap
    /// frontier; the stack carries the active ascent path. Equal-valued
    /// connected pixels collapse onto a single representative (the level
    /// root), which is the only pixel of the plateau carrying aggregate
    /// attributes.
    ///
    /// `verbosity_level` gates the informational logging, the same way the
    /// selector's `verbosity_level` parameter does.
    pub fn flood(image: Image<T>, connectivity: &Connectivity, verbosity_level: u32) -> Self {
        let size = image.size() as usize;
        let mut nodes = vec![
            Node {
                parent: UNASSIGNED,
                area: 1,
            };
            size
        ];
        let mut attributes = vec![
            NodeAttributes {
                volume: T::zero(),
                power: T::zero(),
            };
            size
        ];
        let mut heap = PixelHeap::new();
        let mut stack = PixelStack::new();

        if verbosity_level > 0 {
            debug!("{} neighbours connectivity.", connectivity.num_neighbours());
        }

        let start = Self::starting_pixel(&image);
        let root = start.index(image.width());
        nodes[root as usize].parent = NO_PARENT;
        heap.insert(start);
        stack.push(start);

        let mut next = start;
        while !heap.is_empty() {
            let pixel = next;
            Self::queue_neighbours(&image, connectivity, &mut nodes, &mut heap, &pixel);

            next = *heap.top();
            if next.value > pixel.value {
                // Higher level: start an ascending excursion.
                stack.push(next);
                continue;
            }

            let pixel = heap.remove();
            let index = pixel.index(image.width());
            let top_index = stack.top().index(image.width());
            if index != top_index {
                // A plateau peer: attach it to the representative.
                nodes[index as usize].parent = top_index;
                nodes[top_index as usize].area += 1;
            }

            if heap.is_empty() {
                break;
            }

            next = *heap.top();
            if next.value < pixel.value {
                // Lower level: the component at the current level is
                // complete.
                Self::descend(&image, &mut nodes, &mut attributes, &mut stack, next);
            }
        }

        Self::drain_stack(&image, &mut nodes, &mut attributes, &mut stack);

        MaxTree {
            image,
            nodes,
            attributes,
            root,
        }
    }

    /// The first global minimum in row-major order.
    fn starting_pixel(image: &Image<T>) -> Pixel<T> {
        let (index, value) = helpers::arg_min(image.data());
        let width = i32::from(image.width());
        Pixel {
            x: (index as i32 % width) as i16,
            y: (index as i32 / width) as i16,
            value,
        }
    }

    fn queue_neighbours(
        image: &Image<T>,
        connectivity: &Connectivity,
        nodes: &mut [Node],
        heap: &mut PixelHeap<T>,
        pixel: &Pixel<T>,
    ) {
        let radius_y = (connectivity.height() / 2) as i32;
        let radius_x = (connectivity.width() / 2) as i32;
        let x = i32::from(pixel.x);
        let y = i32::from(pixel.y);
        let width = i32::from(image.width());
        let height = i32::from(image.height());

        // Clip the kernel to the image bounds.
        let conn_x_min = if x < radius_x { radius_x - x } else { 0 };
        let conn_y_min = if y < radius_y { radius_y - y } else { 0 };
        let conn_x_max = if x + radius_x >= width {
            radius_x + width - x - 1
        } else {
            2 * radius_x
        };
        let conn_y_max = if y + radius_y >= height {
            radius_y + height - y - 1
        } else {
            2 * radius_y
        };

        for conn_y in conn_y_min..=conn_y_max {
            for conn_x in conn_x_min..=conn_x_max {
                if !connectivity.is_neighbour(conn_y as usize, conn_x as usize) {
                    continue;
                }

                // A strictly brighter fresh neighbour interrupts the scan:
                // the excursion must stay depth-first, and the remaining
                // neighbours are picked up when the flooding descends back
                // to this level.
                if Self::queue_neighbour(
                    image,
                    nodes,
                    heap,
                    pixel.value,
                    (x - radius_x + conn_x) as i16,
                    (y - radius_y + conn_y) as i16,
                ) {
                    return;
                }
            }
        }
    }

    /// Puts an untouched neighbour on the frontier. Returns whether it is
    /// strictly brighter than the current pixel.
    fn queue_neighbour(
        image: &Image<T>,
        nodes: &mut [Node],
        heap: &mut PixelHeap<T>,
        value: T,
        x: i16,
        y: i16,
    ) -> bool {
        let neighbour = image.pixel(x, y);
        let index = neighbour.index(image.width()) as usize;

        if nodes[index].parent != UNASSIGNED {
            return false;
        }

        nodes[index].parent = IN_QUEUE;
        heap.insert(neighbour);

        neighbour.value > value
    }

    /// Closes the component on top of the stack and merges it into the
    /// level the flooding is descending to, inserting an intermediate level
    /// root when the next value lies between the two stack levels.
    fn descend(
        image: &Image<T>,
        nodes: &mut [Node],
        attributes: &mut [NodeAttributes<T>],
        stack: &mut PixelStack<T>,
        next: Pixel<T>,
    ) {
        let old_top = stack.pop();
        let old_index = old_top.index(image.width());

        if stack.top().value < next.value {
            stack.push(next);
        }

        let top_index = stack.top().index(image.width());
        nodes[old_index as usize].parent = top_index;
        Self::merge(image, nodes, attributes, top_index, old_index);
    }

    fn drain_stack(
        image: &Image<T>,
        nodes: &mut [Node],
        attributes: &mut [NodeAttributes<T>],
        stack: &mut PixelStack<T>,
    ) {
        while stack.len() > 1 {
            let old_top = stack.pop();
            let old_index = old_top.index(image.width());
            let top_index = stack.top().index(image.width());

            nodes[old_index as usize].parent = top_index;
            Self::merge(image, nodes, attributes, top_index, old_index);
        }
    }

    /// Folds a child node's aggregates into its new parent.
    ///
    /// `volume` and `power` are kept relative to the owning node's value, so
    /// shifting the child subtree down by `delta` transforms them first; the
    /// update order matters because the child's `volume` is read twice with
    /// different meanings.
    fn merge(
        image: &Image<T>,
        nodes: &mut [Node],
        attributes: &mut [NodeAttributes<T>],
        to: i32,
        from: i32,
    ) {
        let (t, f) = (to as usize, from as usize);

        nodes[t].area += nodes[f].area;

        let delta = image.value(from) - image.value(to);
        let from_area = T::from_i32(nodes[f].area);
        let two = T::from_i32(2);

        let from_power =
            attributes[f].power + delta * (two * attributes[f].volume + delta * from_area);
        attributes[f].power = from_power;
        attributes[t].power += from_power;

        let from_volume = attributes[f].volume + delta * from_area;
        attributes[f].volume = from_volume;
        attributes[t].volume += from_volume;
    }

    /// The image the tree decomposes.
    pub fn image(&self) -> &Image<T> {
        &self.image
    }

    /// The index of the unique root node.
    pub fn root(&self) -> i32 {
        self.root
    }

    /// The number of nodes (one per pixel).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The parent index of a node, or `NO_PARENT` for the root.
    pub fn parent(&self, index: i32) -> i32 {
        self.nodes[index as usize].parent
    }

    pub fn area(&self, index: i32) -> i32 {
        self.nodes[index as usize].area
    }

    pub fn volume(&self, index: i32) -> T {
        self.attributes[index as usize].volume
    }

    pub fn power(&self, index: i32) -> T {
        self.attributes[index as usize].power
    }

    pub fn is_root(&self, index: i32) -> bool {
        index == self.root
    }

    /// Whether the pixel is the representative of its component: a non-root
    /// pixel whose parent sits at a strictly lower intensity.
    pub fn is_level_root(&self, index: i32) -> bool {
        !self.is_root(index) && self.image.value(self.parent(index)) != self.image.value(index)
    }

    /// The node arena.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The attribute arena, paired 1:1 with [`MaxTree::nodes`].
    pub fn attributes(&self) -> &[NodeAttributes<T>] {
        &self.attributes
    }
}
