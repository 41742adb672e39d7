//! Hardware texture-capacity oracle.
//!
//! A tensor can only live in an image resource when the image extents its
//! layout requires fit within the device limits. Tensors are canonicalized
//! to NCHW and the packed axis is folded into texels of four elements; a
//! tensor of rank greater than four never fits a texture.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::{Node, TensorSpec};
use crate::memory::MemoryLayout;

/// Maximum image extents supported by the device, fixed for the lifetime of
/// one pass invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureLimits {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl TextureLimits {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Cubic limits, the common case for `maxImageDimension3D`.
    pub fn uniform(extent: usize) -> Self {
        Self::new(extent, extent, extent)
    }

    fn fits(&self, extents: [usize; 3]) -> bool {
        extents[0] <= self.width && extents[1] <= self.height && extents[2] <= self.depth
    }
}

/// Pads dims on the left with singleton axes up to NCHW; `None` when the
/// tensor has more than four axes.
fn canonical_nchw(spec: &TensorSpec) -> Option<[usize; 4]> {
    if spec.rank() > 4 {
        return None;
    }
    let mut canonical = [1usize; 4];
    let offset = 4 - spec.rank();
    for (axis, &dim) in spec.dims.iter().enumerate() {
        canonical[offset + axis] = dim;
    }
    Some(canonical)
}

fn texel_count(extent: usize) -> usize {
    extent.div_ceil(4)
}

/// Image extents `[width, height, depth]` required to hold an NCHW tensor
/// under the given layout. The packed axis is divided into texels; batch is
/// folded into the depth extent.
fn required_extents(nchw: [usize; 4], layout: MemoryLayout) -> [usize; 3] {
    let [n, c, h, w] = nchw;
    match layout {
        MemoryLayout::WidthPacked => [texel_count(w), h, c * n],
        MemoryLayout::HeightPacked => [w, texel_count(h), c * n],
        MemoryLayout::ChannelsPacked => [w, h, texel_count(c) * n],
    }
}

/// The set of memory layouts under which every output tensor of `node` is
/// physically representable as an image resource.
///
/// An empty set means the node's tensors are too large for textures and
/// buffer storage must be used regardless of operator preference.
pub fn possible_node_layouts(node: &Node, limits: &TextureLimits) -> BTreeSet<MemoryLayout> {
    let mut possible: BTreeSet<MemoryLayout> = MemoryLayout::all().into_iter().collect();

    for spec in &node.outputs {
        let Some(nchw) = canonical_nchw(spec) else {
            return BTreeSet::new();
        };
        possible.retain(|&layout| limits.fits(required_extents(nchw, layout)));
        if possible.is_empty() {
            break;
        }
    }

    possible
}
