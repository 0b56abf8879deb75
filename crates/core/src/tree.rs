//! Arena-backed polygon tree.
//!
//! Top-level nodes are the parts to nest; their children are holes, whose children are again
//! solid islands, and so on. Nodes reference each other by index into a flat vector, so the
//! tree is cheap to clone behind an `Arc` and has no ownership cycles.

use crate::geometry::{point_in_polygon, polygon_area, Containment, Point};
use crate::{Error, Result};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a part (or hole) in a [`PolygonTree`].
pub type PartId = u32;

/// Opaque reference back to the caller's source element.
pub type SourceRef = usize;

/// A node of the polygon tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartNode {
    /// Unique id.
    pub id: PartId,
    /// Closed loop without repeated closing vertex.
    pub outline: Vec<Point>,
    /// Indices of nested loops.
    pub children: Vec<usize>,
    /// Index of the enclosing loop.
    pub parent: Option<usize>,
    /// Caller-side reference.
    pub source: SourceRef,
}

/// Nested polygon loops addressed by index and by id.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PolygonTree {
    nodes: Vec<PartNode>,
    roots: Vec<usize>,
    index: HashMap<PartId, usize>,
}

impl PolygonTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a top-level part and returns its node index.
    pub fn add_root(
        &mut self,
        id: PartId,
        outline: Vec<Point>,
        source: SourceRef,
    ) -> Result<usize> {
        let idx = self.push(id, outline, None, source)?;
        self.roots.push(idx);
        Ok(idx)
    }

    /// Adds a loop nested in the node at `parent` and returns its node index.
    pub fn add_child(
        &mut self,
        parent: usize,
        id: PartId,
        outline: Vec<Point>,
        source: SourceRef,
    ) -> Result<usize> {
        if parent >= self.nodes.len() {
            return Err(Error::InvalidGeometry(format!(
                "parent index {} out of range",
                parent
            )));
        }
        let idx = self.push(id, outline, Some(parent), source)?;
        self.nodes[parent].children.push(idx);
        Ok(idx)
    }

    fn push(
        &mut self,
        id: PartId,
        outline: Vec<Point>,
        parent: Option<usize>,
        source: SourceRef,
    ) -> Result<usize> {
        if outline.len() < 3 {
            return Err(Error::InvalidGeometry(format!(
                "loop {} has fewer than 3 points",
                id
            )));
        }
        if self.index.contains_key(&id) {
            return Err(Error::InvalidGeometry(format!("duplicate part id {}", id)));
        }
        let idx = self.nodes.len();
        self.nodes.push(PartNode {
            id,
            outline,
            children: Vec::new(),
            parent,
            source,
        });
        self.index.insert(id, idx);
        Ok(idx)
    }

    /// Builds a tree from a flat list of closed loops.
    ///
    /// A loop becomes a child of the first other loop that contains its first vertex. Ids are
    /// assigned level by level: all loops of one level get consecutive ids before any of their
    /// children are numbered. The source reference of each node is its index in `loops`.
    pub fn from_loops(loops: Vec<Vec<Point>>) -> Result<Self> {
        if let Some(bad) = loops.iter().position(|l| l.len() < 3) {
            return Err(Error::InvalidGeometry(format!(
                "loop {} has fewer than 3 points",
                bad
            )));
        }

        let mut tree = Self::new();
        let all: Vec<usize> = (0..loops.len()).collect();
        let mut next_id: PartId = 0;
        tree.attach_level(&loops, &all, None, &mut next_id)?;
        Ok(tree)
    }

    fn attach_level(
        &mut self,
        loops: &[Vec<Point>],
        members: &[usize],
        parent: Option<usize>,
        next_id: &mut PartId,
    ) -> Result<()> {
        // Split this level into parents and the loops nested inside them.
        let mut nested: Vec<Option<usize>> = vec![None; members.len()];
        for (i, &li) in members.iter().enumerate() {
            let first = loops[li][0];
            nested[i] = members.iter().position(|&lj| {
                lj != li && point_in_polygon(first, &loops[lj]) == Containment::Inside
            });
        }

        let mut level = Vec::new();
        for (i, &li) in members.iter().enumerate() {
            if nested[i].is_none() {
                let id = *next_id;
                *next_id += 1;
                let idx = match parent {
                    Some(p) => self.add_child(p, id, loops[li].clone(), li)?,
                    None => self.add_root(id, loops[li].clone(), li)?,
                };
                level.push((i, idx));
            }
        }

        for (i, idx) in level {
            let inner: Vec<usize> = members
                .iter()
                .enumerate()
                .filter(|(k, _)| self.nests_under(&nested, *k, i))
                .map(|(_, &lk)| lk)
                .collect();
            if !inner.is_empty() {
                self.attach_level(loops, &inner, Some(idx), next_id)?;
            }
        }
        Ok(())
    }

    /// Whether member `k` lies (transitively) under top member `top` of the same level.
    fn nests_under(&self, nested: &[Option<usize>], k: usize, top: usize) -> bool {
        let mut cursor = nested[k];
        let mut guard = nested.len();
        while let Some(c) = cursor {
            if c == top {
                return true;
            }
            cursor = nested[c];
            guard -= 1;
            if guard == 0 {
                break;
            }
        }
        false
    }

    /// Returns a tree with every outline passed through `f(depth, outline)`.
    ///
    /// Nodes for which `f` returns `None` are dropped together with their subtree.
    pub fn map_outlines<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, &[Point]) -> Option<Vec<Point>>,
    {
        let mut out = Self::new();
        for &root in &self.roots {
            self.map_node(root, None, 0, &mut f, &mut out)?;
        }
        Ok(out)
    }

    fn map_node<F>(
        &self,
        idx: usize,
        parent: Option<usize>,
        depth: usize,
        f: &mut F,
        out: &mut Self,
    ) -> Result<()>
    where
        F: FnMut(usize, &[Point]) -> Option<Vec<Point>>,
    {
        let node = &self.nodes[idx];
        let Some(outline) = f(depth, &node.outline) else {
            log::debug!("dropping loop {} and its subtree", node.id);
            return Ok(());
        };
        let new_idx = match parent {
            Some(p) => out.add_child(p, node.id, outline, node.source)?,
            None => out.add_root(node.id, outline, node.source)?,
        };
        for &child in &node.children {
            self.map_node(child, Some(new_idx), depth + 1, f, out)?;
        }
        Ok(())
    }

    /// Top-level parts.
    pub fn roots(&self) -> impl Iterator<Item = &PartNode> + '_ {
        self.roots.iter().map(move |&i| &self.nodes[i])
    }

    /// Node at an arena index.
    pub fn node(&self, idx: usize) -> Option<&PartNode> {
        self.nodes.get(idx)
    }

    /// Node by id.
    pub fn get(&self, id: PartId) -> Option<&PartNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Direct children of `node`.
    pub fn children<'a>(&'a self, node: &'a PartNode) -> impl Iterator<Item = &'a PartNode> + 'a {
        node.children.iter().map(move |&i| &self.nodes[i])
    }

    /// Outlines of the holes of part `id`.
    pub fn holes(&self, id: PartId) -> Vec<&[Point]> {
        self.get(id)
            .map(|node| {
                self.children(node)
                    .map(|child| child.outline.as_slice())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Material area of part `id`: outline minus holes.
    pub fn net_area(&self, id: PartId) -> f64 {
        let Some(node) = self.get(id) else {
            return 0.0;
        };
        let holes: f64 = self
            .children(node)
            .map(|child| polygon_area(&child.outline).abs())
            .sum();
        (polygon_area(&node.outline).abs() - holes).max(0.0)
    }

    /// Number of top-level parts.
    pub fn part_count(&self) -> usize {
        self.roots.len()
    }

    /// Total number of loops.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree has no loops.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
