//! Compact binary map format.
//!
//! ```text
//! magic        "OCMP"
//! major, minor u8, u8
//! header_len   u16
//! header       resolution f64, max_depth u8,
//!              hit, miss, clamp_min, clamp_max (log-odds f32),
//!              occupancy_threshold (probability f64)
//!              [bytes added by later minor versions]
//! root flag    u8        0 = empty tree, 1 = nodes follow
//! nodes        depth first, octant order; per node a child bitmap u8,
//!              followed by its f32 log-odds when the bitmap is 0 (a leaf)
//! ```
//!
//! Everything is little-endian. Inner nodes carry no value: it is recomputed
//! from the children on load. A reader accepts every minor version of its
//! major version and skips header bytes it does not know.
//!
//! # Example
//!
//! ```rust
//! use occumap_core::OcTree;
//! use occumap_types::Point3;
//!
//! let mut tree = OcTree::with_resolution(0.1).unwrap();
//! tree.update_node(Point3::new(0.3, 0.2, 0.1), true).unwrap();
//!
//! let bytes = tree.to_bytes().unwrap();
//! let back = OcTree::from_bytes(&bytes).unwrap();
//! assert_eq!(back.leaf_count(), 1);
//! ```

use std::fs;
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::Path;

use occumap_types::{MapError, Result};
use tracing::info;

use crate::config::OcTreeConfig;
use crate::node::OcTreeNode;
use crate::octree::OcTree;
use crate::policy::OccupancyParams;

pub const MAGIC: [u8; 4] = *b"OCMP";
pub const FORMAT_MAJOR: u8 = 1;
pub const FORMAT_MINOR: u8 = 0;

/// Bytes of the header this version writes and requires.
const HEADER_LEN: u16 = 8 + 1 + 4 * 4 + 8;

fn corrupt(msg: impl Into<String>) -> MapError {
    MapError::CorruptFormat(msg.into())
}

// ────────────────────────────────────────────────────────────────────────────
// Writing
// ────────────────────────────────────────────────────────────────────────────

impl OcTree {
    /// Encode the whole tree into `w`.
    pub fn write_binary<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&MAGIC)?;
        w.write_all(&[FORMAT_MAJOR, FORMAT_MINOR])?;
        w.write_all(&HEADER_LEN.to_le_bytes())?;

        let params = self.params();
        w.write_all(&self.resolution().to_le_bytes())?;
        w.write_all(&[self.max_depth()])?;
        for v in [
            params.hit_log_odds,
            params.miss_log_odds,
            params.clamp_min_log_odds,
            params.clamp_max_log_odds,
        ] {
            w.write_all(&v.to_le_bytes())?;
        }
        w.write_all(&params.occupancy_threshold.to_le_bytes())?;

        match self.root() {
            None => w.write_all(&[0])?,
            Some(root) => {
                w.write_all(&[1])?;
                write_node(w, root)?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_binary(&mut buf)?;
        Ok(buf)
    }

    /// Write the tree to `path`, creating parent directories if necessary.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut w = BufWriter::new(fs::File::create(path)?);
        self.write_binary(&mut w)?;
        w.flush()?;
        info!(path = %path.display(), nodes = self.size(), "wrote map");
        Ok(())
    }
}

fn write_node<W: Write>(w: &mut W, node: &OcTreeNode) -> io::Result<()> {
    match node {
        OcTreeNode::Leaf(v) => {
            w.write_all(&[0])?;
            w.write_all(&v.to_le_bytes())
        }
        OcTreeNode::Inner { .. } => {
            w.write_all(&[node.child_bitmap()])?;
            for (_, child) in node.children() {
                write_node(w, child)?;
            }
            Ok(())
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reading
// ────────────────────────────────────────────────────────────────────────────

impl OcTree {
    /// Decode one tree from `r`.
    ///
    /// Reads exactly the bytes of one encoded tree; anything after it is left
    /// in the reader. Nothing is returned unless the whole tree decoded.
    pub fn read_binary<R: Read>(r: &mut R) -> Result<OcTree> {
        let magic: [u8; 4] = read_array(r)?;
        if magic != MAGIC {
            return Err(corrupt(format!("bad magic {magic:02x?}")));
        }
        let [major, minor] = read_array::<2, _>(r)?;
        if major != FORMAT_MAJOR {
            return Err(corrupt(format!(
                "unsupported format version {major}.{minor} (reader is {FORMAT_MAJOR}.{FORMAT_MINOR})"
            )));
        }
        let header_len = u16::from_le_bytes(read_array(r)?);
        if header_len < HEADER_LEN {
            return Err(corrupt(format!("header too short: {header_len} bytes")));
        }
        let resolution = f64::from_le_bytes(read_array(r)?);
        let [max_depth] = read_array::<1, _>(r)?;
        let mut params = [0f32; 4];
        for p in &mut params {
            *p = f32::from_le_bytes(read_array(r)?);
        }
        let occupancy_threshold = f64::from_le_bytes(read_array(r)?);
        skip(r, u64::from(header_len - HEADER_LEN))?;

        let config = OcTreeConfig {
            resolution,
            max_depth,
            occupancy: OccupancyParams {
                hit_log_odds: params[0],
                miss_log_odds: params[1],
                clamp_min_log_odds: params[2],
                clamp_max_log_odds: params[3],
                occupancy_threshold,
            },
        };
        let mut tree = OcTree::new(config).map_err(|e| corrupt(format!("invalid header: {e}")))?;

        let root = match read_array::<1, _>(r)? {
            [0] => None,
            [1] => Some(read_node(r, 0, max_depth)?),
            [flag] => return Err(corrupt(format!("bad root flag {flag}"))),
        };
        tree.set_root(root);
        Ok(tree)
    }

    /// Decode a tree that occupies all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<OcTree> {
        let mut cursor = Cursor::new(bytes);
        let tree = Self::read_binary(&mut cursor)?;
        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(corrupt(format!(
                "{} trailing bytes after tree",
                bytes.len() - consumed
            )));
        }
        Ok(tree)
    }

    pub fn read_file(path: &Path) -> Result<OcTree> {
        let bytes = fs::read(path)?;
        let tree = Self::from_bytes(&bytes)?;
        info!(
            path = %path.display(),
            nodes = tree.size(),
            resolution = tree.resolution(),
            "loaded map"
        );
        Ok(tree)
    }
}

fn read_node<R: Read>(r: &mut R, depth: u8, max_depth: u8) -> Result<OcTreeNode> {
    let [bitmap] = read_array::<1, _>(r)?;
    if bitmap == 0 {
        let value = f32::from_le_bytes(read_array(r)?);
        if !value.is_finite() {
            return Err(corrupt(format!("non-finite leaf value at depth {depth}")));
        }
        return Ok(OcTreeNode::Leaf(value));
    }
    if depth >= max_depth {
        return Err(corrupt(format!(
            "node at the finest depth {depth} claims children {bitmap:#010b}"
        )));
    }
    let mut node = OcTreeNode::empty_inner();
    if let Some(children) = node.children_mut() {
        for (octant, slot) in children.iter_mut().enumerate() {
            if bitmap & (1 << octant) != 0 {
                *slot = Some(read_node(r, depth + 1, max_depth)?);
            }
        }
    }
    node.update_inner_occupancy();
    Ok(node)
}

fn read_array<const N: usize, R: Read>(r: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => corrupt("truncated stream"),
        _ => MapError::Io(e),
    })?;
    Ok(buf)
}

fn skip<R: Read>(r: &mut R, n: u64) -> Result<()> {
    let skipped = io::copy(&mut r.by_ref().take(n), &mut io::sink())?;
    if skipped != n {
        return Err(corrupt("truncated header"));
    }
    Ok(())
}
