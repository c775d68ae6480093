use std::fs;
use std::path::Path;
use std::sync::Arc;

use cells_blocks::{Block, BlockPalette};
use cells_geom::BlockPos;

use crate::error::StructureLoadError;
use crate::structure::{Structure, StructureBuilder};

/// File extensions understood by `mc_schem` (Sponge, legacy WorldEdit, Litematica, vanilla).
pub const STRUCTURE_EXTENSIONS: &[&str] = &["schem", "schematic", "litematic", "nbt"];

/// Anchor relative to the bounding-box minimum from a WorldEdit-style offset
/// (minimum corner minus the copy origin).
pub fn anchor_from_offset(offset: [i32; 3]) -> BlockPos {
    BlockPos::new(-offset[0], -offset[1], -offset[2])
}

pub fn is_structure_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            STRUCTURE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Parses structure files into layered [`Structure`]s, interning every block
/// key into the shared palette.
#[derive(Clone)]
pub struct StructureLoader {
    palette: Arc<BlockPalette>,
}

impl StructureLoader {
    pub fn new(palette: Arc<BlockPalette>) -> Self {
        Self { palette }
    }

    pub fn palette(&self) -> &Arc<BlockPalette> {
        &self.palette
    }

    pub fn load(&self, path: &Path) -> Result<Structure, StructureLoadError> {
        if !is_structure_file(path) {
            return Err(StructureLoadError::InvalidFormat {
                path: path.to_path_buf(),
                reason: "unrecognized structure format".to_string(),
            });
        }
        // Surface unreadable files as IO failures before handing the path to the parser.
        fs::File::open(path).map_err(|source| StructureLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let path_str = path
            .to_str()
            .ok_or_else(|| StructureLoadError::InvalidFormat {
                path: path.to_path_buf(),
                reason: "invalid path".to_string(),
            })?;
        let (schem, _) = mc_schem::Schematic::from_file(path_str).map_err(|e| {
            StructureLoadError::InvalidFormat {
                path: path.to_path_buf(),
                reason: format!("parse schem: {e}"),
            }
        })?;

        let shape = schem.shape();
        let (sx, sy, sz) = (
            shape[0].max(0) as usize,
            shape[1].max(0) as usize,
            shape[2].max(0) as usize,
        );
        let mut builder = StructureBuilder::new(sx, sy, sz);
        for y in 0..shape[1] {
            for z in 0..shape[2] {
                for x in 0..shape[0] {
                    let Some(b) = schem.first_block_at([x, y, z]) else {
                        continue;
                    };
                    if b.is_structure_void() {
                        continue;
                    }
                    let block = if b.is_air() {
                        Block::AIR
                    } else {
                        self.palette.intern(&b.full_id())
                    };
                    builder.set(x, y, z, block);
                }
            }
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let offset = schem
            .metadata
            .schem_we_offset
            .unwrap_or(schem.metadata.schem_offset);
        let structure = builder.build(name).with_anchor(anchor_from_offset(offset));
        log::debug!(
            "loaded structure {:?}: {}x{}x{}, anchor {}, {} sections, {} blocks",
            path,
            sx,
            sy,
            sz,
            structure.anchor(),
            structure.section_count(),
            structure.block_count()
        );
        Ok(structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn recognizes_extensions_case_insensitively() {
        assert!(is_structure_file(Path::new("levels/0.schem")));
        assert!(is_structure_file(Path::new("levels/1.SCHEMATIC")));
        assert!(is_structure_file(Path::new("a/b.litematic")));
        assert!(!is_structure_file(Path::new("levels/0.txt")));
        assert!(!is_structure_file(Path::new("levels/0")));
    }

    #[test]
    fn anchor_is_the_copy_origin_seen_from_the_minimum() {
        // Copied standing 2 east and 3 north of the minimum corner, one block above it.
        assert_eq!(anchor_from_offset([-2, -1, -3]), BlockPos::new(2, 1, 3));
        assert_eq!(anchor_from_offset([0, 0, 0]), BlockPos::ZERO);
    }

    #[test]
    fn unknown_extension_is_invalid_format() {
        let loader = StructureLoader::new(Arc::new(BlockPalette::new()));
        let err = loader.load(&PathBuf::from("nowhere/level.txt")).unwrap_err();
        assert!(matches!(err, StructureLoadError::InvalidFormat { .. }));
    }

    #[test]
    fn missing_file_is_io_failure() {
        let loader = StructureLoader::new(Arc::new(BlockPalette::new()));
        let err = loader
            .load(&PathBuf::from("definitely/not/here/0.schem"))
            .unwrap_err();
        assert!(matches!(err, StructureLoadError::Io { .. }));
    }
}
