//! Dirty-bit and rebuild-flag definitions

use bitflags::bitflags;

bitflags! {
    /// Per-entity invalidation mask.
    ///
    /// Bits are OR-accumulated between ticks and only cleared by the render
    /// backend once it has consumed a frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyBits: u32 {
        /// Visibility changed
        const VISIBILITY = 1 << 0;
        /// World transform changed
        const TRANSFORM = 1 << 1;
        /// Bounds changed
        const EXTENT = 1 << 2;
        /// Point positions changed
        const POINTS = 1 << 3;
        /// Topology changed
        const TOPOLOGY = 1 << 4;
        /// Normals changed
        const NORMALS = 1 << 5;
        /// Generic primvars changed
        const PRIMVAR = 1 << 6;
        /// Material binding or material classification changed
        const MATERIAL_ID = 1 << 7;
        /// Instancer membership changed
        const INSTANCER = 1 << 8;
        /// Instance index set changed
        const INSTANCE_INDEX = 1 << 9;
        /// Shading or light parameters changed
        const PARAMS = 1 << 10;
        /// Everything; used for freshly inserted entities
        const ALL_DIRTY = (1 << 11) - 1;
    }
}

impl DirtyBits {
    /// No pending invalidation
    pub const CLEAN: Self = Self::empty();
}

bitflags! {
    /// Which parts of an adapter a deferred rebuild re-runs
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RebuildFlags: u8 {
        /// Uninstall and reinstall event subscriptions
        const CALLBACKS = 1 << 0;
        /// Remove and re-insert the render entities
        const PRIM = 1 << 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_dirty_covers_every_bit() {
        let every = DirtyBits::VISIBILITY
            | DirtyBits::TRANSFORM
            | DirtyBits::EXTENT
            | DirtyBits::POINTS
            | DirtyBits::TOPOLOGY
            | DirtyBits::NORMALS
            | DirtyBits::PRIMVAR
            | DirtyBits::MATERIAL_ID
            | DirtyBits::INSTANCER
            | DirtyBits::INSTANCE_INDEX
            | DirtyBits::PARAMS;
        assert_eq!(DirtyBits::ALL_DIRTY, every);
        assert!(DirtyBits::CLEAN.is_empty());
    }
}
