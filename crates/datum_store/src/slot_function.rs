//! Slot function: dataInfoId -> slot id

use contracts::SlotId;

pub const DEFAULT_SLOT_COUNT: u32 = 256;

/// Deterministic key to slot mapping.
///
/// Must be identical on every node of the cluster.
pub trait SlotFunction: Send + Sync {
    fn slot_of(&self, data_info_id: &str) -> SlotId;

    fn slot_count(&self) -> u32;
}

/// 64-bit FNV-1a hash modulo the slot count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fnv1aSlotFunction {
    slot_count: u32,
}

impl Fnv1aSlotFunction {
    /// A zero slot count is raised to one.
    pub fn new(slot_count: u32) -> Self {
        Self {
            slot_count: slot_count.max(1),
        }
    }

    fn hash(key: &[u8]) -> u64 {
        const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
        const PRIME: u64 = 0x100000001b3;
        key.iter().fold(OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
        })
    }
}

impl Default for Fnv1aSlotFunction {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_COUNT)
    }
}

impl SlotFunction for Fnv1aSlotFunction {
    fn slot_of(&self, data_info_id: &str) -> SlotId {
        (Self::hash(data_info_id.as_bytes()) % u64::from(self.slot_count)) as SlotId
    }

    fn slot_count(&self) -> u32 {
        self.slot_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_is_stable_and_in_range() {
        let f = Fnv1aSlotFunction::default();
        for key in ["a", "svc://foo#@#DEFAULT#@#GROUP", ""] {
            let slot = f.slot_of(key);
            assert!(slot < DEFAULT_SLOT_COUNT);
            assert_eq!(slot, f.slot_of(key));
        }
    }

    #[test]
    fn test_known_hash_value() {
        // FNV-1a("a") = 0xaf63dc4c8601ec8c
        assert_eq!(Fnv1aSlotFunction::hash(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(
            Fnv1aSlotFunction::new(16).slot_of("a"),
            (0xaf63dc4c8601ec8cu64 % 16) as u32
        );
    }

    #[test]
    fn test_zero_slot_count_clamped() {
        let f = Fnv1aSlotFunction::new(0);
        assert_eq!(f.slot_count(), 1);
        assert_eq!(f.slot_of("anything"), 0);
    }
}
