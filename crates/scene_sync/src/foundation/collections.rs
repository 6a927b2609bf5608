//! Specialized collection types

pub use indexmap::{IndexMap, IndexSet};

/// Insert `bits` into an OR-accumulating ordered map.
///
/// A repeated key keeps its original position and merges the new bits
/// into the existing value.
pub fn or_insert_bits<K, B>(map: &mut IndexMap<K, B>, key: K, bits: B)
where
    K: std::hash::Hash + Eq,
    B: Copy + std::ops::BitOr<Output = B>,
{
    map.entry(key)
        .and_modify(|existing| *existing = *existing | bits)
        .or_insert(bits);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_insert_bits_accumulates_in_place() {
        let mut map: IndexMap<&str, u32> = IndexMap::new();
        or_insert_bits(&mut map, "a", 0b001);
        or_insert_bits(&mut map, "b", 0b010);
        or_insert_bits(&mut map, "a", 0b100);

        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], 0b101);
        // "a" keeps its first insertion slot
        assert_eq!(map.get_index(0), Some((&"a", &0b101)));
    }
}
