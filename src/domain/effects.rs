//! Effect catalog
//!
//! The lamp addresses its built-in animations by a single-byte index. Index 0
//! is the "no effect" entry.

/// Effects known to the TL100 firmware, in protocol order
pub const TL100_EFFECTS: &[&str] = &[
    "Off",
    "Random",
    "Rainbow",
    "Rainbow Slow",
    "Fusion",
    "Pulse",
    "Wave",
    "Chill",
    "Action",
    "Forest",
    "Summer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectCatalog {
    names: &'static [&'static str],
}

impl EffectCatalog {
    /// `names` must not be empty.
    pub const fn new(names: &'static [&'static str]) -> Self {
        assert!(!names.is_empty(), "effect catalog needs at least one entry");
        Self { names }
    }

    pub fn names(&self) -> &'static [&'static str] {
        self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for a device-reported index; out of range clamps to the last entry
    pub fn name_at(&self, index: u8) -> &'static str {
        let clamped = (index as usize).min(self.names.len() - 1);
        self.names[clamped]
    }

    /// Index for a name; unknown names map to 0
    pub fn index_of(&self, name: &str) -> u8 {
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|i| i as u8)
            .unwrap_or(0)
    }
}

impl Default for EffectCatalog {
    fn default() -> Self {
        Self::new(TL100_EFFECTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN: &[&str] = &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

    #[test]
    fn test_out_of_range_index_clamps() {
        let catalog = EffectCatalog::new(TEN);
        assert_eq!(catalog.name_at(200), "9");
        assert_eq!(catalog.index_of(catalog.name_at(200)), 9);
    }

    #[test]
    fn test_lookup_by_name() {
        let catalog = EffectCatalog::default();
        assert_eq!(catalog.len(), 11);
        assert_eq!(catalog.index_of("Rainbow"), 2);
        assert_eq!(catalog.index_of("Summer"), 10);
        assert_eq!(catalog.name_at(4), "Fusion");
    }

    #[test]
    fn test_unknown_name_is_index_zero() {
        let catalog = EffectCatalog::default();
        assert_eq!(catalog.index_of("Disco"), 0);
        assert_eq!(catalog.name_at(catalog.index_of("Disco")), "Off");
    }
}
