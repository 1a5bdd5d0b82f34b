use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::commands::Code;

/// Last known raw value for every code in a table.
///
/// Lookups are total: a code that has never been reported reads as the
/// empty string.
#[derive(Debug, Clone)]
pub struct AttributeStore<C> {
    values: Vec<String>,
    _code: PhantomData<C>,
}

impl<C: Code> AttributeStore<C> {
    /// Store with every code unset
    pub fn new() -> Self {
        Self {
            values: vec![String::new(); C::ALL.len()],
            _code: PhantomData,
        }
    }

    /// Raw value, empty if never reported
    pub fn get(&self, code: C) -> &str {
        &self.values[code.index()]
    }

    /// Store a value and hand back the one it replaced
    pub fn set(&mut self, code: C, value: &str) -> String {
        std::mem::replace(&mut self.values[code.index()], value.to_string())
    }

    /// Value as an integer, `None` if absent or not numeric
    pub fn integer(&self, code: C) -> Option<i64> {
        self.get(code).trim().parse().ok()
    }

    /// Value as a flag; anything that is not a non-zero integer is `false`
    pub fn boolean(&self, code: C) -> bool {
        self.integer(code).is_some_and(|v| v != 0)
    }

    /// Every code that has been reported, with its value
    pub fn iter(&self) -> impl Iterator<Item = (C, &str)> + '_ {
        C::ALL
            .iter()
            .map(move |&code| (code, self.get(code)))
            .filter(|(_, value)| !value.is_empty())
    }
}

impl<C: Code> Default for AttributeStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Input slot numbers and the names the user gave them.
///
/// Every name-to-slot entry agrees with the slot-to-name entry for that
/// slot.
#[derive(Debug, Clone, Default)]
pub struct InputDirectory {
    names: BTreeMap<u32, String>,
    slots: BTreeMap<String, u32>,
}

impl InputDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a slot's name, returning whether it changed
    pub fn insert(&mut self, slot: u32, name: &str) -> bool {
        if self.names.get(&slot).is_some_and(|old| old == name) {
            return false;
        }

        if let Some(old) = self.names.insert(slot, name.to_string()) {
            if self.slots.get(&old) == Some(&slot) {
                self.slots.remove(&old);
            }
        }
        if let Some(previous) = self.slots.insert(name.to_string(), slot) {
            if previous != slot {
                tracing::debug!("Input name {} moved from slot {} to {}", name, previous, slot);
            }
        }
        true
    }

    /// Name of a slot
    pub fn name(&self, slot: u32) -> Option<&str> {
        self.names.get(&slot).map(String::as_str)
    }

    /// Slot carrying a name
    pub fn slot(&self, name: &str) -> Option<u32> {
        self.slots.get(name).copied()
    }

    /// Names ordered by slot
    pub fn names(&self) -> Vec<String> {
        self.names.values().cloned().collect()
    }

    /// Slots and names ordered by slot
    pub fn entries(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.names.iter().map(|(slot, name)| (*slot, name.as_str()))
    }

    /// Number of named slots
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no slot has been named yet
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{DeviceCode, ZoneCode};

    #[test]
    fn test_unset_values_are_empty() {
        let store: AttributeStore<DeviceCode> = AttributeStore::new();
        for code in DeviceCode::ALL {
            assert_eq!(store.get(*code), "");
        }
        assert_eq!(store.iter().count(), 0);
    }

    #[test]
    fn test_set_returns_previous_raw_value() {
        let mut store: AttributeStore<ZoneCode> = AttributeStore::new();
        assert_eq!(store.set(ZoneCode::Volume, "-42"), "");
        assert_eq!(store.set(ZoneCode::Volume, "-40"), "-42");
        assert_eq!(store.get(ZoneCode::Volume), "-40");
    }

    #[test]
    fn test_typed_reads_tolerate_garbage() {
        let mut store: AttributeStore<ZoneCode> = AttributeStore::new();
        assert_eq!(store.integer(ZoneCode::Volume), None);
        assert!(!store.boolean(ZoneCode::Mute));

        store.set(ZoneCode::Volume, "abc");
        store.set(ZoneCode::Mute, "x");
        assert_eq!(store.integer(ZoneCode::Volume), None);
        assert!(!store.boolean(ZoneCode::Mute));

        store.set(ZoneCode::Mute, "1");
        assert!(store.boolean(ZoneCode::Mute));
    }

    #[test]
    fn test_input_directory_both_directions() {
        let mut inputs = InputDirectory::new();
        assert!(inputs.insert(1, "Turntable"));
        assert!(inputs.insert(2, "Blu-ray"));
        assert!(!inputs.insert(1, "Turntable"));

        assert_eq!(inputs.name(1), Some("Turntable"));
        assert_eq!(inputs.slot("Blu-ray"), Some(2));
        assert_eq!(inputs.names(), vec!["Turntable", "Blu-ray"]);
    }

    #[test]
    fn test_renamed_slot_drops_old_name() {
        let mut inputs = InputDirectory::new();
        inputs.insert(1, "CD");
        assert!(inputs.insert(1, "Phono"));
        assert_eq!(inputs.slot("CD"), None);
        assert_eq!(inputs.slot("Phono"), Some(1));
        assert_eq!(inputs.len(), 1);
    }

    #[test]
    fn test_name_lookups_agree_with_slots() {
        let mut inputs = InputDirectory::new();
        inputs.insert(1, "TV");
        inputs.insert(2, "TV");
        inputs.insert(1, "Game");
        for (slot, name) in inputs.entries() {
            if let Some(found) = inputs.slot(name) {
                assert_eq!(inputs.name(found), Some(name));
            }
            assert!(slot >= 1);
        }
        assert_eq!(inputs.slot("TV"), Some(2));
        assert_eq!(inputs.slot("Game"), Some(1));
    }
}
