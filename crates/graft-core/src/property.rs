//! Property definitions, typed property keys, and the [`PropertySet`] bitset.

use std::fmt;
use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::id::PropertyId;
use crate::value::{PropertyValue, Value, ValueKind};

/// Definition of a property registered on a node type.
///
/// Properties are registered when the node type is built; `PropertyId`
/// is the index into the type's property list.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDef {
    /// Name used for diagnostics and at the binding boundary.
    pub name: String,
    /// Declared value kind. [`Value::Null`] is always accepted.
    pub kind: ValueKind,
    /// Initial value of the property on a freshly allocated node.
    pub default: Value,
    /// Whether the cell starts read-only.
    pub read_only: bool,
}

impl PropertyDef {
    /// A writable property with a null default.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Value::Null,
            read_only: false,
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Mark the property read-only from creation.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// A typed key for a property.
///
/// Pairs a [`PropertyId`] with the Rust type stored in it so reads and
/// writes through the graph are checked at compile time. Declared as
/// constants next to the node type definition:
///
/// ```
/// use graft_core::{Property, PropertyId};
///
/// const NAME: Property<String> = Property::new(PropertyId(0));
/// const AGE: Property<Option<i64>> = Property::new(PropertyId(1));
/// assert_eq!(NAME.id(), PropertyId(0));
/// assert_eq!(AGE.id(), PropertyId(1));
/// ```
pub struct Property<T> {
    id: PropertyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    /// Create a typed key for `id`.
    pub const fn new(id: PropertyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The untyped property id.
    pub const fn id(&self) -> PropertyId {
        self.id
    }
}

impl<T: PropertyValue> Property<T> {
    /// The value kind this key reads and writes.
    pub const fn kind(&self) -> ValueKind {
        T::KIND
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Property<T> {}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.id).finish()
    }
}

impl<T> From<Property<T>> for PropertyId {
    fn from(p: Property<T>) -> Self {
        p.id
    }
}

/// A set of property IDs implemented as a bitset.
///
/// Used by rules to declare their trigger properties and by the engine
/// to describe which properties changed. Node types with up to 64
/// properties stay inline.
#[derive(Clone, Debug, Default)]
pub struct PropertySet {
    bits: SmallVec<[u64; 1]>,
}

impl PropertySet {
    const BITS_PER_WORD: usize = 64;

    /// Create an empty property set.
    pub fn empty() -> Self {
        Self {
            bits: SmallVec::new(),
        }
    }

    /// A set holding `PropertyId(0)..PropertyId(count)`.
    pub fn full(count: usize) -> Self {
        (0..count as u32).map(PropertyId).collect()
    }

    /// Insert a property ID into the set.
    pub fn insert(&mut self, property: PropertyId) {
        let word = property.0 as usize / Self::BITS_PER_WORD;
        let bit = property.0 as usize % Self::BITS_PER_WORD;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1u64 << bit;
    }

    /// Check whether the set contains a property ID.
    pub fn contains(&self, property: PropertyId) -> bool {
        let word = property.0 as usize / Self::BITS_PER_WORD;
        let bit = property.0 as usize % Self::BITS_PER_WORD;
        word < self.bits.len() && (self.bits[word] & (1u64 << bit)) != 0
    }

    /// Return the union of two sets (`self | other`).
    pub fn union(&self, other: &Self) -> Self {
        let max_len = self.bits.len().max(other.bits.len());
        let bits = (0..max_len)
            .map(|i| self.word(i) | other.word(i))
            .collect();
        Self { bits }
    }

    /// Return the intersection of two sets (`self & other`).
    pub fn intersection(&self, other: &Self) -> Self {
        let min_len = self.bits.len().min(other.bits.len());
        let mut bits: SmallVec<[u64; 1]> = (0..min_len)
            .map(|i| self.bits[i] & other.bits[i])
            .collect();
        while bits.last() == Some(&0) {
            bits.pop();
        }
        Self { bits }
    }

    /// Return the set difference (`self - other`).
    pub fn difference(&self, other: &Self) -> Self {
        let mut bits: SmallVec<[u64; 1]> = (0..self.bits.len())
            .map(|i| self.bits[i] & !other.word(i))
            .collect();
        while bits.last() == Some(&0) {
            bits.pop();
        }
        Self { bits }
    }

    /// Whether the two sets share at least one property.
    pub fn intersects(&self, other: &Self) -> bool {
        self.bits
            .iter()
            .zip(other.bits.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Check whether `self` is a subset of `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        (0..self.bits.len()).all(|i| self.bits[i] & !other.word(i) == 0)
    }

    /// Returns `true` if the set contains no properties.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Returns the number of properties in the set.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// The lowest property ID in the set.
    pub fn first(&self) -> Option<PropertyId> {
        self.iter().next()
    }

    /// Iterate over the property IDs in the set, in ascending order.
    pub fn iter(&self) -> PropertySetIter<'_> {
        PropertySetIter {
            bits: &self.bits,
            word_idx: 0,
            bit_idx: 0,
        }
    }

    fn word(&self, i: usize) -> u64 {
        self.bits.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for PropertySet {
    fn eq(&self, other: &Self) -> bool {
        let max_len = self.bits.len().max(other.bits.len());
        (0..max_len).all(|i| self.word(i) == other.word(i))
    }
}

impl Eq for PropertySet {}

impl FromIterator<PropertyId> for PropertySet {
    fn from_iter<I: IntoIterator<Item = PropertyId>>(iter: I) -> Self {
        let mut set = Self::empty();
        for property in iter {
            set.insert(property);
        }
        set
    }
}

impl<'a> IntoIterator for &'a PropertySet {
    type Item = PropertyId;
    type IntoIter = PropertySetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over property IDs in a [`PropertySet`], in ascending order.
pub struct PropertySetIter<'a> {
    bits: &'a [u64],
    word_idx: usize,
    bit_idx: usize,
}

impl Iterator for PropertySetIter<'_> {
    type Item = PropertyId;

    fn next(&mut self) -> Option<Self::Item> {
        while self.word_idx < self.bits.len() {
            let remaining = if self.bit_idx < 64 {
                self.bits[self.word_idx] >> self.bit_idx
            } else {
                0
            };
            if remaining != 0 {
                let bit = self.bit_idx + remaining.trailing_zeros() as usize;
                self.bit_idx = bit + 1;
                return Some(PropertyId((self.word_idx * 64 + bit) as u32));
            }
            self.word_idx += 1;
            self.bit_idx = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_property_set() -> impl Strategy<Value = PropertySet> {
        prop::collection::vec(0u32..160, 0..32)
            .prop_map(|ids| ids.into_iter().map(PropertyId).collect::<PropertySet>())
    }

    #[test]
    fn iterates_ascending_across_words() {
        let set: PropertySet = [70, 3, 63, 64, 0].into_iter().map(PropertyId).collect();
        let ids: Vec<u32> = set.iter().map(|p| p.0).collect();
        assert_eq!(ids, vec![0, 3, 63, 64, 70]);
        assert_eq!(set.first(), Some(PropertyId(0)));
    }

    #[test]
    fn full_covers_prefix() {
        let set = PropertySet::full(3);
        assert_eq!(set.len(), 3);
        assert!(set.contains(PropertyId(2)));
        assert!(!set.contains(PropertyId(3)));
    }

    #[test]
    fn typed_key_exposes_kind() {
        const QTY: Property<i64> = Property::new(PropertyId(4));
        assert_eq!(QTY.kind(), ValueKind::Int);
        assert_eq!(PropertyId::from(QTY), PropertyId(4));
    }

    proptest! {
        #[test]
        fn union_commutative(a in arb_property_set(), b in arb_property_set()) {
            prop_assert_eq!(a.union(&b), b.union(&a));
        }

        #[test]
        fn intersection_commutative(a in arb_property_set(), b in arb_property_set()) {
            prop_assert_eq!(a.intersection(&b), b.intersection(&a));
        }

        #[test]
        fn intersects_agrees_with_intersection(a in arb_property_set(), b in arb_property_set()) {
            prop_assert_eq!(a.intersects(&b), !a.intersection(&b).is_empty());
        }

        #[test]
        fn difference_removes_common(a in arb_property_set(), b in arb_property_set()) {
            let diff = a.difference(&b);
            for property in diff.iter() {
                prop_assert!(a.contains(property));
                prop_assert!(!b.contains(property));
            }
        }

        #[test]
        fn union_is_superset(a in arb_property_set(), b in arb_property_set()) {
            let u = a.union(&b);
            prop_assert!(a.is_subset(&u));
            prop_assert!(b.is_subset(&u));
        }

        #[test]
        fn len_matches_iter_count(a in arb_property_set()) {
            prop_assert_eq!(a.len(), a.iter().count());
        }

        #[test]
        fn iter_yields_members_only(ids in prop::collection::vec(0u32..160, 0..32)) {
            let set: PropertySet = ids.iter().copied().map(PropertyId).collect();
            for p in set.iter() {
                prop_assert!(ids.contains(&p.0));
            }
            for id in &ids {
                prop_assert!(set.contains(PropertyId(*id)));
            }
        }
    }
}
