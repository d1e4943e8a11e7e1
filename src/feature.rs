//! Feature toggles for optional generated code
//!
//! Every optional block the generator can emit is named by a [`Feature`].
//! Tables carry two [`FeatureSet`] masks, one listing included and one
//! listing excluded features. [`has`] decides whether a requested feature set
//! is enabled for such a pair of masks.

use serde::Deserialize;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// A single optional capability of the generated code
///
/// The discriminant is the bit position inside a [`FeatureSet`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, AsRefStr, IntoStaticStr,
)]
#[repr(u8)]
pub enum Feature {
    /// The entity struct itself
    EntityStruct = 0,
    /// `empty()` resetting an entity to its default
    EntityEmpty,
    /// `copy()` cloning the column fields without relationships
    EntityCopy,
    /// `write_to()` dumping the column values as a tab separated line
    EntityWriteTo,
    /// Getter/setter pairs for private fields
    EntityGetSetPrivateFields,
    /// Fields pointing to related entities and collections
    EntityRelationships,
    /// `validate()` checking value lengths
    EntityValidate,
    /// The collection struct wrapping a `Vec` of entities
    CollectionStruct,
    /// `append()` on collections
    CollectionAppend,
    /// `cut()` on collections
    CollectionCut,
    /// `delete()` on collections
    CollectionDelete,
    /// `each()` on collections
    CollectionEach,
    /// `filter()` on collections
    CollectionFilter,
    /// `insert()` on collections
    CollectionInsert,
    /// `swap()` on collections
    CollectionSwap,
    /// Getters returning all values of primary and unique key columns
    CollectionUniqueGetters,
    /// Getters returning the deduplicated values of uniquified columns
    CollectionUniquifiedGetters,
    /// `validate()` on collections
    CollectionValidate,
    /// Table and column name constants
    DB,
    /// `ColumnMapper` implementations
    DBMapColumns,
    /// `assign_last_insert_id()` for auto increment tables
    DBAssignLastInsertID,
    /// SELECT statement constant
    DBSelect,
    /// INSERT statement constant
    DBInsert,
    /// UPDATE statement constant
    DBUpdate,
    /// INSERT .. ON DUPLICATE KEY UPDATE statement constant
    DBUpsert,
    /// DELETE statement constant
    DBDelete,
}

impl Feature {
    /// The bit of this feature inside a 64-bit mask
    pub const fn bit(self) -> u64 {
        1 << (self as u8)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// A 64-bit set of [`Feature`]s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct FeatureSet(u64);

impl FeatureSet {
    /// The empty set
    pub const EMPTY: FeatureSet = FeatureSet(0);

    /// Build a set from a raw mask
    pub const fn from_bits(bits: u64) -> Self {
        FeatureSet(bits)
    }

    /// The raw mask
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether no feature is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Add a feature, builder style
    pub const fn with(self, feature: Feature) -> Self {
        FeatureSet(self.0 | feature.bit())
    }

    /// Whether the given feature is part of the set
    pub const fn contains(self, feature: Feature) -> bool {
        self.0 & feature.bit() != 0
    }

    /// Whether every feature of `other` is part of this set
    pub const fn contains_all(self, other: FeatureSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether both sets share at least one feature
    pub const fn intersects(self, other: FeatureSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Iterate the features of this set in declaration order
    pub fn iter(self) -> impl Iterator<Item = Feature> {
        Feature::iter().filter(move |f| self.contains(*f))
    }

    /// Human readable names of the features in this set
    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(<&'static str>::from).collect()
    }
}

impl From<Feature> for FeatureSet {
    fn from(f: Feature) -> Self {
        FeatureSet(f.bit())
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        iter.into_iter().fold(FeatureSet::EMPTY, FeatureSet::with)
    }
}

impl BitOr for Feature {
    type Output = FeatureSet;

    fn bitor(self, rhs: Feature) -> FeatureSet {
        FeatureSet(self.bit() | rhs.bit())
    }
}

impl BitOr<Feature> for FeatureSet {
    type Output = FeatureSet;

    fn bitor(self, rhs: Feature) -> FeatureSet {
        self.with(rhs)
    }
}

impl BitOr for FeatureSet {
    type Output = FeatureSet;

    fn bitor(self, rhs: FeatureSet) -> FeatureSet {
        FeatureSet(self.0 | rhs.0)
    }
}

impl BitOrAssign<Feature> for FeatureSet {
    fn bitor_assign(&mut self, rhs: Feature) {
        self.0 |= rhs.bit();
    }
}

impl TryFrom<Vec<String>> for FeatureSet {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        names.iter().try_fold(FeatureSet::EMPTY, |set, name| {
            Feature::from_str(name)
                .map(|f| set.with(f))
                .map_err(|_| format!("unknown feature {:?}", name))
        })
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join("|"))
    }
}

/// How a requested feature set is compared against the included features
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Every requested feature must be included
    And,
    /// At least one requested feature must be included
    #[default]
    Or,
}

impl Mode {
    /// Parse the single character form, `'a'` for AND and `'o'` for OR.
    ///
    /// # Panics
    ///
    /// Any other character is a programming error and panics.
    pub fn from_char(c: char) -> Mode {
        match c {
            'a' => Mode::And,
            'o' => Mode::Or,
            _ => panic!("feature mode {:?} not supported, use 'a' or 'o'", c),
        }
    }
}

/// Decide whether `requested` is enabled given the include and exclude masks
///
/// Empty masks permit everything. An excluded bit shared with `requested`
/// always denies, whatever the mode.
pub fn has(
    included: FeatureSet,
    excluded: FeatureSet,
    requested: impl Into<FeatureSet>,
    mode: Mode,
) -> bool {
    let requested = requested.into();
    if included.is_empty() && excluded.is_empty() {
        return true;
    }
    if !excluded.is_empty() {
        if excluded.intersects(requested) {
            return false;
        }
        if included.is_empty() {
            return true;
        }
    }
    match mode {
        Mode::And => included.contains_all(requested),
        Mode::Or => included.intersects(requested),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_masks_permit_everything() {
        for f in Feature::iter() {
            assert!(has(FeatureSet::EMPTY, FeatureSet::EMPTY, f, Mode::And));
            assert!(has(FeatureSet::EMPTY, FeatureSet::EMPTY, f, Mode::Or));
        }
    }

    #[test]
    fn test_exclude_dominates_include() {
        let inc = Feature::EntityStruct | Feature::EntityCopy;
        let exc = FeatureSet::from(Feature::EntityCopy);
        assert!(!has(inc, exc, Feature::EntityCopy, Mode::Or));
        assert!(!has(inc, exc, Feature::EntityCopy, Mode::And));
        assert!(!has(
            inc,
            exc,
            Feature::EntityStruct | Feature::EntityCopy,
            Mode::Or
        ));
        assert!(has(inc, exc, Feature::EntityStruct, Mode::Or));
    }

    #[test]
    fn test_exclude_only() {
        let exc = FeatureSet::from(Feature::DBDelete);
        assert!(has(FeatureSet::EMPTY, exc, Feature::DBSelect, Mode::And));
        assert!(!has(FeatureSet::EMPTY, exc, Feature::DBDelete, Mode::Or));
    }

    #[test]
    fn test_and_or_modes() {
        let inc = Feature::DB | Feature::DBSelect | Feature::DBInsert;
        let all = Feature::DB | Feature::DBSelect;
        let partial = Feature::DB | Feature::DBDelete;

        assert!(has(inc, FeatureSet::EMPTY, all, Mode::And));
        assert!(!has(inc, FeatureSet::EMPTY, partial, Mode::And));
        assert!(has(inc, FeatureSet::EMPTY, partial, Mode::Or));
        assert!(!has(inc, FeatureSet::EMPTY, Feature::DBUpsert, Mode::Or));
    }

    #[test]
    fn test_mode_from_char() {
        assert_eq!(Mode::from_char('a'), Mode::And);
        assert_eq!(Mode::from_char('o'), Mode::Or);
        assert_eq!(Mode::default(), Mode::Or);
    }

    #[test]
    #[should_panic(expected = "not supported")]
    fn test_mode_from_unknown_char_panics() {
        Mode::from_char('x');
    }

    #[test]
    fn test_names_and_parse() {
        let set = Feature::EntityCopy | Feature::DBAssignLastInsertID;
        assert_eq!(set.names(), vec!["EntityCopy", "DBAssignLastInsertID"]);
        assert_eq!(set.to_string(), "EntityCopy|DBAssignLastInsertID");

        let parsed =
            FeatureSet::try_from(vec!["DBAssignLastInsertID".to_string(), "EntityCopy".into()])
                .unwrap();
        assert_eq!(parsed, set);
        assert!(FeatureSet::try_from(vec!["Nope".to_string()]).is_err());
    }

    #[test]
    fn test_bits_fit_in_u64() {
        assert!(Feature::iter().all(|f| (f as u8) < 64));
        assert_eq!(Feature::iter().count(), 26);
    }
}
