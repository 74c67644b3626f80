//! # Range Builder
//!
//! Turns the vertices an operation asks about into the byte ranges to scan.
//!
//! | Lookup | Ranges |
//! |--------|--------|
//! | point range / seed | `KeyPackage::seed_ranges`, split by direction where the layout allows |
//! | proper range | one `KeyPackage::range_bounds` range |
//! | reversed range | none |
//!
//! Every identifier is encoded before any range is returned, so a lookup
//! with one bad identifier fails with `InvalidRange` before anything is
//! scanned. Overlaps are left to the retriever.

use tracing::debug;

use crate::key::{ByteRange, KeyPackage, KeySpace};
use crate::model::{ElementSeed, SeedRange};
use crate::Result;

/// The vertices an operation is about.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Ranges(Vec<SeedRange>),
    Seeds(Vec<ElementSeed>),
}

impl Lookup {
    pub fn is_empty(&self) -> bool {
        match self {
            Lookup::Ranges(ranges) => ranges.is_empty(),
            Lookup::Seeds(seeds) => seeds.is_empty(),
        }
    }
}

/// Builds scan ranges against one key package.
#[derive(Debug, Clone, Copy)]
pub struct RangeBuilder<'p> {
    package: &'p dyn KeyPackage,
}

impl<'p> RangeBuilder<'p> {
    pub fn new(package: &'p dyn KeyPackage) -> Self {
        Self { package }
    }

    pub fn build(&self, lookup: &Lookup, space: KeySpace) -> Result<Vec<ByteRange>> {
        let mut out = Vec::new();
        match lookup {
            Lookup::Ranges(ranges) => {
                for range in ranges {
                    self.push_range(range, space, &mut out)?;
                }
            }
            Lookup::Seeds(seeds) => {
                for seed in seeds {
                    out.extend(self.package.seed_ranges(seed, space)?);
                }
            }
        }
        if space.is_empty() {
            out.clear();
        }
        debug!(package = %self.package.kind(), ranges = out.len(), "built scan ranges");
        Ok(out)
    }

    fn push_range(&self, range: &SeedRange, space: KeySpace, out: &mut Vec<ByteRange>) -> Result<()> {
        if range.is_point() {
            out.extend(self.package.seed_ranges(&range.start, space)?);
            return Ok(());
        }
        match self.package.range_bounds(range)? {
            Some(bounds) => out.push(bounds),
            None => debug!(start = %range.start.vertex(), end = %range.end.vertex(), "reversed range scans nothing"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::key::KeyPackageKind;
    use crate::model::{Edge, Element, Entity};
    use crate::schema::{GroupDefinition, PropertyType, Schema};
    use crate::Error;

    fn packages() -> Vec<Arc<dyn KeyPackage>> {
        let schema = Arc::new(
            Schema::new(PropertyType::String)
                .with_entity("N", GroupDefinition::new())
                .with_edge("E", GroupDefinition::new()),
        );
        vec![
            KeyPackageKind::ByteEntity.build(Arc::clone(&schema)),
            KeyPackageKind::Classic.build(schema),
        ]
    }

    fn keys_of(package: &dyn KeyPackage, element: Element) -> Vec<Vec<u8>> {
        package.encode_element(&element).unwrap().into_iter().map(|(k, _)| k).collect()
    }

    fn covered(ranges: &[ByteRange], key: &[u8]) -> bool {
        ranges.iter().any(|r| r.contains(key))
    }

    #[test]
    fn test_proper_range_is_one_range() {
        for package in packages() {
            let builder = RangeBuilder::new(package.as_ref());
            let ranges = builder.build(&Lookup::Ranges(vec![SeedRange::new("0", "1")]), KeySpace::ALL).unwrap();
            assert_eq!(ranges.len(), 1);

            let inside = keys_of(package.as_ref(), Entity::new("N", "0999").into());
            let outside = keys_of(package.as_ref(), Entity::new("N", "10").into());
            assert!(covered(&ranges, &inside[0]));
            assert!(!covered(&ranges, &outside[0]));
        }
    }

    #[test]
    fn test_range_end_is_inclusive_but_not_a_prefix() {
        for package in packages() {
            let builder = RangeBuilder::new(package.as_ref());
            let ranges = builder.build(&Lookup::Ranges(vec![SeedRange::new("0", "08")]), KeySpace::ALL).unwrap();
            let end = keys_of(package.as_ref(), Edge::new("E", "08", "B", true).into());
            let beyond = keys_of(package.as_ref(), Entity::new("N", "0800").into());
            assert!(covered(&ranges, &end[0]));
            assert!(!covered(&ranges, &beyond[0]));
        }
    }

    #[test]
    fn test_reversed_range_is_empty_not_error() {
        for package in packages() {
            let builder = RangeBuilder::new(package.as_ref());
            let ranges = builder.build(&Lookup::Ranges(vec![SeedRange::new("z", "a")]), KeySpace::ALL).unwrap();
            assert!(ranges.is_empty());
        }
    }

    #[test]
    fn test_point_range_uses_seed_ranges() {
        for package in packages() {
            let builder = RangeBuilder::new(package.as_ref());
            let point = builder.build(&Lookup::Ranges(vec![SeedRange::point("a")]), KeySpace::ALL).unwrap();
            let seed = builder.build(&Lookup::Seeds(vec![ElementSeed::new("a")]), KeySpace::ALL).unwrap();
            assert_eq!(point, seed);

            let edge = keys_of(package.as_ref(), Edge::new("E", "a", "b", true).into());
            assert!(covered(&point, &edge[0]));
            assert!(!covered(&point, &edge[1]));
        }
    }

    #[test]
    fn test_mismatched_identifier_fails_before_scan() {
        for package in packages() {
            let builder = RangeBuilder::new(package.as_ref());
            let lookup = Lookup::Ranges(vec![SeedRange::new("a", "b"), SeedRange::new("a", 5)]);
            assert!(matches!(builder.build(&lookup, KeySpace::ALL), Err(Error::InvalidRange(_))));
        }
    }

    #[test]
    fn test_empty_key_space_builds_nothing() {
        let none = KeySpace { entities: false, outgoing: false, incoming: false, undirected: false };
        for package in packages() {
            let builder = RangeBuilder::new(package.as_ref());
            let ranges = builder.build(&Lookup::Ranges(vec![SeedRange::new("a", "b")]), none).unwrap();
            assert!(ranges.is_empty());
        }
    }
}
