//! Asset filters derived from named queries.

use std::cmp::Ordering;
use tessera_core::{Asset, OrderDirection, QueryMapping, QueryOrder};

/// Concrete filter handed to [`crate::AssetRepo::assets_matching`].
///
/// Every `Some` field must match exactly; `None` fields do not filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetQuery {
    pub customer: u32,
    pub space: Option<u32>,
    pub string1: Option<String>,
    pub string2: Option<String>,
    pub string3: Option<String>,
    pub number1: Option<i64>,
    pub number2: Option<i64>,
    pub number3: Option<i64>,
    pub ordering: Vec<QueryOrder>,
}

impl AssetQuery {
    pub fn for_customer(customer: u32) -> Self {
        Self {
            customer,
            ..Self::default()
        }
    }

    /// Whether `asset` passes every filter. Not-for-delivery assets never match.
    pub fn matches(&self, asset: &Asset) -> bool {
        fn eq<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
            want.as_ref().is_none_or(|w| have.as_ref() == Some(w))
        }

        !asset.not_for_delivery
            && asset.id.customer() == self.customer
            && self.space.is_none_or(|s| asset.id.space() == s)
            && eq(&self.string1, &asset.string1)
            && eq(&self.string2, &asset.string2)
            && eq(&self.string3, &asset.string3)
            && eq(&self.number1, &asset.number1)
            && eq(&self.number2, &asset.number2)
            && eq(&self.number3, &asset.number3)
    }

    /// Compare two assets by the query ordering, then by asset id ascending.
    pub fn compare(&self, a: &Asset, b: &Asset) -> Ordering {
        self.ordering
            .iter()
            .map(|order| {
                let ordering = compare_field(order.mapping, a, b);
                match order.direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or_else(|| compare_ids(a, b))
    }

    /// Sort assets in place by [`AssetQuery::compare`].
    pub fn sort(&self, assets: &mut [Asset]) {
        assets.sort_by(|a, b| self.compare(a, b));
    }
}

fn compare_field(mapping: QueryMapping, a: &Asset, b: &Asset) -> Ordering {
    match mapping {
        QueryMapping::String1 => a.string1.cmp(&b.string1),
        QueryMapping::String2 => a.string2.cmp(&b.string2),
        QueryMapping::String3 => a.string3.cmp(&b.string3),
        QueryMapping::Number1 => a.number1.cmp(&b.number1),
        QueryMapping::Number2 => a.number2.cmp(&b.number2),
        QueryMapping::Number3 => a.number3.cmp(&b.number3),
        QueryMapping::Unset => Ordering::Equal,
    }
}

fn compare_ids(a: &Asset, b: &Asset) -> Ordering {
    (a.id.customer(), a.id.space(), a.id.name()).cmp(&(b.id.customer(), b.id.space(), b.id.name()))
}
