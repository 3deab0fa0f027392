//! Ad-hoc order search filters.
//!
//! A filter is a bag of optional dimensions; each present dimension compiles
//! to one predicate fragment and the fragments are AND-composed. Fragments
//! are data, not closures, so adapters can evaluate them in memory or
//! translate them to SQL `WHERE` clauses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_customers::CustomerId;

use crate::order::Order;
use crate::status::OrderStatus;

/// Optional-field search filter over orders.
///
/// Any subset of fields may be present. The builder itself does not
/// special-case emptiness; callers check [`OrderFilter::is_empty`] and route
/// empty filters to the unfiltered listing path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    pub customer_id: Option<CustomerId>,
    pub status: Option<OrderStatus>,
    pub min_order_date: Option<DateTime<Utc>>,
    pub max_order_date: Option<DateTime<Utc>>,
    /// Inclusive bounds, in smallest currency unit.
    pub min_amount: Option<u64>,
    pub max_amount: Option<u64>,
    pub shipping_country: Option<String>,
    pub shipping_city: Option<String>,
}

impl OrderFilter {
    pub fn has_customer_id(&self) -> bool {
        self.customer_id.is_some()
    }

    pub fn has_status(&self) -> bool {
        self.status.is_some()
    }

    pub fn has_order_date_range(&self) -> bool {
        self.min_order_date.is_some() || self.max_order_date.is_some()
    }

    pub fn has_amount_range(&self) -> bool {
        self.min_amount.is_some() || self.max_amount.is_some()
    }

    pub fn has_shipping_country(&self) -> bool {
        self.shipping_country
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    pub fn has_shipping_city(&self) -> bool {
        self.shipping_city
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        !self.has_customer_id()
            && !self.has_status()
            && !self.has_order_date_range()
            && !self.has_amount_range()
            && !self.has_shipping_country()
            && !self.has_shipping_city()
    }

    /// Compile the present dimensions into an AND-composed predicate.
    pub fn to_predicate(&self) -> OrderPredicate {
        let mut fragments = Vec::new();

        if let Some(customer_id) = self.customer_id {
            fragments.push(FilterFragment::CustomerEquals(customer_id));
        }
        if let Some(status) = self.status {
            fragments.push(FilterFragment::StatusEquals(status));
        }
        if let Some(min) = self.min_order_date {
            fragments.push(FilterFragment::OrderedOnOrAfter(min));
        }
        if let Some(max) = self.max_order_date {
            fragments.push(FilterFragment::OrderedOnOrBefore(max));
        }
        if let Some(min) = self.min_amount {
            fragments.push(FilterFragment::AmountAtLeast(min));
        }
        if let Some(max) = self.max_amount {
            fragments.push(FilterFragment::AmountAtMost(max));
        }
        if self.has_shipping_country() {
            let country = self.shipping_country.as_deref().unwrap_or_default();
            fragments.push(FilterFragment::CountryEquals(country.trim().to_lowercase()));
        }
        if self.has_shipping_city() {
            let city = self.shipping_city.as_deref().unwrap_or_default();
            fragments.push(FilterFragment::CityContains(city.trim().to_lowercase()));
        }

        OrderPredicate { fragments }
    }
}

/// One predicate dimension.
///
/// String payloads are pre-lowercased by [`OrderFilter::to_predicate`];
/// country is exact (case-insensitive) match, city is substring containment.
/// Date and amount comparisons are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterFragment {
    CustomerEquals(CustomerId),
    StatusEquals(OrderStatus),
    OrderedOnOrAfter(DateTime<Utc>),
    OrderedOnOrBefore(DateTime<Utc>),
    AmountAtLeast(u64),
    AmountAtMost(u64),
    CountryEquals(String),
    CityContains(String),
}

impl FilterFragment {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            FilterFragment::CustomerEquals(customer_id) => order.customer_id == *customer_id,
            FilterFragment::StatusEquals(status) => order.status == *status,
            FilterFragment::OrderedOnOrAfter(min) => order.order_date >= *min,
            FilterFragment::OrderedOnOrBefore(max) => order.order_date <= *max,
            FilterFragment::AmountAtLeast(min) => order.total_amount >= *min,
            FilterFragment::AmountAtMost(max) => order.total_amount <= *max,
            FilterFragment::CountryEquals(country) => {
                order.shipping.country.to_lowercase() == *country
            }
            FilterFragment::CityContains(city) => {
                order.shipping.city.to_lowercase().contains(city.as_str())
            }
        }
    }
}

/// AND-composition of filter fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPredicate {
    fragments: Vec<FilterFragment>,
}

impl OrderPredicate {
    pub fn fragments(&self) -> &[FilterFragment] {
        &self.fragments
    }

    /// Every fragment must hold; the empty predicate matches everything.
    pub fn matches(&self, order: &Order) -> bool {
        self.fragments.iter().all(|fragment| fragment.matches(order))
    }
}
