//! Query criteria algebra
//!
//! A closed, validated predicate grammar for describing which records a
//! repository should return:
//!
//! - [`Filter`]: a single `field operator value` predicate
//! - [`Filters`]: an ordered, AND-ed collection of filters
//! - [`Order`]: sort fields and direction, with an explicit "no ordering" state
//! - [`Criteria`]: filters, order, pagination and OR-ed alternative branches
//!
//! Criteria values are immutable once shared and cheap to derive from with
//! [`Criteria::copy_with`].
//!
//! # Example
//!
//! ```rust
//! use acton_criteria::criteria::{Criteria, Filter, Filters, Order};
//!
//! let criteria = Criteria::new(
//!     Filters::new(vec![
//!         Filter::eq("status", "active").unwrap(),
//!         Filter::is_in("role", vec!["admin", "editor"]).unwrap(),
//!     ]),
//!     Order::desc("created_at").unwrap(),
//! )
//! .with_limit(20);
//!
//! assert!(criteria.has_filter("role"));
//! assert_eq!(criteria.limit(), Some(20));
//! ```

mod composite;
mod error;
mod evaluate;
mod filter;
mod filters;
mod order;
mod request;

pub use composite::{Criteria, CriteriaOverrides};
pub use error::{CriteriaError, CriteriaResult};
pub use evaluate::{compare_records, compare_values};
pub use filter::{Filter, FilterField, FilterInput, FilterOperator, FilterValue};
pub use filters::Filters;
pub use order::{Order, OrderBy, OrderType};
pub use request::CriteriaRequest;
