//! Filter admission: an AND of filters, each an OR of conditions.

use tracing::debug;

use fleet_contracts::{error::FleetResult, filter::Filter, record::Record};

use crate::condition::evaluate;

/// Whether any condition of `filter` holds for `record`.
///
/// A filter without conditions never holds. Evaluation stops at the first
/// condition that holds, so a malformed condition after it is not reported.
pub fn filter_holds(filter: &Filter, record: &dyn Record) -> FleetResult<bool> {
    for condition in &filter.conditions {
        if evaluate(condition, record)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether `record` passes every filter in `filters`.
///
/// An empty filter list admits everything.
pub fn admit(filters: &[Filter], record: &dyn Record) -> FleetResult<bool> {
    for (index, filter) in filters.iter().enumerate() {
        if !filter_holds(filter, record)? {
            debug!(
                record = record.type_name(),
                filter = index,
                "record rejected by filter"
            );
            return Ok(false);
        }
    }
    Ok(true)
}
