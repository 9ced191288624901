//! Flux query construction.
//!
//! Values are embedded as double-quoted literals without escaping. Keys are
//! expected to come from trusted pipeline definitions, not end users.

use crate::uri::QueryDescriptor;

/// Build the Flux query for a descriptor: range, measurement, optional field,
/// then one equality filter per tag in parse order.
pub fn build_flux_query(desc: &QueryDescriptor) -> String {
    let mut query = format!(
        r#"from(bucket:"{}") |> range(start: {}) |> filter(fn: (r) => r._measurement == "{}")"#,
        desc.bucket, desc.time_range, desc.measurement
    );

    if let Some(field) = &desc.field_filter {
        query.push_str(&format!(r#" |> filter(fn: (r) => r._field == "{}")"#, field));
    }

    for (key, value) in &desc.tag_filters {
        query.push_str(&format!(r#" |> filter(fn: (r) => r.{} == "{}")"#, key, value));
    }

    query
}
