//! Linode resource reconcilers.
//!
//! Each reconciler maps one API entity onto a flat attribute model:
//! - `expand` turns a planned state into API request options
//! - `flatten` turns an API response into state
//!
//! Empty strings and empty lists from the API flatten to null for optional
//! attributes, so an unset attribute reads back the way it was configured.

mod domain;
mod domain_record;
mod firewall;
mod firewall_device;
mod instance_ip;
mod reserved_ip;

pub use domain::DomainResource;
pub use domain_record::DomainRecordResource;
pub use firewall::FirewallResource;
pub use firewall_device::FirewallDeviceResource;
pub use instance_ip::InstanceIpResource;
pub use reserved_ip::ReservedIpResource;

use anyhow::Result;
use chrono::NaiveDateTime;
use linode_api::types::format_time;
use reconcile::Value;

/// A string attribute that is null when empty.
pub(crate) fn opt_string(s: &str) -> Value {
    if s.is_empty() {
        Value::Null
    } else {
        Value::from(s)
    }
}

/// A string set attribute that is null when empty.
pub(crate) fn opt_string_set(items: &[String]) -> Value {
    if items.is_empty() {
        Value::Null
    } else {
        Value::string_set(items.iter().cloned())
    }
}

/// An API timestamp as a string attribute.
pub(crate) fn timestamp(time: Option<&NaiveDateTime>) -> Value {
    time.map_or(Value::Null, |t| Value::from(format_time(t)))
}

/// Map a 404 to `None`.
pub(crate) fn found<T>(result: linode_api::Result<T>) -> linode_api::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Treat a 404 on delete as success.
pub(crate) fn deleted(result: linode_api::Result<()>, what: &str) -> Result<()> {
    match found(result)? {
        Some(()) => Ok(()),
        None => {
            log::info!("{what} was already deleted");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linode_api::Error;

    #[test]
    fn test_opt_helpers() {
        assert_eq!(opt_string(""), Value::Null);
        assert_eq!(opt_string("x"), Value::from("x"));
        assert_eq!(opt_string_set(&[]), Value::Null);
        assert_eq!(
            opt_string_set(&["b".to_string(), "a".to_string()]),
            Value::string_set(["a", "b"])
        );
    }

    #[test]
    fn test_found_and_deleted() {
        assert_eq!(found(Ok(1)).unwrap(), Some(1));
        assert_eq!(found::<i32>(Err(Error::not_found())).unwrap(), None);
        assert!(found::<i32>(Err(Error::api(500, Vec::new()))).is_err());
        assert!(deleted(Err(Error::not_found()), "domain 1").is_ok());
        assert!(deleted(Err(Error::api(403, Vec::new())), "domain 1").is_err());
    }
}
