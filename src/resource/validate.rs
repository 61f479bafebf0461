//! Local validation of configuration attributes
//!
//! Each validator returns a message naming the offending attribute so that
//! errors surface before any request is sent.

use crate::error::{Error, Result};

fn invalid(attribute: &str, value: &str, rule: &str) -> Error {
    Error::Validation(format!("{} {:?} {}", attribute, value, rule))
}

fn check_length(attribute: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(invalid(
            attribute,
            value,
            &format!("must be between {} and {} characters", min, max),
        ));
    }
    Ok(())
}

/// 1-90 characters of letters, digits, `-`, `_`, `.`, `(`, `)`; may not end in `.`
pub fn resource_group_name(value: &str) -> Result<()> {
    check_length("resource_group_name", value, 1, 90)?;
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')'))
    {
        return Err(invalid(
            "resource_group_name",
            value,
            "may only contain alphanumerics, underscores, parentheses, hyphens and periods",
        ));
    }
    if value.ends_with('.') {
        return Err(invalid("resource_group_name", value, "cannot end in a period"));
    }
    Ok(())
}

/// 3-50 characters of ASCII letters, digits and `-`
pub fn iothub_name(value: &str) -> Result<()> {
    check_length("iothub_name", value, 3, 50)?;
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid(
            "iothub_name",
            value,
            "may only contain alphanumeric characters and dashes",
        ));
    }
    Ok(())
}

/// Names the IoT Hub reserves for its built-in endpoints
const RESERVED_ENDPOINT_NAMES: &[&str] = &["events", "operationsmonitoringevents", "filenotifications", "$default"];

pub fn endpoint_name(value: &str) -> Result<()> {
    check_length("endpoint_names", value, 1, 64)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "endpoint_names",
            value,
            "may only contain alphanumeric characters, periods, underscores and dashes",
        ));
    }
    // "events" is reserved for custom endpoints but may be routed to
    if value != "events" && RESERVED_ENDPOINT_NAMES.contains(&value.to_ascii_lowercase().as_str()) {
        return Err(invalid("endpoint_names", value, "is reserved"));
    }
    Ok(())
}

/// Route and enrichment names: 1-64 characters of letters, digits, `-`, `.`, `_`
pub fn route_name(attribute: &str, value: &str) -> Result<()> {
    check_length(attribute, value, 1, 64)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            attribute,
            value,
            "may only contain alphanumeric characters, periods, underscores and dashes",
        ));
    }
    Ok(())
}

pub fn consumer_group_name(value: &str) -> Result<()> {
    check_length("name", value, 1, 50)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "name",
            value,
            "may only contain alphanumeric characters, periods, underscores and dashes",
        ));
    }
    Ok(())
}

/// 3-63 characters, alphanumerics and hyphens, starting and ending with an alphanumeric
pub fn purview_account_name(value: &str) -> Result<()> {
    check_length("name", value, 3, 63)?;
    let alnum_edges = value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !alnum_edges || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid(
            "name",
            value,
            "may only contain letters, numbers and hyphens, and must start and end with a letter or number",
        ));
    }
    Ok(())
}

/// `Standard_<capacity>`, capacity being 1, 4 or 16; returns the capacity
pub fn purview_sku_name(value: &str) -> Result<i64> {
    let capacity = value
        .strip_prefix("Standard_")
        .and_then(|c| c.parse::<i64>().ok())
        .filter(|c| matches!(c, 1 | 4 | 16))
        .ok_or_else(|| invalid("sku_name", value, "must be one of Standard_1, Standard_4, Standard_16"))?;
    Ok(capacity)
}

/// `Company.Service` style namespace
pub fn provider_namespace(value: &str) -> Result<()> {
    let valid = value.split('.').count() >= 2
        && value
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()));
    if !valid {
        return Err(invalid(
            "name",
            value,
            "must be a resource provider namespace such as Microsoft.Devices",
        ));
    }
    Ok(())
}

pub fn non_empty(attribute: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", attribute)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_group_name() {
        assert!(resource_group_name("rg-1_(test).x").is_ok());
        assert!(resource_group_name("").is_err());
        assert!(resource_group_name("ends.").is_err());
        assert!(resource_group_name("has space").is_err());
        assert!(resource_group_name(&"a".repeat(91)).is_err());
    }

    #[test]
    fn test_iothub_name() {
        assert!(iothub_name("hub-01").is_ok());
        assert!(iothub_name("hu").is_err());
        assert!(iothub_name("hub_01").is_err());
    }

    #[test]
    fn test_endpoint_name() {
        assert!(endpoint_name("events").is_ok());
        assert!(endpoint_name("my.storage-endpoint").is_ok());
        assert!(endpoint_name("fileNotifications").is_err());
        assert!(endpoint_name("$default").is_err());
        assert!(endpoint_name("").is_err());
    }

    #[test]
    fn test_purview() {
        assert!(purview_account_name("acct-1").is_ok());
        assert!(purview_account_name("-acct").is_err());
        assert!(purview_account_name("ac").is_err());
        assert_eq!(purview_sku_name("Standard_4").unwrap(), 4);
        assert_eq!(purview_sku_name("Standard_16").unwrap(), 16);
        assert_eq!(purview_sku_name("Standard_1").unwrap(), 1);
        assert!(purview_sku_name("Standard_2").is_err());
        assert!(purview_sku_name("Basic_4").is_err());
    }

    #[test]
    fn test_provider_namespace() {
        assert!(provider_namespace("Microsoft.Devices").is_ok());
        assert!(provider_namespace("Microsoft").is_err());
        assert!(provider_namespace("Microsoft..Devices").is_err());
    }
}
