//! Resource ID codec
//!
//! ARM resource IDs are slash-delimited `label/value` pairs such as
//! `/subscriptions/{id}/resourceGroups/{name}/providers/Microsoft.Devices/IotHubs/{name}`.
//! Each typed ID declares its ordered segment layout once with
//! [`resource_id!`](crate::resource_id); formatting and parsing are both
//! driven from that layout so the two directions cannot drift apart.
//!
//! Parsing is strict: labels must match exactly (case included), every value
//! must be non-empty, and nothing may follow the last expected segment.

use crate::error::{Error, Result};
use std::fmt;

/// One `label/value` pair of an ID layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// A label followed by a caller-supplied value
    Label(&'static str),
    /// A label followed by a fixed value, e.g. `providers/Microsoft.Devices`
    Fixed(&'static str, &'static str),
}

impl Segment {
    pub fn label(&self) -> &'static str {
        match self {
            Segment::Label(label) | Segment::Fixed(label, _) => label,
        }
    }
}

/// A typed, immutable ARM resource ID
pub trait ResourceId: Sized + fmt::Display {
    /// Ordered segment layout for this ID type
    const SEGMENTS: &'static [Segment];

    /// Human readable name used in error messages
    const KIND: &'static str;

    /// Values of the [`Segment::Label`] segments, in layout order
    fn values(&self) -> Vec<&str>;

    /// Build the ID from parsed values, in layout order
    fn from_values(values: Vec<String>) -> Self;

    /// Canonical ID string
    fn id(&self) -> String {
        format_segments(Self::SEGMENTS, &self.values(), false)
    }

    /// ID with each value percent-encoded, for use as a request path
    fn to_url_path(&self) -> String {
        format_segments(Self::SEGMENTS, &self.values(), true)
    }

    /// Parse and validate a persisted ID string
    fn parse(input: &str) -> Result<Self> {
        parse_segments(input, Self::SEGMENTS)
            .map(Self::from_values)
            .map_err(|e| match e {
                Error::MalformedIdentifier { input, reason } => Error::MalformedIdentifier {
                    input,
                    reason: format!("parsing {} ID: {}", Self::KIND, reason),
                },
                other => other,
            })
    }
}

/// Render a segment layout with the given values
///
/// `values` must hold one entry per [`Segment::Label`] in `segments`.
pub fn format_segments(segments: &[Segment], values: &[&str], encode: bool) -> String {
    let mut out = String::new();
    let mut values = values.iter();

    for segment in segments {
        let value = match segment {
            Segment::Label(_) => values.next().copied().unwrap_or_default(),
            Segment::Fixed(_, value) => value,
        };
        out.push('/');
        out.push_str(segment.label());
        out.push('/');
        if encode {
            out.push_str(&urlencoding::encode(value));
        } else {
            out.push_str(value);
        }
    }

    out
}

/// Split `input` against a segment layout, returning the label values in order
pub fn parse_segments(input: &str, segments: &[Segment]) -> Result<Vec<String>> {
    if input.is_empty() {
        return Err(Error::malformed(input, "ID was empty"));
    }

    let mut parts = input.split('/');
    if parts.next() != Some("") {
        return Err(Error::malformed(input, "ID must start with '/'"));
    }

    let mut values = Vec::new();
    for segment in segments {
        let label = segment.label();
        match parts.next() {
            None | Some("") => {
                return Err(Error::malformed(
                    input,
                    format!("ID was missing the '{}' element", label),
                ));
            }
            Some(actual) if actual != label => {
                return Err(Error::malformed(
                    input,
                    format!("expected the '{}' element but found '{}'", label, actual),
                ));
            }
            Some(_) => {}
        }

        let value = match parts.next() {
            Some(value) if !value.is_empty() => value,
            _ => {
                return Err(Error::malformed(
                    input,
                    format!("ID was missing a value for the '{}' element", label),
                ));
            }
        };

        match segment {
            Segment::Fixed(_, expected) if value != *expected => {
                return Err(Error::malformed(
                    input,
                    format!("expected '{}' to be '{}' but found '{}'", label, expected, value),
                ));
            }
            Segment::Fixed(..) => {}
            Segment::Label(_) => values.push(value.to_string()),
        }
    }

    if let Some(extra) = parts.next() {
        let reason = if extra.is_empty() {
            "ID has a trailing '/'".to_string()
        } else {
            format!("unexpected segment '{}' after the last element", extra)
        };
        return Err(Error::malformed(input, reason));
    }

    Ok(values)
}

/// Declare a typed resource ID
///
/// ```ignore
/// resource_id! {
///     /// An IoT Hub
///     pub struct IotHubId("IotHub") {
///         "subscriptions" => subscription_id,
///         "resourceGroups" => resource_group,
///         "providers" = "Microsoft.Devices",
///         "IotHubs" => name,
///     }
/// }
/// ```
#[macro_export]
macro_rules! resource_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($kind:literal) {
            $( $label:literal $( => $field:ident )? $( = $fixed:literal )? ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            $( $( pub $field: String, )? )+
        }

        impl $name {
            #[allow(clippy::too_many_arguments)]
            pub fn new($( $( $field: impl Into<String>, )? )+) -> Self {
                Self {
                    $( $( $field: $field.into(), )? )+
                }
            }
        }

        impl $crate::resourceid::ResourceId for $name {
            const SEGMENTS: &'static [$crate::resourceid::Segment] = &[
                $( $crate::resource_id!(@segment $label $( => $field )? $( = $fixed )?) ),+
            ];

            const KIND: &'static str = $kind;

            fn values(&self) -> Vec<&str> {
                vec![$( $( self.$field.as_str(), )? )+]
            }

            fn from_values(values: Vec<String>) -> Self {
                let mut values = values.into_iter();
                Self {
                    $( $( $field: values.next().unwrap_or_default(), )? )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&$crate::resourceid::ResourceId::id(self))
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::Error;

            fn from_str(s: &str) -> $crate::error::Result<Self> {
                <Self as $crate::resourceid::ResourceId>::parse(s)
            }
        }
    };

    (@segment $label:literal => $field:ident) => {
        $crate::resourceid::Segment::Label($label)
    };
    (@segment $label:literal = $fixed:literal) => {
        $crate::resourceid::Segment::Fixed($label, $fixed)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::resource_id! {
        /// Test-only ID with a fixed provider namespace
        pub struct WidgetId("Widget") {
            "subscriptions" => subscription_id,
            "resourceGroups" => resource_group,
            "providers" = "Contoso.Widgets",
            "widgets" => name,
        }
    }

    const VALID: &str =
        "/subscriptions/12345678-1234-9876-4563-123456789012/resourceGroups/resGroup1/providers/Contoso.Widgets/widgets/widget1";

    #[test]
    fn test_format() {
        let id = WidgetId::new("12345678-1234-9876-4563-123456789012", "resGroup1", "widget1");
        assert_eq!(id.id(), VALID);
        assert_eq!(id.to_string(), VALID);
    }

    #[test]
    fn test_parse_valid() {
        let id = WidgetId::parse(VALID).expect("valid ID");
        assert_eq!(id.subscription_id, "12345678-1234-9876-4563-123456789012");
        assert_eq!(id.resource_group, "resGroup1");
        assert_eq!(id.name, "widget1");
    }

    #[test]
    fn test_parse_table() {
        let cases = [
            ("", true),
            ("/", true),
            ("subscriptions/123/resourceGroups/rg/providers/Contoso.Widgets/widgets/w", true),
            ("/subscriptions/", true),
            ("/subscriptions/123/", true),
            ("/subscriptions/123/resourceGroups/", true),
            ("/subscriptions/123/resourceGroups/rg/providers/Contoso.Widgets/", true),
            ("/subscriptions/123/resourceGroups/rg/providers/Contoso.Widgets/widgets/", true),
            ("/subscriptions/123/resourceGroups/rg/providers/Other.Widgets/widgets/w", true),
            ("/subscriptions/123/resourceGroups/rg/providers/Contoso.Widgets/widgets/w/", true),
            ("/subscriptions/123/resourceGroups/rg/providers/Contoso.Widgets/widgets/w/extra/x", true),
            ("/subscriptions/123/resourcegroups/rg/providers/Contoso.Widgets/widgets/w", true),
            ("/subscriptions/123/resourceGroups/rg/providers/Contoso.Widgets/widgets/w", false),
        ];

        for (input, expect_error) in cases {
            let result = WidgetId::parse(input);
            assert_eq!(result.is_err(), expect_error, "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_rejects_upper_cased() {
        let err = WidgetId::parse(&VALID.to_uppercase()).unwrap_err();
        assert!(matches!(err, Error::MalformedIdentifier { .. }));
    }

    #[test]
    fn test_error_mentions_kind_and_label() {
        let err = WidgetId::parse("/subscriptions/123/").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Widget"));
        assert!(message.contains("resourceGroups"));
    }

    #[test]
    fn test_url_path_encodes_values() {
        let id = WidgetId::new("sub", "my group", "w#1");
        assert_eq!(
            id.to_url_path(),
            "/subscriptions/sub/resourceGroups/my%20group/providers/Contoso.Widgets/widgets/w%231"
        );
        // the persisted form stays unencoded
        assert_eq!(WidgetId::parse(&id.id()).unwrap(), id);
    }

    #[test]
    fn test_from_str() {
        let id: WidgetId = VALID.parse().expect("valid ID");
        assert_eq!(id.name, "widget1");
    }
}
