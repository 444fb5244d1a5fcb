//! Host identifier to script name mapping
//!
//! Maps the host-side member names recorded in a registration table to the
//! names scripts see: snake_cased fields, lowercased camelCase methods, with
//! a fixed exception table for common initialisms and a reserved `X` prefix
//! marking constructors.

/// Field names that bypass the default snake_case rule
const FIELD_NAME_EXCEPTIONS: &[(&str, &str)] = &[("OCSP", "ocsp")];

/// Method names that bypass the default lowercase-first rule
const METHOD_NAME_EXCEPTIONS: &[(&str, &str)] = &[
    ("JSON", "json"),
    ("HTML", "html"),
    ("URL", "url"),
    ("OCSP", "ocsp"),
];

/// Reserved prefix marking a method as script-constructible
const CONSTRUCTOR_PREFIX: char = 'X';

/// Returns the script name for an exported field, or `None` when the field
/// must not be exported.
///
/// An identifier starting with a lowercase letter is host-private and maps
/// to `None`. An explicit `tag` overrides the default name; the literal
/// `"-"` hides the field. Otherwise the name is snake_cased with respect
/// for common initialisms (`URL`, `ID`, `HTTP`, ...).
pub fn field_name(ident: &str, tag: Option<&str>) -> Option<String> {
    let first = ident.chars().next()?;
    if !first.is_uppercase() {
        return None;
    }

    if let Some(tag) = tag {
        if tag == "-" {
            return None;
        }
        return Some(tag.to_string());
    }

    if let Some((_, exception)) = FIELD_NAME_EXCEPTIONS.iter().find(|(k, _)| *k == ident) {
        return Some((*exception).to_string());
    }

    Some(camel_to_snake(ident))
}

/// Returns the script name for an exported method.
///
/// A name beginning with `X` is a constructor and just gets the prefix
/// stripped; see [`is_constructor`]. Otherwise the first character is
/// lowercased and the rest is unaltered, exception table permitting.
pub fn method_name(ident: &str) -> String {
    if let Some(stripped) = strip_constructor_prefix(ident) {
        return stripped.to_string();
    }

    if let Some((_, exception)) = METHOD_NAME_EXCEPTIONS.iter().find(|(k, _)| *k == ident) {
        return (*exception).to_string();
    }

    let mut chars = ident.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// True when `ident` carries the reserved constructor marker
pub fn is_constructor(ident: &str) -> bool {
    strip_constructor_prefix(ident).is_some()
}

fn strip_constructor_prefix(ident: &str) -> Option<&str> {
    let rest = ident.strip_prefix(CONSTRUCTOR_PREFIX)?;
    // A bare "X" is not a marker, and the remainder must itself look like
    // an exported identifier.
    if rest.chars().next().is_some_and(|c| c.is_uppercase()) {
        Some(rest)
    } else {
        None
    }
}

/// CamelCase to snake_case, treating consecutive capitals as one word
fn camel_to_snake(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let boundary = match i.checked_sub(1).map(|j| chars[j]) {
                None => false,
                Some(prev) if prev.is_lowercase() || prev.is_ascii_digit() => true,
                Some(prev) if prev.is_uppercase() => {
                    chars.get(i + 1).is_some_and(|n| n.is_lowercase())
                }
                Some(_) => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_name_defaults() {
        assert_eq!(field_name("SomeField", None).as_deref(), Some("some_field"));
        assert_eq!(field_name("URL", None).as_deref(), Some("url"));
        assert_eq!(field_name("TLSVersion", None).as_deref(), Some("tls_version"));
        assert_eq!(field_name("HTTPRequestID", None).as_deref(), Some("http_request_id"));
        assert_eq!(field_name("ID", None).as_deref(), Some("id"));
    }

    #[test]
    fn test_field_name_exceptions() {
        assert_eq!(field_name("OCSP", None).as_deref(), Some("ocsp"));
    }

    #[test]
    fn test_field_name_private() {
        assert_eq!(field_name("someField", None), None);
        assert_eq!(field_name("_hidden", None), None);
    }

    #[test]
    fn test_field_name_tags() {
        assert_eq!(field_name("SomeField", Some("custom")).as_deref(), Some("custom"));
        assert_eq!(field_name("SomeField", Some("-")), None);
        // The tag wins over the exception table.
        assert_eq!(field_name("OCSP", Some("ocspStatus")).as_deref(), Some("ocspStatus"));
    }

    #[test]
    fn test_method_name_defaults() {
        assert_eq!(method_name("Add"), "add");
        assert_eq!(method_name("DoThing"), "doThing");
        assert_eq!(method_name("Lookup"), "lookup");
    }

    #[test]
    fn test_method_name_exceptions() {
        assert_eq!(method_name("JSON"), "json");
        assert_eq!(method_name("HTML"), "html");
        assert_eq!(method_name("URL"), "url");
        assert_eq!(method_name("OCSP"), "ocsp");
    }

    #[test]
    fn test_constructor_marker() {
        assert!(is_constructor("XSharedArray"));
        assert_eq!(method_name("XSharedArray"), "SharedArray");
        // The marker is checked before the exception table.
        assert_eq!(method_name("XURL"), "URL");
    }

    #[test]
    fn test_constructor_marker_requires_exported_remainder() {
        assert!(!is_constructor("X"));
        assert!(!is_constructor("Xavier"));
        assert_eq!(method_name("Xavier"), "xavier");
        assert_eq!(method_name("X"), "x");
    }
}
