//! URI template compilation.
//!
//! A template such as `/{user_id}/things` is split on `/` into an ordered
//! list of segments. Each segment is either literal text or a `{name}`
//! parameter whose name is an identifier (`[A-Za-z_][A-Za-z0-9_]*`).
//!
//! `/` on its own is the root template and has no segments.

use std::collections::HashSet;
use std::fmt;

use crate::error::TemplateError;

/// One `/`-separated piece of a template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed route template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UriTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Compiles `template`, rejecting empty segments, malformed parameter
    /// syntax and repeated parameter names.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let Some(rest) = template.strip_prefix('/') else {
            return Err(TemplateError::MissingLeadingSlash {
                template: template.to_owned(),
            });
        };

        let mut segments = Vec::new();
        let mut seen = HashSet::new();

        if !rest.is_empty() {
            for raw in rest.split('/') {
                let segment = parse_segment(template, raw)?;
                if let Segment::Param(name) = &segment {
                    if !seen.insert(name.clone()) {
                        return Err(TemplateError::DuplicateParam {
                            template: template.to_owned(),
                            name: name.clone(),
                        });
                    }
                }
                segments.push(segment);
            }
        }

        Ok(Self {
            source: template.to_owned(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_segment(template: &str, raw: &str) -> Result<Segment, TemplateError> {
    if raw.is_empty() {
        return Err(TemplateError::EmptySegment {
            template: template.to_owned(),
        });
    }

    let malformed = || TemplateError::MalformedParam {
        template: template.to_owned(),
        segment: raw.to_owned(),
    };

    if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        if !is_identifier(inner) {
            return Err(malformed());
        }
        return Ok(Segment::Param(inner.to_owned()));
    }

    // Braces anywhere else mean a half-written or embedded parameter.
    if raw.contains(['{', '}']) {
        return Err(malformed());
    }
    Ok(Segment::Literal(raw.to_owned()))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Segment {
        Segment::Literal(s.to_owned())
    }

    fn param(s: &str) -> Segment {
        Segment::Param(s.to_owned())
    }

    #[test]
    fn test_parses_literals_and_params() {
        let t = UriTemplate::parse("/{user_id}/things").unwrap();
        assert_eq!(t.segments(), [param("user_id"), lit("things")]);
        assert_eq!(t.param_names().collect::<Vec<_>>(), ["user_id"]);
        assert_eq!(t.to_string(), "/{user_id}/things");
    }

    #[test]
    fn test_root_has_no_segments() {
        assert!(UriTemplate::parse("/").unwrap().segments().is_empty());
    }

    #[test]
    fn test_rejects_missing_slash() {
        assert!(matches!(
            UriTemplate::parse("things"),
            Err(TemplateError::MissingLeadingSlash { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_segments() {
        for bad in ["//things", "/things/", "/a//b"] {
            assert!(
                matches!(UriTemplate::parse(bad), Err(TemplateError::EmptySegment { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_malformed_params() {
        for bad in ["/{}", "/{1st}", "/{a-b}", "/x{id}", "/{id", "/id}", "/{{id}}"] {
            assert!(
                matches!(UriTemplate::parse(bad), Err(TemplateError::MalformedParam { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_duplicate_param_names() {
        let err = UriTemplate::parse("/{id}/children/{id}").unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateParam { ref name, .. } if name == "id"));
    }
}
