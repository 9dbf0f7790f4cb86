//! Builders that derive probe requests from a crawled request.
//!
//! A builder knows which injection point of the request it targets. Any method
//! may return `None` to say "not applicable here"; that is never an error.

use crate::http::Request;
use url::{Url, form_urlencoded};

/// Produces the template request and its altered variants for one injection point.
pub trait RequestBuilder: Send + Sync {
    /// The unmodified template request.
    fn basic_request(&self) -> Option<Request>;

    /// The template with the injection point's value replaced by (or, with
    /// `append`, suffixed with) `value`.
    fn altered_request(&self, value: &str, append: bool) -> Option<Request>;

    /// The template with the injection point's parameter renamed to `name`.
    fn altered_parameter_name_request(&self, name: &str) -> Option<Request>;
}

/// Targets one query parameter, by position, of a base request.
#[derive(Debug, Clone)]
pub struct ParameterRequestBuilder {
    base: Request,
    index: usize,
}

impl ParameterRequestBuilder {
    pub fn new(base: Request, index: usize) -> Self {
        ParameterRequestBuilder { base, index }
    }

    /// One builder per query parameter of `base`, in order.
    pub fn for_each_parameter(base: &Request) -> Vec<Self> {
        (0..base.url.query_pairs().count())
            .map(|index| Self::new(base.clone(), index))
            .collect()
    }

    /// The name of the targeted parameter, if it exists.
    pub fn parameter_name(&self) -> Option<String> {
        self.base
            .url
            .query_pairs()
            .nth(self.index)
            .map(|(name, _)| name.into_owned())
    }

    /// Re-encodes only the targeted pair; the rest of the raw query is kept verbatim.
    fn rewrite<F>(&self, alter: F) -> Option<Request>
    where
        F: FnOnce(&mut (String, String)),
    {
        let query = self.base.url.query()?;
        let mut segments: Vec<&str> = query.split('&').collect();
        // Empty segments hold no pair, as in `query_pairs`.
        let (position, _) = segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| !segment.is_empty())
            .nth(self.index)?;

        let mut pair = form_urlencoded::parse(segments[position].as_bytes())
            .next()
            .map(|(name, value)| (name.into_owned(), value.into_owned()))?;
        alter(&mut pair);
        let encoded = form_urlencoded::Serializer::new(String::new())
            .append_pair(&pair.0, &pair.1)
            .finish();
        segments[position] = &encoded;

        let mut request = self.base.clone();
        request.url.set_query(Some(&segments.join("&")));
        Some(request)
    }
}

impl RequestBuilder for ParameterRequestBuilder {
    fn basic_request(&self) -> Option<Request> {
        Some(self.base.clone())
    }

    fn altered_request(&self, value: &str, append: bool) -> Option<Request> {
        self.rewrite(|(_, current)| {
            if append {
                current.push_str(value);
            } else {
                *current = value.to_string();
            }
        })
    }

    fn altered_parameter_name_request(&self, name: &str) -> Option<Request> {
        self.rewrite(|(current, _)| *current = name.to_string())
    }
}

/// Targets the last path segment of a base request.
#[derive(Debug, Clone)]
pub struct PathRequestBuilder {
    base: Request,
}

impl PathRequestBuilder {
    pub fn new(base: Request) -> Self {
        PathRequestBuilder { base }
    }

    fn last_segment(url: &Url) -> Option<String> {
        url.path_segments()?.last().map(str::to_string)
    }
}

impl RequestBuilder for PathRequestBuilder {
    fn basic_request(&self) -> Option<Request> {
        Some(self.base.clone())
    }

    fn altered_request(&self, value: &str, append: bool) -> Option<Request> {
        let current = Self::last_segment(&self.base.url)?;
        let replacement = if append {
            format!("{}{}", current, value)
        } else {
            value.to_string()
        };

        let mut request = self.base.clone();
        {
            let mut segments = request.url.path_segments_mut().ok()?;
            segments.pop().push(&replacement);
        }
        Some(request)
    }

    fn altered_parameter_name_request(&self, _name: &str) -> Option<Request> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Request {
        Request::get(Url::parse("http://example.com/shop/item.php?id=5&sort=asc").unwrap())
    }

    #[test]
    fn test_parameter_value_replace_and_append() {
        let builder = ParameterRequestBuilder::new(base(), 0);
        assert_eq!(builder.parameter_name().as_deref(), Some("id"));

        let replaced = builder.altered_request("7", false).unwrap();
        assert_eq!(replaced.url.query(), Some("id=7&sort=asc"));

        let appended = builder.altered_request("'", true).unwrap();
        let pairs: Vec<_> = appended.url.query_pairs().collect();
        assert_eq!(pairs[0].1, "5'");
        assert_eq!(pairs[1].1, "asc");
    }

    #[test]
    fn test_untargeted_parameters_keep_their_encoding() {
        let base = Request::get(Url::parse("http://example.com/?flag&q=a%20b&&id=1").unwrap());

        let value = ParameterRequestBuilder::new(base.clone(), 2)
            .altered_request("9", false)
            .unwrap();
        assert_eq!(value.url.query(), Some("flag&q=a%20b&&id=9"));

        let name = ParameterRequestBuilder::new(base, 0)
            .altered_parameter_name_request("debug")
            .unwrap();
        assert_eq!(name.url.query(), Some("debug=&q=a%20b&&id=1"));
    }

    #[test]
    fn test_parameter_name_alteration() {
        let builder = ParameterRequestBuilder::new(base(), 1);
        let renamed = builder.altered_parameter_name_request("order").unwrap();
        assert_eq!(renamed.url.query(), Some("id=5&order=asc"));
    }

    #[test]
    fn test_missing_parameter_is_not_applicable() {
        let builder = ParameterRequestBuilder::new(base(), 5);
        assert!(builder.altered_request("x", false).is_none());
        assert!(builder.altered_parameter_name_request("x").is_none());
        assert!(builder.basic_request().is_some());
        assert_eq!(ParameterRequestBuilder::for_each_parameter(&base()).len(), 2);
    }

    #[test]
    fn test_path_builder_alters_last_segment() {
        let builder = PathRequestBuilder::new(base());
        let replaced = builder.altered_request("admin", false).unwrap();
        assert_eq!(replaced.url.path(), "/shop/admin");
        assert_eq!(replaced.url.query(), Some("id=5&sort=asc"));

        let appended = builder.altered_request(".bak", true).unwrap();
        assert_eq!(appended.url.path(), "/shop/item.php.bak");

        assert!(builder.altered_parameter_name_request("x").is_none());
    }
}
