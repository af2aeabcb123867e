//! Scalar encoding of an image list as stored in the `products.images` column.
//!
//! The column holds the URLs joined with [`DELIMITER`]. URLs containing the
//! delimiter cannot round-trip; [`encode`] rejects them instead of writing a
//! value that would decode to a different list.

use crate::models::object_ref::ObjectRef;
use thiserror::Error;

/// Separator between URLs in the persisted column.
pub const DELIMITER: char = ',';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("image url `{0}` contains the list delimiter `,`")]
    DelimiterInUrl(String),
    #[error("image url must not be empty")]
    EmptyUrl,
}

/// Join the URLs of `refs` into the persisted scalar.
pub fn encode(refs: &[ObjectRef]) -> Result<String, CodecError> {
    let mut out = String::new();
    for (idx, r) in refs.iter().enumerate() {
        let url = r.url();
        if url.is_empty() {
            return Err(CodecError::EmptyUrl);
        }
        if url.contains(DELIMITER) {
            return Err(CodecError::DelimiterInUrl(url.to_string()));
        }
        if idx > 0 {
            out.push(DELIMITER);
        }
        out.push_str(url);
    }
    Ok(out)
}

/// Split a persisted scalar back into an ordered list.
///
/// `None` and the empty string both decode to an empty list.
pub fn decode(raw: Option<&str>) -> Vec<ObjectRef> {
    match raw {
        None => Vec::new(),
        Some("") => Vec::new(),
        Some(value) => value
            .split(DELIMITER)
            .filter(|part| !part.is_empty())
            .map(ObjectRef::new)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn refs(urls: &[&str]) -> Vec<ObjectRef> {
        urls.iter().copied().map(ObjectRef::new).collect()
    }

    #[test]
    fn decode_of_missing_or_empty_is_empty() {
        assert!(decode(None).is_empty());
        assert!(decode(Some("")).is_empty());
    }

    #[test]
    fn round_trip_preserves_order_and_duplicates() {
        let xs = refs(&[
            "https://cdn.test/product_images/b.jpg",
            "https://cdn.test/product_images/a.png",
            "https://cdn.test/product_images/b.jpg",
        ]);
        let encoded = encode(&xs).unwrap();
        assert_eq!(decode(Some(&encoded)), xs);
    }

    proptest! {
        #[test]
        fn round_trip_for_delimiter_free_urls(
            urls in proptest::collection::vec("[^,]{1,48}", 0..12)
        ) {
            let xs: Vec<ObjectRef> = urls.into_iter().map(ObjectRef::new).collect();
            let encoded = encode(&xs).unwrap();
            prop_assert_eq!(decode(Some(&encoded)), xs);
        }
    }

    #[test]
    fn encode_joins_with_comma() {
        assert_eq!(encode(&refs(&["urlA", "urlB"])).unwrap(), "urlA,urlB");
        assert_eq!(encode(&[]).unwrap(), "");
    }

    #[test]
    fn encode_rejects_delimiter_in_url() {
        let err = encode(&refs(&["https://cdn.test/a,b.jpg"])).unwrap_err();
        assert_eq!(
            err,
            CodecError::DelimiterInUrl("https://cdn.test/a,b.jpg".into())
        );
    }

    #[test]
    fn encode_rejects_empty_url() {
        assert_eq!(encode(&refs(&[""])).unwrap_err(), CodecError::EmptyUrl);
    }
}
