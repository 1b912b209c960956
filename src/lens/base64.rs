//! The `base64` lens.
//!
//! Base64 content has no structure of its own, so the only valid pointer is
//! `/`: the whole decoded payload is handed to the inner replacer and the
//! result re-encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Error, Result};
use crate::lens::Setter;

pub fn apply(src: &str, setters: &mut [Setter]) -> Result<String> {
    let decoded = STANDARD
        .decode(src.trim())
        .map_err(|e| Error::parse(format!("bad base64: {e}")))?;
    let mut content = String::from_utf8(decoded)
        .map_err(|e| Error::parse(format!("base64 payload is not UTF-8: {e}")))?;

    for setter in setters.iter_mut() {
        if setter.pointer != "/" {
            return Err(Error::syntax(format!(
                "base64 lens has no structure, invalid pointer {:?}",
                setter.pointer
            )));
        }
        content = setter.value.transform(&content)?;
    }

    Ok(STANDARD.encode(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::lens::{self, Mapping};

    #[test]
    fn replaces_whole_payload() {
        let got = lens::apply("foo: YmFy", vec![Mapping::new("/foo/~(base64)", "baz")]).unwrap();
        assert_eq!(got, "foo: YmF6");
    }

    #[test]
    fn yaml_inside_base64() {
        let got = lens::apply(
            "foo: Zm9vOiBhCmJhcjogYgo=",
            vec![Mapping::new("/foo/~(base64)/~(yaml)/foo", "A")],
        )
        .unwrap();
        assert_eq!(got, "foo: Zm9vOiBBCmJhcjogYgo=");
    }

    #[test]
    fn quoting_of_the_outer_scalar_survives() {
        let got = lens::apply("foo: \"\"", vec![Mapping::new("/foo/~(base64)", "baz")]).unwrap();
        assert_eq!(got, "foo: \"YmF6\"");

        let got = lens::apply("foo: ''", vec![Mapping::new("/foo/~(base64)", "baz")]).unwrap();
        assert_eq!(got, "foo: 'YmF6'");
    }

    #[test]
    fn structured_pointer_is_rejected() {
        let err = lens::apply(
            "foo: YmFy",
            vec![Mapping::new("/foo/~(base64)/inner", "x")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn invalid_base64_is_a_parse_error() {
        let err = lens::apply(
            "foo: '%%%'",
            vec![Mapping::new("/foo/~(base64)", "x")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
