pub use uri::{InvalidUriError, Uri};

mod uri {
    use std::fmt::Display;
    use std::str::FromStr;

    use axum::http;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub struct InvalidUriError(String);

    impl Display for InvalidUriError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.0.fmt(f)
        }
    }

    impl From<http::uri::InvalidUri> for InvalidUriError {
        fn from(value: http::uri::InvalidUri) -> Self {
            InvalidUriError(value.to_string())
        }
    }

    impl From<http::uri::InvalidUriParts> for InvalidUriError {
        fn from(value: http::uri::InvalidUriParts) -> Self {
            InvalidUriError(value.to_string())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct Uri(http::Uri);

    impl Uri {
        pub fn new(uri: http::Uri) -> Self {
            Self(uri)
        }

        /// Append `path` to the path of this URI, replacing any query.
        ///
        /// A base like `https://host/api` joined with `/devices` gives
        /// `https://host/api/devices`.
        pub fn join(&self, path: &str, query: Option<&str>) -> Result<Self, InvalidUriError> {
            let base_path = self.0.path().trim_end_matches('/');
            let path = path.trim_start_matches('/');
            let path_and_query = if let Some(qs) = query {
                http::uri::PathAndQuery::from_maybe_shared(format!("{base_path}/{path}?{qs}"))?
            } else {
                http::uri::PathAndQuery::from_maybe_shared(format!("{base_path}/{path}"))?
            };
            let mut parts = self.0.clone().into_parts();
            parts.path_and_query = Some(path_and_query);

            Ok(http::Uri::from_parts(parts).map(Self::new)?)
        }
    }

    impl Display for Uri {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.0.fmt(f)
        }
    }

    impl FromStr for Uri {
        type Err = InvalidUriError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            Ok(http::Uri::from_str(s).map(Self::new)?)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_uri_join_on_bare_host() {
            let base: Uri = "https://eu1.cloud.thethings.network".parse().unwrap();
            let uri = base.join("/api/v3/applications/app/devices", None).unwrap();
            assert_eq!(
                uri.to_string(),
                "https://eu1.cloud.thethings.network/api/v3/applications/app/devices"
            );
        }

        #[test]
        fn test_uri_join_keeps_base_path() {
            let base: Uri = "http://localhost:8080/api/".parse().unwrap();
            let uri = base.join("devices", Some("page=2&limit=100")).unwrap();
            assert_eq!(
                uri.to_string(),
                "http://localhost:8080/api/devices?page=2&limit=100"
            );
        }

        #[test]
        fn test_uri_rejects_garbage() {
            assert!("http://exa mple".parse::<Uri>().is_err());
        }
    }
}
