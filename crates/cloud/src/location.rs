use crate::store::PersistenceError;

/// Where persisted artifacts go: a bucket plus an optional key prefix.
///
/// Accepts either a bare bucket name or `s3://bucket/prefix`. A non-empty
/// prefix always ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    pub bucket: String,
    pub prefix: String,
}

impl StoreLocation {
    pub fn parse(raw: &str) -> Result<Self, PersistenceError> {
        let raw = raw.trim();
        let path = match raw.split_once("://") {
            Some(("s3", rest)) => rest,
            Some((scheme, _)) => {
                return Err(PersistenceError::InvalidLocation(format!(
                    "Unsupported scheme '{scheme}' in '{raw}'. Use a bucket name or s3://bucket/prefix"
                )))
            }
            None => raw,
        };

        let (bucket, prefix) = match path.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
            None => (path, ""),
        };

        if bucket.is_empty() {
            return Err(PersistenceError::InvalidLocation(format!(
                "No bucket name in '{raw}'"
            )));
        }

        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };

        Ok(Self {
            bucket: bucket.to_string(),
            prefix,
        })
    }
}
