use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("could not parse file url: {0}")]
    Unparseable(#[from] url::ParseError),
    #[error("missing bucket name in file url")]
    MissingBucket,
    #[error("missing object key in file url")]
    MissingKey,
}

/// The bucket and object key a file notification points at.
///
/// Only single-segment keys are supported; nested folder structures in a
/// bucket would need the resolution below revisited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub bucket: String,
    pub key: String,
}

impl FileLocation {
    /// Parses a `scheme://bucket/key` URL. Pure; performs no I/O.
    pub fn parse(raw_url: &str) -> Result<Self, LocationError> {
        let url = Url::parse(raw_url)?;

        let bucket = url.host_str().unwrap_or_default().to_string();
        if bucket.is_empty() {
            return Err(LocationError::MissingBucket);
        }

        let key = url.path().trim_start_matches('/').to_string();
        if key.is_empty() {
            return Err(LocationError::MissingKey);
        }

        Ok(Self { bucket, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_key() {
        let location = FileLocation::parse("s3://csv-exported/v4-1234.csv").unwrap();
        assert_eq!(location.bucket, "csv-exported");
        assert_eq!(location.key, "v4-1234.csv");
    }

    #[test]
    fn url_without_key_is_rejected() {
        let err = FileLocation::parse("s3://some-file").unwrap_err();
        assert!(matches!(err, LocationError::MissingKey));
    }

    #[test]
    fn url_without_bucket_is_rejected() {
        let err = FileLocation::parse("s3:///v4-1234.csv").unwrap_err();
        assert!(matches!(err, LocationError::MissingBucket));
    }

    #[test]
    fn unparseable_url_is_rejected() {
        let err = FileLocation::parse("not a url").unwrap_err();
        assert!(matches!(err, LocationError::Unparseable(_)));
    }
}
