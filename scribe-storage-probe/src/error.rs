use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    /// One or more of host, access key and secret key is missing
    #[error(
        "Object storage configuration incomplete (MINIO_HOST: {host}, \
         MINIO_ACCESS_KEY: {access_key}, MINIO_SECRET_KEY: {secret_key})"
    )]
    IncompleteConfig {
        host: bool,
        access_key: bool,
        secret_key: bool,
    },

    #[error("Failed to check bucket {bucket}: {message}")]
    HeadBucket { bucket: String, message: String },

    #[error("Failed to list objects in {bucket}: {message}")]
    ListObjects { bucket: String, message: String },

    #[error("Failed to stat {key}: {message}")]
    StatObject { key: String, message: String },
}
